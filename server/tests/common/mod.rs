//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Shared plumbing for the server integration tests: a raw Telnet wire
//! speaking to an in-memory transport, plus the VM-side handshake a real
//! virtual serial port would perform.

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use vspc_server::{ServerConfig, VmConnection, VmwareServerOption, VspcState, drive_vm_connection};
use vspc_service::vmware;
use vspc_service::{OptionSlot, TelnetSession};
use vspc_telnetcodec::consts::option;
use vspc_telnetcodec::{NegotiationAction, TelnetCodec, TelnetFrame};

/// One end of a Telnet conversation, framed through the real codec.
pub struct Wire {
    transport: DuplexStream,
    codec: TelnetCodec,
    inbound: BytesMut,
}

impl Wire {
    pub fn new(transport: DuplexStream) -> Self {
        Wire {
            transport,
            codec: TelnetCodec::new(),
            inbound: BytesMut::new(),
        }
    }

    pub async fn send(&mut self, frame: TelnetFrame) {
        let mut wire = BytesMut::new();
        self.codec.encode(frame, &mut wire).expect("encode ok");
        self.transport.write_all(&wire).await.expect("write ok");
    }

    pub async fn send_data(&mut self, data: &[u8]) {
        self.send(TelnetFrame::Data(Bytes::copy_from_slice(data))).await;
    }

    pub async fn send_subnegotiation(&mut self, code: u8, payload: &[u8]) {
        self.send(TelnetFrame::Subnegotiate(
            code,
            Bytes::copy_from_slice(payload),
        ))
        .await;
    }

    pub async fn next_frame(&mut self) -> TelnetFrame {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.inbound).expect("decode ok") {
                return frame;
            }
            let read = tokio::time::timeout(
                Duration::from_secs(5),
                self.transport.read_buf(&mut self.inbound),
            )
            .await
            .expect("timed out waiting for peer")
            .expect("read ok");
            assert!(read > 0, "peer closed the connection");
        }
    }

    pub async fn expect_negotiation(&mut self, action: NegotiationAction, code: u8) {
        let frame = self.next_frame().await;
        assert_eq!(frame, TelnetFrame::Negotiate(action, code));
    }

    /// The payload of the next frame, which must be a subnegotiation for
    /// `code`.
    pub async fn next_subnegotiation(&mut self, code: u8) -> Vec<u8> {
        match self.next_frame().await {
            TelnetFrame::Subnegotiate(option, payload) => {
                assert_eq!(option, code, "subnegotiation for unexpected option");
                payload.to_vec()
            }
            other => panic!("expected subnegotiation, got {other:?}"),
        }
    }

    /// The next in-band data, coalescing consecutive chunks until `len`
    /// bytes have arrived.
    pub async fn next_data(&mut self, len: usize) -> Vec<u8> {
        let mut data = Vec::new();
        while data.len() < len {
            match self.next_frame().await {
                TelnetFrame::Data(chunk) => data.extend_from_slice(&chunk),
                other => panic!("expected data, got {other:?}"),
            }
        }
        data
    }
}

/// A `VspcState` whose disk logs land in a unique temp directory.
pub fn test_state(tag: &str) -> Arc<VspcState> {
    let log_root = std::env::temp_dir().join(format!(
        "vspc-test-{}-{tag}",
        std::process::id()
    ));
    Arc::new(VspcState::new(
        ServerConfig::default().with_log_root(log_root),
    ))
}

/// Spawn a VM-facing connection the way the listener does, keeping the
/// connection handle for assertions.
pub fn spawn_vm_connection(vspc: &Arc<VspcState>) -> (Wire, VmConnection, JoinHandle<()>) {
    let (peer, transport) = tokio::io::duplex(4096);
    let mut session = TelnetSession::new(transport);
    let conn = VmConnection::new(session.handle(), vspc.stats.clone());
    session.add_option(OptionSlot::new(Box::new(VmwareServerOption::new(
        conn.clone(),
        vspc.clone(),
    ))));
    let task_vspc = vspc.clone();
    let task_conn = conn.clone();
    let task = tokio::spawn(async move {
        drive_vm_connection(&task_vspc, &task_conn, &mut session).await;
    });
    (Wire::new(peer), conn, task)
}

/// Enable the VMware extension from the VM side and consume the server's
/// announcement.
pub async fn negotiate_vmware(wire: &mut Wire) {
    wire.send(TelnetFrame::Negotiate(
        NegotiationAction::Will,
        option::VMWARE_EXT,
    ))
    .await;
    wire.expect_negotiation(NegotiationAction::Do, option::VMWARE_EXT)
        .await;
    let announcement = wire.next_subnegotiation(option::VMWARE_EXT).await;
    assert_eq!(announcement[0], vmware::KNOWN_SUBOPTIONS_2);
}

/// Complete the proxy handshake and identity exchange for one VM.
pub async fn identify(wire: &mut Wire, vc_uuid: &str, vm_name: &str) {
    let mut do_proxy = vec![vmware::DO_PROXY, b'C'];
    do_proxy.extend_from_slice(b"vSPC");
    wire.send_subnegotiation(option::VMWARE_EXT, &do_proxy).await;
    assert_eq!(
        wire.next_subnegotiation(option::VMWARE_EXT).await,
        vec![vmware::WILL_PROXY]
    );
    assert_eq!(
        wire.next_subnegotiation(option::VMWARE_EXT).await,
        vec![vmware::GET_VM_VC_UUID]
    );
    assert_eq!(
        wire.next_subnegotiation(option::VMWARE_EXT).await,
        vec![vmware::GET_VM_NAME]
    );

    let mut uuid = vec![vmware::VM_VC_UUID];
    uuid.extend_from_slice(vc_uuid.as_bytes());
    wire.send_subnegotiation(option::VMWARE_EXT, &uuid).await;

    let mut name = vec![vmware::VM_NAME];
    name.extend_from_slice(vm_name.as_bytes());
    wire.send_subnegotiation(option::VMWARE_EXT, &name).await;
}

/// Poll until `check` passes or five seconds elapse.
pub async fn wait_for(description: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {description}");
}
