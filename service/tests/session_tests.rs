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

//! End-to-end session tests over an in-memory transport: a fake peer writes
//! raw Telnet bytes on one end of a duplex pipe, and the session under test
//! runs on the other.

use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vspc_service::{
    AccessMode, AdminClientEvents, AdminClientOption, AdminRequester, AdminServerHooks,
    AdminServerOption, OptionSlot, PortConnectError, SessionEvent, TelnetSession, VmPortInfo,
};

const IAC: u8 = 0xFF;
const SB: u8 = 0xFA;
const SE: u8 = 0xF0;
const WILL: u8 = 0xFB;
const WONT: u8 = 0xFC;
const DO: u8 = 0xFD;
const DONT: u8 = 0xFE;

const BINARY: u8 = 0x00;
const VSPC_ADMIN: u8 = 0xE9;

const GET_VM_PORT_LIST: u8 = 0x10;
const VM_PORT_LIST: u8 = 0x11;
const VM_PORT_SET_CONNECTION: u8 = 0x20;
const VM_PORT_CONNECTED: u8 = 0x21;

/// Spawn a session over one end of a duplex pipe, forwarding its events.
fn spawn_session(
    transport: DuplexStream,
    slots: Vec<OptionSlot>,
) -> (mpsc::UnboundedReceiver<SessionEvent>, JoinHandle<()>) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let mut session = TelnetSession::new(transport);
        for slot in slots {
            session.add_option(slot);
        }
        loop {
            match session.next_event().await {
                Ok(Some(event)) => {
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!("session failed: {error}");
                    break;
                }
            }
        }
    });
    (event_rx, handle)
}

async fn read_exact(peer: &mut DuplexStream, count: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; count];
    tokio::time::timeout(Duration::from_secs(5), peer.read_exact(&mut buffer))
        .await
        .expect("timed out reading from session")
        .expect("read failed");
    buffer
}

async fn next_data(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Bytes {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("session ended early");
        if let SessionEvent::Data(data) = event {
            return data;
        }
    }
}

#[tokio::test]
async fn binary_offer_is_accepted() {
    let (mut peer, transport) = tokio::io::duplex(1024);
    let (_events, _handle) = spawn_session(transport, Vec::new());

    peer.write_all(&[IAC, WILL, BINARY]).await.unwrap();
    assert_eq!(read_exact(&mut peer, 3).await, vec![IAC, DO, BINARY]);

    peer.write_all(&[IAC, DO, BINARY]).await.unwrap();
    assert_eq!(read_exact(&mut peer, 3).await, vec![IAC, WILL, BINARY]);
}

#[tokio::test]
async fn unknown_option_is_rejected() {
    let (mut peer, transport) = tokio::io::duplex(1024);
    let (_events, _handle) = spawn_session(transport, Vec::new());

    peer.write_all(&[IAC, WILL, 0x31]).await.unwrap();
    assert_eq!(read_exact(&mut peer, 3).await, vec![IAC, DONT, 0x31]);

    peer.write_all(&[IAC, DO, 0x32]).await.unwrap();
    assert_eq!(read_exact(&mut peer, 3).await, vec![IAC, WONT, 0x32]);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn unhandled_subnegotiation_is_dropped() {
    let (mut peer, transport) = tokio::io::duplex(1024);
    let (mut events, _handle) = spawn_session(transport, Vec::new());

    // A subnegotiation for an option nobody registered.
    peer.write_all(&[IAC, SB, 0x31, 0x01, 0x02, IAC, SE])
        .await
        .unwrap();
    // The connection survives and keeps delivering data.
    peer.write_all(b"still alive").await.unwrap();
    assert_eq!(
        next_data(&mut events).await,
        Bytes::from_static(b"still alive")
    );
    assert!(logs_contain("Unhandled option subnegotiation"));
}

#[tokio::test]
async fn inband_data_passes_through_unescaped() {
    let (mut peer, transport) = tokio::io::duplex(1024);
    let (mut events, _handle) = spawn_session(transport, Vec::new());

    peer.write_all(&[b'a', b'b', IAC, IAC, b'c']).await.unwrap();
    assert_eq!(next_data(&mut events).await, Bytes::from_static(b"ab"));
    assert_eq!(next_data(&mut events).await, Bytes::from_static(&[0xFF]));
    assert_eq!(next_data(&mut events).await, Bytes::from_static(b"c"));
}

#[derive(Default)]
struct RecordingHooks {
    connects: Arc<Mutex<Vec<(Option<String>, Option<AccessMode>)>>>,
    deny: bool,
}

impl AdminServerHooks for RecordingHooks {
    fn vm_port_list(&mut self) -> Vec<VmPortInfo> {
        vec![VmPortInfo {
            port_id: "AAAA".into(),
            vm_name: Some("vm-a".into()),
            listening_uri: None,
        }]
    }

    fn connect_to_vm_port(
        &mut self,
        port_id: Option<&str>,
        mode: Option<AccessMode>,
    ) -> Result<(), PortConnectError> {
        self.connects
            .lock()
            .unwrap()
            .push((port_id.map(Into::into), mode));
        if self.deny {
            Err(PortConnectError::AccessDenied)
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn admin_server_offers_itself_and_serves_port_list() {
    let (mut peer, transport) = tokio::io::duplex(1024);
    let connects = Arc::new(Mutex::new(Vec::new()));
    let hooks = RecordingHooks {
        connects: connects.clone(),
        deny: false,
    };
    let (_events, _handle) = spawn_session(transport, vec![AdminServerOption::slot(hooks)]);

    // The server side requested its own activation at construction.
    assert_eq!(read_exact(&mut peer, 3).await, vec![IAC, WILL, VSPC_ADMIN]);
    peer.write_all(&[IAC, DO, VSPC_ADMIN]).await.unwrap();

    // Ask for the port list.
    peer.write_all(&[IAC, SB, VSPC_ADMIN, GET_VM_PORT_LIST, IAC, SE])
        .await
        .unwrap();

    let expected_blob = b"AAAA\0vm-a\0";
    let mut reply = Vec::new();
    reply.extend_from_slice(&[IAC, SB, VSPC_ADMIN, VM_PORT_LIST]);
    reply.extend_from_slice(expected_blob);
    reply.extend_from_slice(&[IAC, SE]);
    assert_eq!(read_exact(&mut peer, reply.len()).await, reply);

    // Connect read-write to the advertised port.
    let mut connect = vec![IAC, SB, VSPC_ADMIN, VM_PORT_SET_CONNECTION, 0x00];
    connect.extend_from_slice(b"AAAA");
    connect.extend_from_slice(&[IAC, SE]);
    peer.write_all(&connect).await.unwrap();
    assert_eq!(
        read_exact(&mut peer, 6).await,
        vec![IAC, SB, VSPC_ADMIN, VM_PORT_CONNECTED, IAC, SE]
    );

    let recorded = connects.lock().unwrap().clone();
    assert_eq!(
        recorded,
        vec![(Some("AAAA".to_string()), Some(AccessMode::ReadWrite))]
    );
}

struct ScriptedClient {
    log: Arc<Mutex<Vec<String>>>,
}

impl AdminClientEvents for ScriptedClient {
    fn admin_server_is_available(&mut self, requests: &AdminRequester) {
        self.log.lock().unwrap().push("available".into());
        requests.request_vm_port_list();
    }

    fn received_vm_port_list(&mut self, requests: &AdminRequester, ports: Vec<VmPortInfo>) {
        self.log
            .lock()
            .unwrap()
            .push(format!("list:{}", ports.len()));
        if let Some(port) = ports.first() {
            requests.connect_to_vm_port(&port.port_id, AccessMode::ReadOnlyOk);
        }
    }

    fn connection_state_update(&mut self, _requests: &AdminRequester, connected: bool) {
        self.log
            .lock()
            .unwrap()
            .push(format!("connected:{connected}"));
    }
}

#[tokio::test]
async fn admin_client_drives_list_then_connect() {
    let (mut peer, transport) = tokio::io::duplex(1024);
    let log = Arc::new(Mutex::new(Vec::new()));
    let client = AdminClientOption::new(ScriptedClient { log: log.clone() });
    let (mut events, _handle) =
        spawn_session(transport, vec![OptionSlot::new(Box::new(client))]);

    // Server offers the admin option; client accepts and asks for the list.
    peer.write_all(&[IAC, WILL, VSPC_ADMIN]).await.unwrap();
    assert_eq!(read_exact(&mut peer, 3).await, vec![IAC, DO, VSPC_ADMIN]);
    assert_eq!(
        read_exact(&mut peer, 6).await,
        vec![IAC, SB, VSPC_ADMIN, GET_VM_PORT_LIST, IAC, SE]
    );

    // Serve a one-entry list; the client connects to it READONLY_OK.
    let mut list = vec![IAC, SB, VSPC_ADMIN, VM_PORT_LIST];
    list.extend_from_slice(b"BBBB\0vm-b\0");
    list.extend_from_slice(&[IAC, SE]);
    peer.write_all(&list).await.unwrap();

    let mut connect = vec![IAC, SB, VSPC_ADMIN, VM_PORT_SET_CONNECTION, 0x20];
    connect.extend_from_slice(b"BBBB");
    connect.extend_from_slice(&[IAC, SE]);
    assert_eq!(read_exact(&mut peer, connect.len()).await, connect);

    // Acknowledge the connection.
    peer.write_all(&[IAC, SB, VSPC_ADMIN, VM_PORT_CONNECTED, IAC, SE])
        .await
        .unwrap();

    // Send some serial data through; it surfaces as in-band data.
    peer.write_all(b"boot ok").await.unwrap();
    assert_eq!(next_data(&mut events).await, Bytes::from_static(b"boot ok"));

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries, vec!["available", "list:1", "connected:true"]);
}
