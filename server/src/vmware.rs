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

//! The server side of the VMware Serial Port Proxy extension, as
//! implemented by a virtual serial port concentrator.
//!
//! Every VM-facing connection carries one [`VmwareServerOption`] in its
//! session and one [`VmConnection`] shared handle. The handle is what the
//! port registry and the vMotion broker hold: handle identity is handler
//! identity, and [`VmPort::receive_bytes`](crate::port::VmPort::receive_bytes)
//! rejects data from any handle other than the port's current owner.
//!
//! vMotion flow, from this side of the wire:
//!
//! - `VMOTION-BEGIN` from the source connection: generate a secret, file
//!   `sequence||secret -> source` with the broker, answer `GOAHEAD`.
//! - `VMOTION-PEER` from the destination connection: look the key up,
//!   remember the source as our peer, answer `PEER-OK`. No reply exists for
//!   a failed lookup; the source times out.
//! - `VMOTION-COMPLETE` from the destination: claim the source's port,
//!   repoint it at this connection, clear the broker entry. The source's
//!   connection is expected to close shortly after; its teardown must not
//!   take the port with it, because it no longer owns it.
//! - `VMOTION-ABORT` from the source: clear the broker entry and forget the
//!   pending migration.

use crate::registry::VspcState;
use crate::stats::VspcStats;
use bytes::Bytes;
use rand::RngCore;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use vspc_service::vmware::{self, UriMatch};
use vspc_service::{OptionContext, OptionHandler, SessionError, SessionHandle};
use vspc_telnetcodec::consts::option;

/// A pending migration: the sequence presented by the source plus the
/// secret we generated, concatenated into the broker key.
#[derive(Clone, Debug)]
pub(crate) struct VmotionKey {
    sequence: Vec<u8>,
    secret: [u8; 8],
}

impl VmotionKey {
    fn new(sequence: &[u8]) -> Self {
        let mut secret = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        VmotionKey {
            sequence: sequence.to_vec(),
            secret,
        }
    }

    /// The broker key: `sequence || secret`.
    pub(crate) fn key(&self) -> Vec<u8> {
        let mut key = self.sequence.clone();
        key.extend_from_slice(&self.secret);
        key
    }
}

struct VmState {
    vc_uuid: Option<String>,
    vm_name: Option<String>,
    uri_match: Option<UriMatch>,
    will_proxy: Option<bool>,
    vmotion: Option<VmotionKey>,
    vmotion_peer: Option<VmConnection>,
    port: Option<Arc<crate::port::VmPort>>,
}

struct VmConnInner {
    session: SessionHandle,
    stats: Arc<VspcStats>,
    state: Mutex<VmState>,
}

/// The shareable handle to one VM-side connection's extension state.
///
/// Clones refer to the same connection; [`VmConnection::same_as`] is the
/// identity the port ownership check and the vMotion broker rely on.
#[derive(Clone)]
pub struct VmConnection {
    inner: Arc<VmConnInner>,
}

impl VmConnection {
    /// A fresh handle for a newly accepted VM connection.
    pub fn new(session: SessionHandle, stats: Arc<VspcStats>) -> Self {
        VmConnection {
            inner: Arc::new(VmConnInner {
                session,
                stats,
                state: Mutex::new(VmState {
                    vc_uuid: None,
                    vm_name: None,
                    uri_match: None,
                    will_proxy: None,
                    vmotion: None,
                    vmotion_peer: None,
                    port: None,
                }),
            }),
        }
    }

    /// Whether two handles refer to the same connection.
    pub fn same_as(&self, other: &VmConnection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The VC UUID reported on this connection, once known.
    pub fn vc_uuid(&self) -> Option<String> {
        self.inner.state.lock().unwrap().vc_uuid.clone()
    }

    /// The VM name reported on this connection, once known.
    pub fn vm_name(&self) -> Option<String> {
        self.inner.state.lock().unwrap().vm_name.clone()
    }

    /// The port this connection is attached to, if identification has
    /// completed.
    pub fn port(&self) -> Option<Arc<crate::port::VmPort>> {
        self.inner.state.lock().unwrap().port.clone()
    }

    /// The VM has produced bytes of data from its serial port. Deliver
    /// them to the port's backends.
    pub fn receive_bytes(&self, data: &Bytes) -> Result<(), SessionError> {
        self.inner.stats.serial_received(data.len() as u64);
        let port = self.port().ok_or_else(|| {
            SessionError::protocol("Received data before adequate identification received")
        })?;
        // A port detached by an admin-forced disconnect is re-adopted by
        // the first connection that speaks on it.
        port.adopt_if_orphaned(self);
        port.receive_bytes(self, data)
    }

    /// A backend has produced bytes of data to send to the VM.
    pub fn send_bytes(&self, data: Bytes) {
        self.inner.stats.serial_transmitted(data.len() as u64);
        self.inner.session.send_data(data);
    }

    /// Connection teardown: abandon any pending migration this connection
    /// originated, drop the port from the registry if we still own it, and
    /// release ownership.
    pub fn teardown(&self, vspc: &VspcState) {
        let (vmotion, is_source, port) = {
            let mut state = self.inner.state.lock().unwrap();
            (
                state.vmotion.take(),
                state.vmotion_peer.is_none(),
                state.port.clone(),
            )
        };
        if let Some(vmotion) = vmotion {
            if is_source {
                warn!("Connection closed with a vMotion in flight, abandoning it");
                vspc.remove_vmotion(&vmotion.key());
                self.inner.stats.vmotion_abandon();
            }
        }
        if let Some(port) = port {
            if port.is_owned_by(self) {
                vspc.remove_port(port.port_id());
                port.switch_to_veo(None);
            }
        }
    }
}

/// The option handler registered on a VM-facing session.
pub struct VmwareServerOption {
    conn: VmConnection,
    vspc: Arc<VspcState>,
}

impl VmwareServerOption {
    /// Bind a connection handle to the process state.
    pub fn new(conn: VmConnection, vspc: Arc<VspcState>) -> Self {
        VmwareServerOption { conn, vspc }
    }

    fn stats(&self) -> &VspcStats {
        &self.conn.inner.stats
    }

    /// When `vc_uuid`, `vm_name` and a granted proxy request are all known
    /// and no port is attached yet, look up or create the VM port and
    /// attach to it.
    fn check_identity(&self) {
        let mut state = self.conn.inner.state.lock().unwrap();
        if state.port.is_some() {
            // Already associated with a port.
            return;
        }
        let (Some(vc_uuid), Some(vm_name), Some(true)) =
            (&state.vc_uuid, &state.vm_name, state.will_proxy)
        else {
            // Insufficient information to set up a port.
            return;
        };
        let port_label = state
            .uri_match
            .as_ref()
            .and_then(|matched| matched.arg("port").first().map(ToString::to_string));
        let port = self.vspc.port_for(
            &self.conn,
            vc_uuid,
            port_label.as_deref(),
            Some(vm_name.as_str()),
        );
        state.port = Some(port);
    }

    fn set_vc_uuid(&self, vc_uuid: String) -> Result<(), SessionError> {
        {
            let mut state = self.conn.inner.state.lock().unwrap();
            if let Some(port) = &state.port {
                if port.vc_uuid() != vc_uuid {
                    return Err(SessionError::protocol(
                        "Tried to change VC UUID for in-use port",
                    ));
                }
            }
            state.vc_uuid = Some(vc_uuid);
        }
        self.check_identity();
        Ok(())
    }

    fn set_vm_name(&self, vm_name: String) {
        self.conn.inner.state.lock().unwrap().vm_name = Some(vm_name);
        self.check_identity();
    }

    fn do_proxy(&self, ctx: &OptionContext<'_>, payload: &[u8]) {
        let direction = payload.first().map(|&byte| byte as char);
        let service_uri = String::from_utf8_lossy(payload.get(1..).unwrap_or(&[]));
        let matched = vmware::match_service_uri(&self.vspc.config.service_uri, &service_uri);
        let will_proxy =
            matches!(direction, Some('C' | 'S')) && matched.matched();
        {
            let mut state = self.conn.inner.state.lock().unwrap();
            state.will_proxy = Some(will_proxy);
            state.uri_match = Some(matched);
        }

        if will_proxy {
            ctx.send_subnegotiation(&[&[vmware::WILL_PROXY]]);
            ctx.send_subnegotiation(&[&[vmware::GET_VM_VC_UUID]]);
            ctx.send_subnegotiation(&[&[vmware::GET_VM_NAME]]);
        } else {
            warn!(
                ?direction,
                uri = %service_uri,
                "Proxy direction/serviceURI mismatch"
            );
            ctx.send_subnegotiation(&[&[vmware::WONT_PROXY]]);
        }
    }

    /// Start preparing a vMotion source: generate a secret and file the
    /// sequence plus secret with the broker. Returns the pending migration,
    /// or `None` when the begin is declined.
    fn begin_vmotion(&self, sequence: &[u8]) -> Option<VmotionKey> {
        self.stats().vmotion_begin();

        let prior = {
            let mut state = self.conn.inner.state.lock().unwrap();
            state.vmotion.take()
        };
        if let Some(prior) = prior {
            // The source should have sent VMOTION-ABORT but did not.
            warn!("A prior vMotion did not complete, replacing it");
            self.vspc.remove_vmotion(&prior.key());
            self.stats().vmotion_abandon();
        }

        let vmotion = VmotionKey::new(sequence);
        self.vspc.insert_vmotion(vmotion.key(), self.conn.clone());
        {
            let mut state = self.conn.inner.state.lock().unwrap();
            state.vmotion = Some(vmotion.clone());
        }
        debug!(sequence = ?vmotion.sequence, "vMotion begin");
        Some(vmotion)
    }

    /// Connect a vMotion destination: the peer is identified solely by the
    /// sequence plus secret presented here. A VM might have several serial
    /// ports sharing one VC UUID; only this key picks the right one.
    fn peer_vmotion(&self, ctx: &OptionContext<'_>, key: &[u8]) {
        self.stats().vmotion_peer();
        match self.vspc.find_vmotion(key) {
            Some(source) => {
                let vmotion = source.inner.state.lock().unwrap().vmotion.clone();
                let Some(vmotion) = vmotion else {
                    warn!("vMotion source lost its pending migration");
                    return;
                };
                let sequence = vmotion.sequence.clone();
                {
                    let mut state = self.conn.inner.state.lock().unwrap();
                    state.vmotion = Some(vmotion);
                    state.vmotion_peer = Some(source);
                }
                ctx.send_subnegotiation(&[&[vmware::VMOTION_PEER_OK], &sequence]);
            }
            None => {
                // The protocol has no error reply; the source will time
                // out.
                warn!("vMotion peer not found");
            }
        }
    }

    /// Handle a request from a vMotion destination to complete the
    /// transfer. From the source connection this must have no effect.
    fn complete_vmotion(&self) -> Result<(), SessionError> {
        self.stats().vmotion_complete();

        let source = {
            let state = self.conn.inner.state.lock().unwrap();
            state.vmotion_peer.clone()
        };
        let Some(source) = source else {
            return Ok(());
        };

        let (source_port, source_uuid, source_name) = {
            let state = source.inner.state.lock().unwrap();
            (
                state.port.clone(),
                state.vc_uuid.clone(),
                state.vm_name.clone(),
            )
        };
        let Some(port) = source_port else {
            return Err(SessionError::protocol(
                "Tried to complete vMotion when the source is not ready",
            ));
        };

        {
            let mut state = self.conn.inner.state.lock().unwrap();
            if state.vc_uuid.is_some() && state.vc_uuid != source_uuid {
                return Err(SessionError::protocol(
                    "Tried to complete a vMotion on an already-connected port",
                ));
            }
            if state.vc_uuid.is_none() {
                state.vc_uuid = source_uuid;
            }
            if state.vm_name.is_none() {
                state.vm_name = source_name;
            }
            // Claim the port now.
            state.port = Some(port.clone());
        }
        // The linearization point: from here on, inbound bytes on the
        // source connection fail the ownership check.
        port.switch_to_veo(Some(self.conn.clone()));
        info!(port = %port.port_id(), "vMotion complete, port handed off");

        let key = {
            let mut state = self.conn.inner.state.lock().unwrap();
            state.vmotion_peer = None;
            state.vmotion.take().map(|vmotion| vmotion.key())
        };
        if let Some(key) = key {
            self.vspc.remove_vmotion(&key);
        }
        source.inner.state.lock().unwrap().vmotion = None;
        Ok(())
    }

    /// Handle a request from a vMotion source to abort the transfer. From
    /// the destination connection this must have no effect.
    fn abort_vmotion(&self) {
        self.stats().vmotion_abort();
        let key = {
            let mut state = self.conn.inner.state.lock().unwrap();
            if state.vmotion_peer.is_some() {
                return;
            }
            state.vmotion.take().map(|vmotion| vmotion.key())
        };
        if let Some(key) = key {
            warn!("vMotion abort");
            self.vspc.remove_vmotion(&key);
        }
    }
}

impl OptionHandler for VmwareServerOption {
    fn code(&self) -> u8 {
        option::VMWARE_EXT
    }

    fn name(&self) -> &'static str {
        "VMWARE-TELNET-EXT"
    }

    fn should_accept(&mut self, them: bool) -> bool {
        them
    }

    fn state_update(&mut self, ctx: &OptionContext<'_>, _them: bool, enabled: bool) {
        if enabled {
            ctx.send_subnegotiation(&[&[vmware::KNOWN_SUBOPTIONS_2], &vmware::SUBOPTIONS]);
        }
    }

    fn subnegotiate(&mut self, ctx: &OptionContext<'_>, payload: &Bytes) -> Result<(), SessionError> {
        let Some((&subcommand, data)) = payload.split_first() else {
            warn!("Empty VMware serial proxy subnegotiation");
            return Ok(());
        };
        match subcommand {
            vmware::KNOWN_SUBOPTIONS_1 => {
                // The client's announcement carries nothing we act on.
            }
            vmware::VM_VC_UUID => {
                if self.conn.vc_uuid().is_none() {
                    if let Some(vc_uuid) = vmware::sanitize_uuid(data) {
                        self.set_vc_uuid(vc_uuid)?;
                    }
                }
            }
            vmware::VM_NAME => {
                if self.conn.vm_name().is_none() {
                    if let Ok(vm_name) = std::str::from_utf8(data) {
                        self.set_vm_name(vm_name.to_string());
                    }
                }
            }
            vmware::DO_PROXY => self.do_proxy(ctx, data),
            vmware::VMOTION_BEGIN => match self.begin_vmotion(data) {
                Some(vmotion) => ctx.send_subnegotiation(&[
                    &[vmware::VMOTION_GOAHEAD],
                    &vmotion.sequence,
                    &vmotion.secret,
                ]),
                None => ctx.send_subnegotiation(&[&[vmware::VMOTION_NOTNOW], data]),
            },
            vmware::VMOTION_PEER => self.peer_vmotion(ctx, data),
            vmware::VMOTION_ABORT => self.abort_vmotion(),
            vmware::VMOTION_COMPLETE => self.complete_vmotion()?,
            other => {
                warn!(
                    subcommand = other,
                    "Unrecognized VMware serial proxy subnegotiation"
                );
            }
        }
        Ok(())
    }
}
