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

//! The vSPC admin option.
//!
//! A custom Telnet option used only between a vSPC client and a vSPC
//! server. It lets the server communicate the list of known VM ports and
//! lets the client connect its in-band data to (or disconnect it from) a
//! specific VM port with a requested locking mode.

use crate::error::SessionError;
use crate::option::{OptionContext, OptionHandler};
use crate::session::SessionHandle;
use bytes::Bytes;
use vspc_telnetcodec::consts::option;

const GET_VM_PORT_LIST: u8 = 0x10;
const VM_PORT_LIST: u8 = 0x11;
const VM_PORT_SET_CONNECTION: u8 = 0x20;
const VM_PORT_CONNECTED: u8 = 0x21;
const VM_PORT_DISCONNECTED: u8 = 0x22;

/// The locking mode a client can request when connecting to a serial port.
///
/// - `ReadWrite`: requires that no other client has exclusive access. While
///   connected, no other client is granted exclusive write access.
/// - `ReadOnly`: requires that no other client has exclusive access; the
///   connection cannot write.
/// - `Exclusive`: requires that no other client is connected at all; no
///   other client may connect while it holds the port.
/// - `ExclusiveWrite`: requires that no other client has write access;
///   read-only peers are fine, and no new writers are admitted.
/// - `ReadOnlyOk`: requires that no other client has exclusive access;
///   downgrades itself to read-only while an exclusive-write client is
///   present, and is read-write otherwise.
///
/// The default is `ReadWrite`; when every client uses it there are no
/// restrictions on simultaneous connections to a port.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AccessMode {
    /// Read-write alongside other non-exclusive clients.
    ReadWrite = 0x00,
    /// Read-only alongside other non-exclusive clients.
    ReadOnly = 0x01,
    /// Sole client on the port.
    Exclusive = 0x10,
    /// Sole writer on the port.
    ExclusiveWrite = 0x11,
    /// Read-write, downgrading to read-only under an exclusive writer.
    ReadOnlyOk = 0x20,
}

impl AccessMode {
    /// The wire byte for this mode.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte into a mode, if it is one.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(AccessMode::ReadWrite),
            0x01 => Some(AccessMode::ReadOnly),
            0x10 => Some(AccessMode::Exclusive),
            0x11 => Some(AccessMode::ExclusiveWrite),
            0x20 => Some(AccessMode::ReadOnlyOk),
            _ => None,
        }
    }
}

/// One entry of the VM port list exchanged over the admin option.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VmPortInfo {
    /// The port identifier (`vc_uuid`, optionally suffixed `.label`).
    pub port_id: String,
    /// The VM's display name, if known.
    pub vm_name: Option<String>,
    /// Where the port can be reached directly, if anywhere.
    pub listening_uri: Option<String>,
}

/// Encode a VM port list for the `VM_PORT_LIST` subnegotiation:
/// NUL-separated UTF-8 triples, absent values as empty strings.
pub fn encode_vm_port_list(ports: &[VmPortInfo]) -> Vec<u8> {
    let mut blob = Vec::new();
    for (index, port) in ports.iter().enumerate() {
        if index > 0 {
            blob.push(0);
        }
        blob.extend_from_slice(port.port_id.as_bytes());
        blob.push(0);
        blob.extend_from_slice(port.vm_name.as_deref().unwrap_or("").as_bytes());
        blob.push(0);
        blob.extend_from_slice(port.listening_uri.as_deref().unwrap_or("").as_bytes());
    }
    blob
}

/// Decode a `VM_PORT_LIST` blob back into port entries.
///
/// A blob whose NUL-split length is not a multiple of three is a protocol
/// error, as is non-UTF-8 content.
pub fn decode_vm_port_list(blob: &[u8]) -> Result<Vec<VmPortInfo>, SessionError> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    let fields: Vec<&[u8]> = blob.split(|&byte| byte == 0).collect();
    if fields.len() % 3 != 0 {
        return Err(SessionError::protocol("Server sent bad port list length"));
    }
    let mut entries = Vec::with_capacity(fields.len() / 3);
    for triple in fields.chunks_exact(3) {
        let decode = |bytes: &[u8]| -> Result<String, SessionError> {
            String::from_utf8(bytes.to_vec())
                .map_err(|_| SessionError::protocol("Server sent non-UTF-8 port list entry"))
        };
        let port_id = decode(triple[0])?;
        let vm_name = decode(triple[1])?;
        let listening_uri = decode(triple[2])?;
        entries.push(VmPortInfo {
            port_id,
            vm_name: (!vm_name.is_empty()).then_some(vm_name),
            listening_uri: (!listening_uri.is_empty()).then_some(listening_uri),
        });
    }
    Ok(entries)
}

/// Why a connect request could not be honored. Both cases are recovered
/// locally by the server side and reported to the client as
/// `VM_PORT_DISCONNECTED`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortConnectError {
    /// No port with the requested identifier is registered.
    NotFound,
    /// The requested locking mode conflicts with existing backends.
    AccessDenied,
}

/// What a vSPC server must supply to serve the admin option.
pub trait AdminServerHooks: Send {
    /// The list of VM ports known to this vSPC.
    fn vm_port_list(&mut self) -> Vec<VmPortInfo>;

    /// Put into effect a client's request to connect to the given port with
    /// the given mode, first detaching from any current port. `None`/`None`
    /// requests a plain disconnect.
    fn connect_to_vm_port(
        &mut self,
        port_id: Option<&str>,
        mode: Option<AccessMode>,
    ) -> Result<(), PortConnectError>;
}

/// The server side of the vSPC admin option.
///
/// Offers itself to the peer on construction (the negotiation is queued
/// until the option is attached to a session).
pub struct AdminServerOption<H: AdminServerHooks> {
    hooks: H,
}

impl<H: AdminServerHooks + 'static> AdminServerOption<H> {
    /// Wrap the hooks into an option slot with our side already requested.
    pub fn slot(hooks: H) -> crate::option::OptionSlot {
        let mut slot = crate::option::OptionSlot::new(Box::new(AdminServerOption { hooks }));
        slot.request(false, true);
        slot
    }

    /// Access the wrapped hooks.
    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }
}

impl<H: AdminServerHooks> OptionHandler for AdminServerOption<H> {
    fn code(&self) -> u8 {
        option::VSPC_ADMIN
    }

    fn name(&self) -> &'static str {
        "VMWARE-VSPC-ADMIN"
    }

    fn subnegotiate(&mut self, ctx: &OptionContext<'_>, payload: &Bytes) -> Result<(), SessionError> {
        if let Some((&subcommand, rest)) = payload.split_first() {
            match subcommand {
                GET_VM_PORT_LIST if rest.is_empty() => {
                    let blob = encode_vm_port_list(&self.hooks.vm_port_list());
                    ctx.send_subnegotiation(&[&[VM_PORT_LIST], &blob]);
                    return Ok(());
                }
                VM_PORT_SET_CONNECTION if rest.is_empty() => {
                    let _ = self.hooks.connect_to_vm_port(None, None);
                    ctx.send_subnegotiation(&[&[VM_PORT_DISCONNECTED]]);
                    return Ok(());
                }
                VM_PORT_SET_CONNECTION if rest.len() > 1 => {
                    let mode = AccessMode::from_u8(rest[0]).unwrap_or_else(|| {
                        tracing::warn!(mode = rest[0], "Unknown locking mode, using READWRITE");
                        AccessMode::ReadWrite
                    });
                    let port_id = std::str::from_utf8(&rest[1..]).map_err(|_| {
                        SessionError::protocol("Client sent non-UTF-8 port identifier")
                    })?;
                    let reply = match self.hooks.connect_to_vm_port(Some(port_id), Some(mode)) {
                        Ok(()) => VM_PORT_CONNECTED,
                        Err(_) => VM_PORT_DISCONNECTED,
                    };
                    ctx.send_subnegotiation(&[&[reply]]);
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(SessionError::protocol("Client sent bad admin subnegotiation"))
    }
}

/// Requests the client side can issue toward the admin server.
#[derive(Clone)]
pub struct AdminRequester {
    session: SessionHandle,
}

impl AdminRequester {
    /// Ask the server for its list of known VM ports.
    pub fn request_vm_port_list(&self) {
        self.session
            .send_subnegotiation(option::VSPC_ADMIN, &[&[GET_VM_PORT_LIST]]);
    }

    /// Ask the server to connect our in-band data to the given VM port.
    pub fn connect_to_vm_port(&self, port_id: &str, mode: AccessMode) {
        self.session.send_subnegotiation(
            option::VSPC_ADMIN,
            &[&[VM_PORT_SET_CONNECTION], &[mode.to_u8()], port_id.as_bytes()],
        );
    }

    /// Ask the server to disconnect our in-band data, so that anything we
    /// send is ignored and no new data arrives after the acknowledgement.
    pub fn disconnect_from_vm_port(&self) {
        self.session
            .send_subnegotiation(option::VSPC_ADMIN, &[&[VM_PORT_SET_CONNECTION]]);
    }
}

/// Callbacks delivered to the application driving the client side.
pub trait AdminClientEvents: Send {
    /// The admin server has become available; requests can now be made.
    fn admin_server_is_available(&mut self, requests: &AdminRequester);

    /// The server provided its list of known VM ports.
    fn received_vm_port_list(&mut self, requests: &AdminRequester, ports: Vec<VmPortInfo>);

    /// The server processed our connection request; `connected` reports the
    /// outcome. In-band data now corresponds to the connected port.
    fn connection_state_update(&mut self, requests: &AdminRequester, connected: bool);
}

/// The client side of the vSPC admin option.
pub struct AdminClientOption<E: AdminClientEvents> {
    events: E,
}

impl<E: AdminClientEvents> AdminClientOption<E> {
    /// Wrap the application callbacks into an option handler.
    pub fn new(events: E) -> Self {
        AdminClientOption { events }
    }

    fn requester(ctx: &OptionContext<'_>) -> Option<AdminRequester> {
        ctx.session().map(|session| AdminRequester {
            session: session.clone(),
        })
    }
}

impl<E: AdminClientEvents> OptionHandler for AdminClientOption<E> {
    fn code(&self) -> u8 {
        option::VSPC_ADMIN
    }

    fn name(&self) -> &'static str {
        "VMWARE-VSPC-ADMIN"
    }

    /// If the other party reports that they are a vSPC admin server, accept
    /// their request to use the option.
    fn should_accept(&mut self, them: bool) -> bool {
        them
    }

    fn state_update(&mut self, ctx: &OptionContext<'_>, them: bool, enabled: bool) {
        if them && enabled {
            if let Some(requests) = Self::requester(ctx) {
                self.events.admin_server_is_available(&requests);
            }
        }
    }

    fn subnegotiate(&mut self, ctx: &OptionContext<'_>, payload: &Bytes) -> Result<(), SessionError> {
        let Some(requests) = Self::requester(ctx) else {
            return Ok(());
        };
        if let Some((&subcommand, rest)) = payload.split_first() {
            match subcommand {
                VM_PORT_CONNECTED | VM_PORT_DISCONNECTED if rest.is_empty() => {
                    self.events
                        .connection_state_update(&requests, subcommand == VM_PORT_CONNECTED);
                    return Ok(());
                }
                VM_PORT_LIST => {
                    let ports = decode_vm_port_list(rest)?;
                    self.events.received_vm_port_list(&requests, ports);
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(SessionError::protocol("Server sent bad admin subnegotiation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, name: Option<&str>, uri: Option<&str>) -> VmPortInfo {
        VmPortInfo {
            port_id: id.into(),
            vm_name: name.map(Into::into),
            listening_uri: uri.map(Into::into),
        }
    }

    #[test]
    fn port_list_round_trips() {
        let ports = vec![
            info("AAAA.com1", Some("build-vm"), None),
            info("BBBB", None, Some("telnet://0.0.0.0:13370")),
        ];
        let blob = encode_vm_port_list(&ports);
        assert_eq!(decode_vm_port_list(&blob).unwrap(), ports);
    }

    #[test]
    fn empty_port_list_encodes_empty() {
        assert!(encode_vm_port_list(&[]).is_empty());
        assert!(decode_vm_port_list(&[]).unwrap().is_empty());
    }

    #[test]
    fn bad_port_list_length_is_protocol_error() {
        // Four NUL-separated fields: not a multiple of three.
        let blob = b"a\0b\0c\0d";
        assert!(matches!(
            decode_vm_port_list(blob),
            Err(SessionError::Protocol(_))
        ));
    }

    #[test]
    fn access_mode_round_trips() {
        for mode in [
            AccessMode::ReadWrite,
            AccessMode::ReadOnly,
            AccessMode::Exclusive,
            AccessMode::ExclusiveWrite,
            AccessMode::ReadOnlyOk,
        ] {
            assert_eq!(AccessMode::from_u8(mode.to_u8()), Some(mode));
        }
        assert_eq!(AccessMode::from_u8(0x42), None);
    }
}
