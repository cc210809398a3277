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

//! The per-connection Telnet session.
//!
//! A [`TelnetSession`] composes a framed transport with the set of options
//! in use on the connection. Negotiations and subnegotiations are consumed
//! internally and routed to the registered [`OptionSlot`]s; callers of
//! [`TelnetSession::next_event`] observe only in-band data, NVT control
//! functions, and the TLS upgrade trigger.
//!
//! Outbound traffic flows through the cloneable [`SessionHandle`], so that
//! option handlers, port backends and other connections can emit bytes
//! toward this connection without holding the session itself.

use crate::auth::TlsContext;
use crate::error::SessionError;
use crate::option::{BinaryOption, OptionSlot, SuppressGoAheadOption, UnknownOption};
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, warn};
use vspc_telnetcodec::{CodecError, NegotiationAction, TelnetCodec, TelnetFrame};

/// An event surfaced to the owner of a [`TelnetSession`] after option
/// processing.
#[derive(Debug)]
pub enum SessionEvent {
    /// In-band data from the other party, IAC escaping removed.
    Data(Bytes),
    /// An RFC 854 NVT control function.
    Function(u8),
    /// An option asked the transport to upgrade to TLS in place. Performing
    /// the upgrade is the transport owner's concern; reads and writes after
    /// a successful upgrade carry ciphertext.
    UpgradeTls(TlsContext),
}

/// Commands queued toward the session's write half.
#[derive(Debug)]
pub(crate) enum OutboundCmd {
    Frame(TelnetFrame),
    StartTls(TlsContext),
}

/// A cloneable handle used to emit outbound traffic on a session.
///
/// The handle holds no lock: sends enqueue onto the session's outbound
/// queue and leave the socket in call order. Sends on a session that has
/// gone away are silently dropped.
#[derive(Clone)]
pub struct SessionHandle {
    outbound: mpsc::UnboundedSender<OutboundCmd>,
}

impl SessionHandle {
    /// Send raw in-band data. IAC bytes are escaped on the wire.
    pub fn send_data(&self, data: Bytes) {
        self.send(OutboundCmd::Frame(TelnetFrame::Data(data)));
    }

    /// Send an option negotiation (`IAC action code`).
    pub fn send_negotiation(&self, code: u8, action: NegotiationAction) {
        self.send(OutboundCmd::Frame(TelnetFrame::Negotiate(action, code)));
    }

    /// Construct and send an option subnegotiation, concatenating `parts`
    /// into the payload.
    pub fn send_subnegotiation(&self, code: u8, parts: &[&[u8]]) {
        let mut payload = BytesMut::with_capacity(parts.iter().map(|p| p.len()).sum());
        for part in parts {
            payload.extend_from_slice(part);
        }
        self.send(OutboundCmd::Frame(TelnetFrame::Subnegotiate(
            code,
            payload.freeze(),
        )));
    }

    /// Request the in-place TLS upgrade.
    pub fn start_tls(&self, context: TlsContext) {
        self.send(OutboundCmd::StartTls(context));
    }

    fn send(&self, cmd: OutboundCmd) {
        if self.outbound.send(cmd).is_err() {
            debug!("Dropping outbound command for closed session");
        }
    }
}

/// Manage a Telnet connection and the set of options in use.
///
/// The options registered on a session are the options known or available on
/// this end of the connection; the other party might have declined or
/// refused some of them, in which case they remain registered but inactive.
/// `BINARY` and `SUPPRESS-GO-AHEAD` are pre-registered on every session.
pub struct TelnetSession<T> {
    framed: Framed<T, TelnetCodec>,
    options: HashMap<u8, OptionSlot>,
    handle: SessionHandle,
    outbound_rx: mpsc::UnboundedReceiver<OutboundCmd>,
}

impl<T> TelnetSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a transport into a session with the default options
    /// registered.
    pub fn new(transport: T) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            outbound: outbound_tx,
        };
        let mut session = TelnetSession {
            framed: Framed::new(transport, TelnetCodec::new()),
            options: HashMap::new(),
            handle,
            outbound_rx,
        };
        session.add_option(OptionSlot::new(Box::new(BinaryOption)));
        session.add_option(OptionSlot::new(Box::new(SuppressGoAheadOption)));
        session
    }

    /// A cloneable handle for emitting outbound traffic on this session.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Attaches the given option to this session. Future negotiation of
    /// that option is handled automatically; negotiations the option queued
    /// before attachment are flushed now.
    pub fn add_option(&mut self, mut slot: OptionSlot) {
        slot.attach(self.handle.clone());
        self.options.insert(slot.code(), slot);
    }

    /// Access a registered option slot, primarily for liveness checks.
    pub fn option(&self, code: u8) -> Option<&OptionSlot> {
        self.options.get(&code)
    }

    /// Send in-band data to the other party.
    pub fn send_bytes(&self, data: Bytes) {
        self.handle.send_data(data);
    }

    /// Produce the next post-option event on this connection.
    ///
    /// Drives both directions: decoded frames are processed to completion
    /// (negotiations answered, subnegotiations dispatched) before the next
    /// frame is pulled, and queued outbound traffic is written in call
    /// order. Returns `Ok(None)` on end-of-file; transport disconnects are
    /// treated the same way.
    pub async fn next_event(&mut self) -> Result<Option<SessionEvent>, SessionError> {
        loop {
            tokio::select! {
                frame = self.framed.next() => {
                    match frame {
                        None => return Ok(None),
                        Some(Err(error)) => {
                            if let CodecError::IOError { kind, .. } = &error {
                                if is_disconnect(*kind) {
                                    return Ok(None);
                                }
                            }
                            return Err(SessionError::Codec(error));
                        }
                        Some(Ok(frame)) => {
                            if let Some(event) = self.process_frame(frame)? {
                                return Ok(Some(event));
                            }
                        }
                    }
                }
                Some(cmd) = self.outbound_rx.recv() => {
                    match cmd {
                        OutboundCmd::Frame(frame) => {
                            if let Err(error) = self.framed.send(frame).await {
                                if let CodecError::IOError { kind, .. } = &error {
                                    if is_disconnect(*kind) {
                                        return Ok(None);
                                    }
                                }
                                return Err(SessionError::Codec(error));
                            }
                        }
                        OutboundCmd::StartTls(context) => {
                            return Ok(Some(SessionEvent::UpgradeTls(context)));
                        }
                    }
                }
            }
        }
    }

    fn process_frame(&mut self, frame: TelnetFrame) -> Result<Option<SessionEvent>, SessionError> {
        match frame {
            TelnetFrame::Data(data) => Ok(Some(SessionEvent::Data(data))),
            TelnetFrame::Function(function) => Ok(Some(SessionEvent::Function(function))),
            TelnetFrame::Negotiate(action, code) => {
                let handle = self.handle.clone();
                let slot = self.options.entry(code).or_insert_with(|| {
                    let mut slot = OptionSlot::new(Box::new(UnknownOption::new(code)));
                    slot.attach(handle);
                    slot
                });
                slot.respond(action);
                Ok(None)
            }
            TelnetFrame::Subnegotiate(code, payload) => {
                match self.options.get_mut(&code) {
                    Some(slot) => slot.subnegotiate(&payload)?,
                    None => {
                        warn!(option = code, "Unhandled option subnegotiation, dropping");
                    }
                }
                Ok(None)
            }
        }
    }
}

/// Transport-level disconnects are normal stream termination.
fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof
    )
}
