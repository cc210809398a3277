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

//! The Telnet option seam.
//!
//! An [`OptionHandler`] supplies the definition of a single Telnet option:
//! whether to accept it, what to do when it turns on or off, and how to
//! decode its subnegotiation payloads. An [`OptionSlot`] wraps a handler
//! with the two RFC 1143 negotiation states and the plumbing back to the
//! session, so handler implementations never touch the negotiation process
//! itself.

use crate::error::SessionError;
use crate::negotiation::{QState, q_request, q_respond};
use crate::session::SessionHandle;
use crate::auth::TlsContext;
use bytes::Bytes;
use tracing::warn;
use vspc_telnetcodec::NegotiationAction;

/// The plumbing an option handler can reach while it is being driven.
///
/// Handlers receive a context on every hook invocation and use it to emit
/// subnegotiations or to trigger the TLS upgrade. A context with no session
/// attached (possible only before [`OptionSlot::attach`]) drops sends with a
/// warning.
pub struct OptionContext<'a> {
    code: u8,
    session: Option<&'a SessionHandle>,
}

impl OptionContext<'_> {
    /// A context with no session attached, for driving a handler directly.
    pub(crate) fn detached(code: u8) -> OptionContext<'static> {
        OptionContext {
            code,
            session: None,
        }
    }

    /// The option code this context is scoped to.
    pub fn code(&self) -> u8 {
        self.code
    }

    /// The session handle, if the option is attached to a session.
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session
    }

    /// Construct and send a subnegotiation to the other party. The payload
    /// is assembled by concatenating `parts`.
    pub fn send_subnegotiation(&self, parts: &[&[u8]]) {
        match self.session {
            Some(session) => session.send_subnegotiation(self.code, parts),
            None => warn!(
                option = self.code,
                "Dropping subnegotiation for detached option"
            ),
        }
    }

    /// Request that the underlying transport upgrade to TLS in place.
    pub fn start_tls(&self, context: TlsContext) {
        match self.session {
            Some(session) => session.start_tls(context),
            None => warn!(option = self.code, "Dropping TLS upgrade for detached option"),
        }
    }
}

/// The definition of a single Telnet option.
///
/// Implementations provide the option-specific logic; the negotiation
/// mechanics live in [`OptionSlot`]. Implementations will often just
/// `return true` or `return them` from [`should_accept`].
///
/// [`should_accept`]: OptionHandler::should_accept
pub trait OptionHandler: Send {
    /// The option code this handler implements.
    fn code(&self) -> u8;

    /// Display name used in logs.
    fn name(&self) -> &'static str;

    /// Whether we agree to the other party's request to use the option.
    ///
    /// `them` is true when the request concerns the other party's side of
    /// the connection (they sent `WILL`), false when it concerns ours (they
    /// sent `DO`). Options are rejected by default.
    fn should_accept(&mut self, them: bool) -> bool {
        let _ = them;
        false
    }

    /// Hook invoked when the option is activated or deactivated for one
    /// party.
    fn state_update(&mut self, ctx: &OptionContext<'_>, them: bool, enabled: bool) {
        let _ = (ctx, them, enabled);
    }

    /// Hook invoked with the payload of a received subnegotiation.
    fn subnegotiate(&mut self, ctx: &OptionContext<'_>, payload: &Bytes) -> Result<(), SessionError> {
        let _ = (ctx, payload);
        Ok(())
    }
}

/// An option in use on a connection: handler plus negotiation state.
///
/// Tracks the `us` and `them` Q-states, queues negotiation bytes requested
/// before the slot is attached to a session, and translates between wire
/// actions and the RFC 1143 state machine.
pub struct OptionSlot {
    us: QState,
    them: QState,
    handler: Box<dyn OptionHandler>,
    session: Option<SessionHandle>,
    queued: Vec<NegotiationAction>,
}

impl OptionSlot {
    /// Wraps a handler into a detached slot with both sides disabled.
    pub fn new(handler: Box<dyn OptionHandler>) -> Self {
        OptionSlot {
            us: QState::No,
            them: QState::No,
            handler,
            session: None,
            queued: Vec::new(),
        }
    }

    /// The option code of the wrapped handler.
    pub fn code(&self) -> u8 {
        self.handler.code()
    }

    /// Whether the option is enabled on our side.
    pub fn us_enabled(&self) -> bool {
        self.us.enabled()
    }

    /// Whether the option is enabled on the other party's side.
    pub fn them_enabled(&self) -> bool {
        self.them.enabled()
    }

    /// Attaches the slot to a session, flushing any negotiation started
    /// before the slot was associated with a connection.
    pub(crate) fn attach(&mut self, session: SessionHandle) {
        for action in self.queued.drain(..) {
            session.send_negotiation(self.handler.code(), action);
        }
        self.session = Some(session);
    }

    /// A caller on our side asks to activate or deactivate the option,
    /// either for `us` or for `them`.
    pub fn request(&mut self, them: bool, enable: bool) {
        let init_state = if them { self.them } else { self.us };
        let (new_state, response) = q_request(init_state, enable);
        let action = response.map(|enable| match (them, enable) {
            (true, true) => NegotiationAction::Do,
            (true, false) => NegotiationAction::Dont,
            (false, true) => NegotiationAction::Will,
            (false, false) => NegotiationAction::Wont,
        });
        self.apply(them, init_state, new_state, action);
    }

    /// The other party sent a `WILL`/`WONT`/`DO`/`DONT` for this option.
    pub(crate) fn respond(&mut self, action: NegotiationAction) {
        let activate = action.activates();
        let them = action.concerns_sender();
        let init_state = if them { self.them } else { self.us };
        let accept =
            init_state == QState::No && activate && self.handler.should_accept(them);
        let (new_state, response) = q_respond(init_state, activate, accept);
        let answer = response.map(|enable| match (them, enable) {
            (true, true) => NegotiationAction::Do,
            (true, false) => NegotiationAction::Dont,
            (false, true) => NegotiationAction::Will,
            (false, false) => NegotiationAction::Wont,
        });
        self.apply(them, init_state, new_state, answer);
    }

    /// A subnegotiation payload arrived for this option.
    pub(crate) fn subnegotiate(&mut self, payload: &Bytes) -> Result<(), SessionError> {
        let ctx = OptionContext {
            code: self.handler.code(),
            session: self.session.as_ref(),
        };
        self.handler.subnegotiate(&ctx, payload)
    }

    fn apply(
        &mut self,
        them: bool,
        init_state: QState,
        new_state: QState,
        action: Option<NegotiationAction>,
    ) {
        if them {
            self.them = new_state;
        } else {
            self.us = new_state;
        }

        if let Some(action) = action {
            match &self.session {
                Some(session) => session.send_negotiation(self.handler.code(), action),
                // Negotiation was started by our side before we were
                // associated with a connection. Defer sending until then.
                None => self.queued.push(action),
            }
        }

        // An option is enabled if and only if its state is YES. If that
        // changed, notify the handler.
        let active = new_state.enabled();
        if init_state.enabled() != active {
            let ctx = OptionContext {
                code: self.handler.code(),
                session: self.session.as_ref(),
            };
            self.handler.state_update(&ctx, them, active);
        }
    }
}

/// Placeholder for options which are not known or not in use on the
/// connection. Rejects everything.
pub struct UnknownOption {
    code: u8,
}

impl UnknownOption {
    /// A rejecting handler for the given option code.
    pub fn new(code: u8) -> Self {
        UnknownOption { code }
    }
}

impl OptionHandler for UnknownOption {
    fn code(&self) -> u8 {
        self.code
    }

    fn name(&self) -> &'static str {
        "UNKNOWN"
    }
}

/// The Telnet `BINARY` option (RFC 856) is assumed to always be active, but
/// must still be negotiated.
pub struct BinaryOption;

impl OptionHandler for BinaryOption {
    fn code(&self) -> u8 {
        vspc_telnetcodec::consts::option::BINARY
    }

    fn name(&self) -> &'static str {
        "BINARY"
    }

    fn should_accept(&mut self, _them: bool) -> bool {
        true
    }
}

/// The Telnet `SGA` option (RFC 858) is an anachronism. Supporting it is
/// zero-effort.
pub struct SuppressGoAheadOption;

impl OptionHandler for SuppressGoAheadOption {
    fn code(&self) -> u8 {
        vspc_telnetcodec::consts::option::SGA
    }

    fn name(&self) -> &'static str {
        "SGA"
    }

    fn should_accept(&mut self, _them: bool) -> bool {
        true
    }
}
