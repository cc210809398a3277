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

//! Telnet `AUTHENTICATION` (RFC 2941).
//!
//! Only the SSL authentication type is supported, which appears to be
//! largely undocumented; the best reference is probably the
//! netkit-telnet-ssl sources. This implementation can act as either the
//! client or the server. Accepting the SSL handshake triggers the session's
//! TLS upgrade seam; the secure transport itself is the transport owner's
//! concern.

use crate::error::SessionError;
use crate::option::{OptionContext, OptionHandler};
use bytes::Bytes;
use std::sync::Arc;
use tokio_rustls::rustls;
use vspc_telnetcodec::consts::option;

const AUTH_CMD_IS: u8 = 0;
const AUTH_CMD_SEND: u8 = 1;
const AUTH_CMD_REPLY: u8 = 2;

const AUTH_TYPE_SSL: u8 = 7;
// Modifiers ignored.
const AUTH_TYPE_SSL_MODIFIERS: u8 = 0;
const AUTH_TYPE_PAIR_SSL: [u8; 2] = [AUTH_TYPE_SSL, AUTH_TYPE_SSL_MODIFIERS];

const AUTH_SSL_START: u8 = 1;
const AUTH_SSL_ACCEPTED: u8 = 2;

/// TLS configuration handed to the transport owner when the SSL
/// authentication handshake succeeds.
#[derive(Clone, Debug)]
pub enum TlsContext {
    /// Accept-side configuration.
    Server(Arc<rustls::ServerConfig>),
    /// Connect-side configuration.
    Client(Arc<rustls::ClientConfig>),
}

type ContextGenerator = Box<dyn FnMut() -> Result<TlsContext, SessionError> + Send>;

/// The `AUTHENTICATION` option, fixed at construction to one role.
///
/// Either pass a [`TlsContext`] into the constructor or produce one on
/// demand through [`AuthenticationOption::with_generator`]; a triggered
/// upgrade with neither available fails the connection with a
/// configuration error.
pub struct AuthenticationOption {
    is_server: bool,
    auth_type: Option<[u8; 2]>,
    ssl_context: Option<TlsContext>,
    generator: Option<ContextGenerator>,
}

impl AuthenticationOption {
    /// The server role: offers the SSL type once the peer enables the
    /// option, and accepts the peer's request to start SSL.
    pub fn server(ssl_context: Option<TlsContext>) -> Self {
        AuthenticationOption {
            is_server: true,
            auth_type: None,
            ssl_context,
            generator: None,
        }
    }

    /// The client role: answers the server's type list and starts SSL when
    /// the server accepts.
    pub fn client(ssl_context: Option<TlsContext>) -> Self {
        AuthenticationOption {
            is_server: false,
            auth_type: None,
            ssl_context,
            generator: None,
        }
    }

    /// Provide a fallback that builds a TLS context on demand.
    pub fn with_generator(
        mut self,
        generator: impl FnMut() -> Result<TlsContext, SessionError> + Send + 'static,
    ) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    /// Look for our preferred SSL pair in the given list of authentication
    /// type pairs from the other side. If that exact pair isn't present,
    /// accept any SSL pair regardless of modifiers.
    fn find_auth_type(data: &[u8]) -> Option<[u8; 2]> {
        let mut best = None;
        for pair in data.chunks_exact(2) {
            if pair[0] == AUTH_TYPE_SSL {
                if pair[1] == AUTH_TYPE_SSL_MODIFIERS {
                    // Perfect match.
                    return Some([pair[0], pair[1]]);
                }
                // Right type, unexpected modifiers. Hope we see better, and
                // otherwise hope that what we found here is good enough.
                best = Some([pair[0], pair[1]]);
            }
        }
        best
    }

    fn switch_to_tls(&mut self, ctx: &OptionContext<'_>) -> Result<(), SessionError> {
        let context = match self.ssl_context.clone() {
            Some(context) => context,
            None => match self.generator.as_mut() {
                Some(generate) => {
                    let context = generate()?;
                    self.ssl_context = Some(context.clone());
                    context
                }
                None => {
                    return Err(SessionError::Config(
                        "no TLS context available for accepted SSL authentication".into(),
                    ));
                }
            },
        };
        ctx.start_tls(context);
        Ok(())
    }
}

impl OptionHandler for AuthenticationOption {
    fn code(&self) -> u8 {
        option::AUTHENTICATION
    }

    fn name(&self) -> &'static str {
        "AUTHENTICATION"
    }

    /// Accept the other side's use of AUTHENTICATION when it matches our
    /// role: a server accepts the client offering (`them`), a client
    /// accepts the server's request for our side.
    fn should_accept(&mut self, them: bool) -> bool {
        them == self.is_server
    }

    /// When the other side accepts authentication, send our offer.
    fn state_update(&mut self, ctx: &OptionContext<'_>, them: bool, enabled: bool) {
        if them && self.is_server && enabled {
            self.auth_type = Some(AUTH_TYPE_PAIR_SSL);
            ctx.send_subnegotiation(&[&[AUTH_CMD_SEND], &AUTH_TYPE_PAIR_SSL]);
        }
    }

    /// When the other side requests to start SSL, accept it and immediately
    /// switch to TLS.
    fn subnegotiate(&mut self, ctx: &OptionContext<'_>, payload: &Bytes) -> Result<(), SessionError> {
        let mut switch = false;

        if !self.is_server && payload.first() == Some(&AUTH_CMD_SEND) {
            self.auth_type = Self::find_auth_type(&payload[1..]);
            match self.auth_type {
                Some(pair) => {
                    // Elect the chosen auth type.
                    ctx.send_subnegotiation(&[&[AUTH_CMD_IS], &pair, &[AUTH_SSL_START]]);
                }
                None => {
                    // Nothing suitable; decline.
                    ctx.send_subnegotiation(&[&[AUTH_CMD_IS], &[0, 0]]);
                }
            }
        }

        if let Some(pair) = self.auth_type {
            if self.is_server
                && payload.len() >= 4
                && payload[0] == AUTH_CMD_IS
                && payload[1..3] == pair
                && payload[3] == AUTH_SSL_START
            {
                ctx.send_subnegotiation(&[&[AUTH_CMD_REPLY], &pair, &[AUTH_SSL_ACCEPTED]]);
                switch = true;
            }
            if !self.is_server
                && payload.len() >= 4
                && payload[0] == AUTH_CMD_REPLY
                && payload[1..3] == pair
                && payload[3] == AUTH_SSL_ACCEPTED
            {
                switch = true;
            }
        }

        if switch {
            self.switch_to_tls(ctx)?;
        }
        Ok(())
    }
}
