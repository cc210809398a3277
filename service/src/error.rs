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

//! Error types for the option layer.

use thiserror::Error;
use vspc_telnetcodec::CodecError;

/// Result type for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors that terminate a Telnet session.
///
/// All of these are scoped to a single connection: the owning task logs the
/// error, releases whatever the connection held, and closes the transport.
/// They never propagate across connection boundaries.
#[derive(Debug, Error)]
pub enum SessionError {
    /// I/O error from the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error from the codec layer
    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    /// A peer violated the protocol above the framing layer: an impossible
    /// subnegotiation shape, data from a connection that does not own its
    /// port, or a vMotion handoff with unmet preconditions.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The connection required configuration it does not have, such as a TLS
    /// context for an accepted SSL authentication.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Shorthand for a [`SessionError::Protocol`] with the given message.
    pub fn protocol(message: impl Into<String>) -> Self {
        SessionError::Protocol(message.into())
    }
}
