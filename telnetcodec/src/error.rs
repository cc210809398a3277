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

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Represents possible errors that can occur while framing or deframing the
/// Telnet protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// An I/O error occurred while reading from or writing to the underlying
    /// stream.
    IOError {
        /// The kind of I/O error that occurred
        kind: std::io::ErrorKind,
        /// Description of the operation that failed
        operation: String,
    },

    /// An `IAC SE` was received with no subnegotiation in progress.
    UnexpectedSe,

    /// An `IAC` inside a subnegotiation was followed by something other than
    /// `IAC` (escape) or `SE` (terminator).
    ///
    /// Contains the offending command byte.
    BadSubnegotiationCommand(u8),

    /// A subnegotiation terminated without carrying an option code.
    EmptySubnegotiation,
}

impl std::error::Error for CodecError {}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::IOError { kind, operation } => {
                write!(f, "I/O error during {}: {:?}", operation, kind)
            }
            CodecError::UnexpectedSe => {
                write!(f, "Unexpected IAC SE")
            }
            CodecError::BadSubnegotiationCommand(cmd) => {
                write!(f, "Unexpected IAC {:#04x} in option subnegotiation", cmd)
            }
            CodecError::EmptySubnegotiation => {
                write!(f, "Missing option subnegotiation data")
            }
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::IOError {
            kind: err.kind(),
            operation: err.to_string(),
        }
    }
}
