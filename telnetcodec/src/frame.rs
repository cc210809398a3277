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

use crate::consts;
use bytes::Bytes;
use std::fmt;

/// One of the four RFC 854 option negotiation actions.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NegotiationAction {
    /// Offer an option (us -> them: "I will do this")
    Will = consts::WILL,
    /// Decline or disable an offered option
    Wont = consts::WONT,
    /// Request an option (them -> us: "please do this")
    Do = consts::DO,
    /// Reject or disable a requested option
    Dont = consts::DONT,
}

impl NegotiationAction {
    /// Converts the action to its wire byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Converts a wire byte to an action, if it is one.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            consts::WILL => Some(NegotiationAction::Will),
            consts::WONT => Some(NegotiationAction::Wont),
            consts::DO => Some(NegotiationAction::Do),
            consts::DONT => Some(NegotiationAction::Dont),
            _ => None,
        }
    }

    /// Whether this action asks to activate (`WILL`/`DO`) rather than
    /// deactivate (`WONT`/`DONT`) the option.
    pub fn activates(self) -> bool {
        matches!(self, NegotiationAction::Will | NegotiationAction::Do)
    }

    /// Whether this action concerns the sender's side of the connection
    /// (`WILL`/`WONT`) rather than the receiver's (`DO`/`DONT`).
    pub fn concerns_sender(self) -> bool {
        matches!(self, NegotiationAction::Will | NegotiationAction::Wont)
    }
}

impl fmt::Display for NegotiationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationAction::Will => write!(f, "WILL"),
            NegotiationAction::Wont => write!(f, "WONT"),
            NegotiationAction::Do => write!(f, "DO"),
            NegotiationAction::Dont => write!(f, "DONT"),
        }
    }
}

///
/// `TelnetFrame` represents one decoded element of a Telnet stream, and
/// conversely one element to be encoded onto the wire.
///
/// The decoder never produces a `Data` frame containing an unescaped IAC and
/// never coalesces an escaped `IAC IAC` with surrounding data: a literal
/// 0xFF always arrives as its own one-byte `Data` frame.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelnetFrame {
    /// A contiguous run of in-band data bytes.
    Data(Bytes),
    /// An RFC 854 NVT control function (Data Mark through Go Ahead).
    /// NOP is consumed by the decoder and never surfaced.
    Function(u8),
    /// An option negotiation: action plus option code.
    Negotiate(NegotiationAction, u8),
    /// An option subnegotiation: option code plus unescaped payload.
    Subnegotiate(u8, Bytes),
}

impl fmt::Display for TelnetFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelnetFrame::Data(data) => write!(f, "{} bytes of data", data.len()),
            TelnetFrame::Function(func) => write!(f, "IAC {:02x}", func),
            TelnetFrame::Negotiate(action, option) => {
                write!(f, "IAC {} {:#04x}", action, option)
            }
            TelnetFrame::Subnegotiate(option, data) => {
                write!(f, "IAC SB {:#04x} ({} bytes) IAC SE", option, data.len())
            }
        }
    }
}
