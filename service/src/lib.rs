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

//! # vSPC Telnet Option Layer
//!
//! This crate sits between the raw framing codec (`vspc-telnetcodec`) and
//! the concentrator logic. It owns the essence of a Telnet "option"
//! (RFC 855): the per-side negotiation state machines from RFC 1143, the
//! [`OptionHandler`] seam that option implementations plug into, and the
//! [`TelnetSession`] that composes a framed transport with the set of
//! options in use on a connection.
//!
//! Clients of this crate never deal with the mechanics of the negotiation
//! process. Data transfer at this level consists of actions such as:
//!
//! - Request the `BINARY` option.
//! - If the other party requests `COM-PORT`, allow it and notify me when it
//!   becomes active.
//! - The other party sent us some in-band data.
//! - We should send some in-band data to the other party.
//!
//! Option implementations provided here:
//!
//! - `BINARY` (RFC 856) and `SUPPRESS-GO-AHEAD` (RFC 858), assumed to always
//!   be acceptable on both sides of every connection and pre-registered on
//!   every session.
//! - `AUTHENTICATION` (RFC 2941), SSL type only, either role; accepting the
//!   SSL handshake triggers the TLS upgrade seam.
//! - `COM-PORT` (RFC 2217) in the access-server role, recording the serial
//!   parameters the client reports.
//! - The VMware serial-proxy extension constants and helpers, plus the
//!   client-side stub used for testing. The server side lives in
//!   `vspc-server`, which owns the port registry and vMotion broker.
//! - The vSPC admin option, both sides, glued to applications through the
//!   [`AdminServerHooks`] and [`AdminClientEvents`] traits.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

pub mod admin;
mod auth;
mod comport;
mod error;
mod negotiation;
mod option;
mod session;
pub mod vmware;

pub use self::admin::{
    AccessMode, AdminClientEvents, AdminClientOption, AdminRequester, AdminServerHooks,
    AdminServerOption, PortConnectError, VmPortInfo,
};
pub use self::auth::{AuthenticationOption, TlsContext};
pub use self::comport::ComPortOption;
pub use self::error::{SessionError, SessionResult};
pub use self::negotiation::QState;
pub use self::option::{
    BinaryOption, OptionContext, OptionHandler, OptionSlot, SuppressGoAheadOption, UnknownOption,
};
pub use self::session::{SessionEvent, SessionHandle, TelnetSession};
pub use self::vmware::VmwareClientOption;
