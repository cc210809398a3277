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

//! # vSPC Telnet Protocol Codec
//!
//! This crate knows only about RFC 854 and RFC 855: the generic parts of
//! Telnet framing, escaping and unescaping, option negotiation and option
//! subnegotiation. It is the lowest layer of the vSPC stack and is shared by
//! the concentrator, the null-modem and the admin client.
//!
//! ## Overview
//!
//! [`TelnetCodec`] implements the [`Decoder`] and [`Encoder`] traits from
//! `tokio_util::codec` and converts a byte stream into a stream of
//! [`TelnetFrame`] values:
//!
//! - **Data**: a contiguous run of in-band bytes with IAC escaping removed.
//! - **Function**: one of the RFC 854 NVT control functions (Data Mark, Are
//!   You There, Go Ahead, ...). NOP is consumed by the decoder and never
//!   surfaced.
//! - **Negotiate**: a `WILL`/`WONT`/`DO`/`DONT` paired with an option code.
//! - **Subnegotiate**: an option code plus an unescaped payload delimited by
//!   `IAC SB ... IAC SE` on the wire.
//!
//! Interpreting negotiations and subnegotiation payloads is the
//! responsibility of the option layer above this crate; at this level a
//! message is only ever "the other party sent `WILL` for option N" or "we
//! should send a subnegotiation for option N with these bytes".
//!
//! ## IAC Escaping
//!
//! Since 0xFF (IAC) introduces every command, a literal 0xFF data byte is
//! transmitted doubled (`IAC IAC`), both in-band and inside subnegotiation
//! payloads. Encoding the decoded frame stream reproduces the original byte
//! stream exactly.
//!
//! ## Error Handling
//!
//! Malformed framing surfaces as [`CodecError`]: an `IAC SE` with no open
//! subnegotiation, an `IAC <cmd>` other than `IAC IAC`/`IAC SE` inside a
//! subnegotiation, or a subnegotiation that closes without even an option
//! code. Unknown two-byte commands are treated as NOP and ignored.

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

mod codec;
pub mod consts;
mod error;
mod frame;

pub use self::codec::TelnetCodec;
pub use self::error::{CodecError, CodecResult};
pub use self::frame::{NegotiationAction, TelnetFrame};
