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

//! Telnet protocol constants defined in RFC 854 and RFC 855.

/// Option Subnegotiation End
pub const SE: u8 = 0xF0;
/// No Operation
pub const NOP: u8 = 0xF1;
/// Data Mark - end of urgent data stream
pub const DM: u8 = 0xF2;
/// Break
pub const BRK: u8 = 0xF3;
/// Interrupt Process
pub const IP: u8 = 0xF4;
/// Abort Output
pub const AO: u8 = 0xF5;
/// Are You There
pub const AYT: u8 = 0xF6;
/// Erase Character
pub const EC: u8 = 0xF7;
/// Erase Line
pub const EL: u8 = 0xF8;
/// Go Ahead
pub const GA: u8 = 0xF9;
/// Option Subnegotiation Begin
pub const SB: u8 = 0xFA;
/// Offer an option
pub const WILL: u8 = 0xFB;
/// Decline an offered option
pub const WONT: u8 = 0xFC;
/// Request an option
pub const DO: u8 = 0xFD;
/// Reject a requested option
pub const DONT: u8 = 0xFE;
/// "Interpret As Command" escape
pub const IAC: u8 = 0xFF;

/// Telnet option codes in use by the vSPC.
pub mod option {
    /// Binary Transmission [RFC856](https://tools.ietf.org/html/rfc856)
    pub const BINARY: u8 = 0x00;
    /// Suppress Go Ahead [RFC858](https://tools.ietf.org/html/rfc858)
    pub const SGA: u8 = 0x03;
    /// Authentication Option [RFC2941](https://tools.ietf.org/html/rfc2941)
    pub const AUTHENTICATION: u8 = 0x25;
    /// Com Port Control Option [RFC2217](https://tools.ietf.org/html/rfc2217)
    pub const COM_PORT: u8 = 0x2C;
    /// VMware Serial Port Proxy extension (private)
    pub const VMWARE_EXT: u8 = 0xE8;
    /// vSPC admin protocol (private)
    pub const VSPC_ADMIN: u8 = 0xE9;
}
