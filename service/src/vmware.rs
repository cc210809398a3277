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

//! The VMware Serial Port Proxy extension.
//!
//! This private Telnet option provides enhanced capabilities for emulated
//! serial ports attached to virtual machines on VMware vSphere. Its most
//! noteworthy feature is to facilitate vMotion (live migration) of virtual
//! machines with a serial port.
//!
//! This module carries the wire-level pieces shared by both roles: the
//! suboption codes, the identity sanitizers, the service-URI matcher and
//! the client-side stub used for testing. The concentrator's server side
//! lives in `vspc-server`, next to the port registry and the vMotion
//! broker it manipulates.

use crate::option::{OptionContext, OptionHandler};
use vspc_telnetcodec::consts::option;

/// Known suboptions announcement, sent by the client side on enable.
pub const KNOWN_SUBOPTIONS_1: u8 = 0;
/// Known suboptions announcement, sent by the server side on enable.
pub const KNOWN_SUBOPTIONS_2: u8 = 1;
/// Source host requests permission to begin a vMotion.
pub const VMOTION_BEGIN: u8 = 40;
/// Concentrator grants a vMotion and supplies the secret.
pub const VMOTION_GOAHEAD: u8 = 41;
/// Concentrator declines a vMotion.
pub const VMOTION_NOTNOW: u8 = 43;
/// Destination host presents sequence plus secret.
pub const VMOTION_PEER: u8 = 44;
/// Concentrator acknowledges the destination.
pub const VMOTION_PEER_OK: u8 = 45;
/// Destination host completes the migration.
pub const VMOTION_COMPLETE: u8 = 46;
/// Source host abandons the migration.
pub const VMOTION_ABORT: u8 = 48;
/// Virtual machine asks whether we will proxy for it.
pub const DO_PROXY: u8 = 70;
/// We agree to proxy.
pub const WILL_PROXY: u8 = 71;
/// We decline to proxy.
pub const WONT_PROXY: u8 = 73;
/// Virtual machine reports its VirtualCenter UUID.
pub const VM_VC_UUID: u8 = 80;
/// Ask the virtual machine for its VirtualCenter UUID.
pub const GET_VM_VC_UUID: u8 = 81;
/// Virtual machine reports its display name.
pub const VM_NAME: u8 = 82;
/// Ask the virtual machine for its display name.
pub const GET_VM_NAME: u8 = 83;

/// Every suboption either side understands, in announcement order.
pub const SUBOPTIONS: [u8; 16] = [
    KNOWN_SUBOPTIONS_1,
    KNOWN_SUBOPTIONS_2,
    VMOTION_BEGIN,
    VMOTION_GOAHEAD,
    VMOTION_NOTNOW,
    VMOTION_PEER,
    VMOTION_PEER_OK,
    VMOTION_COMPLETE,
    VMOTION_ABORT,
    VM_VC_UUID,
    GET_VM_VC_UUID,
    VM_NAME,
    GET_VM_NAME,
    DO_PROXY,
    WILL_PROXY,
    WONT_PROXY,
];

/// Convert the given data into a UUID formatted as 32 hex characters.
///
/// Non-ASCII input is rejected; separators and case are normalized away.
pub fn sanitize_uuid(data: &[u8]) -> Option<String> {
    if !data.is_ascii() {
        return None;
    }
    let uuid: String = data
        .iter()
        .map(|byte| (*byte as char).to_ascii_uppercase())
        .filter(|ch| matches!(ch, '0'..='9' | 'A'..='F'))
        .collect();
    if uuid.len() == 32 { Some(uuid) } else { None }
}

/// Outcome of matching a presented service URI against the configured one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UriMatch {
    /// Exact match, no query arguments.
    Exact,
    /// Prefix match with parsed query arguments.
    WithQuery(Vec<(String, String)>),
    /// The URI does not identify this service.
    NoMatch,
}

impl UriMatch {
    /// Whether the URI identified this service.
    pub fn matched(&self) -> bool {
        !matches!(self, UriMatch::NoMatch)
    }

    /// All values given for the named query argument.
    pub fn arg<'a>(&'a self, name: &str) -> Vec<&'a str> {
        match self {
            UriMatch::WithQuery(args) => args
                .iter()
                .filter(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Check whether the provided service URI matches what we provide. If any
/// URI query args are present, parse them; a malformed query string fails
/// the match.
pub fn match_service_uri(configured: &str, presented: &str) -> UriMatch {
    if presented == configured {
        return UriMatch::Exact;
    }
    if let Some(query) = presented.strip_prefix(configured) {
        if let Some(query) = query.strip_prefix('?') {
            if let Some(args) = parse_query(query) {
                return UriMatch::WithQuery(args);
            }
        }
    }
    UriMatch::NoMatch
}

/// Strict `application/x-www-form-urlencoded` query parsing: every field
/// must be a `key=value` pair, blank values are kept, anything malformed
/// fails the whole parse.
fn parse_query(query: &str) -> Option<Vec<(String, String)>> {
    if query.is_empty() {
        return None;
    }
    let mut args = Vec::new();
    for field in query.split('&') {
        let (key, value) = field.split_once('=')?;
        if key.is_empty() {
            return None;
        }
        args.push((unescape(key)?, unescape(value)?));
    }
    Some(args)
}

/// Percent- and plus-unescaping for one query field component.
fn unescape(component: &str) -> Option<String> {
    let bytes = component.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes.get(index + 1..index + 3)?;
                let hex = std::str::from_utf8(hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                index += 2;
            }
            byte => out.push(byte),
        }
        index += 1;
    }
    String::from_utf8(out).ok()
}

/// The client side of the VMware Serial Port Proxy extension is implemented
/// by a virtual serial port, such as may be configured in a virtual machine
/// running on VMware ESXi. A stub client is implemented here to facilitate
/// testing.
pub struct VmwareClientOption;

impl OptionHandler for VmwareClientOption {
    fn code(&self) -> u8 {
        option::VMWARE_EXT
    }

    fn name(&self) -> &'static str {
        "VMWARE-TELNET-EXT"
    }

    fn should_accept(&mut self, them: bool) -> bool {
        !them
    }

    fn state_update(&mut self, ctx: &OptionContext<'_>, _them: bool, enabled: bool) {
        if enabled {
            ctx.send_subnegotiation(&[&[KNOWN_SUBOPTIONS_1], &SUBOPTIONS]);
        }
    }
}
