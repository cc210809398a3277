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

//! Telnet `COM-PORT` (RFC 2217) in the access-server role.
//!
//! Allows physical serial port parameters to be set and queried through a
//! Telnet channel. The vSPC has no physical port behind it, so the reported
//! parameters are recorded and exposed; no validation is performed.

use crate::error::SessionError;
use crate::option::{OptionContext, OptionHandler};
use bytes::Bytes;
use tracing::debug;
use vspc_telnetcodec::consts::option;

const SET_BAUDRATE: u8 = 1;
const SET_DATASIZE: u8 = 2;
const SET_PARITY: u8 = 3;
const SET_STOPSIZE: u8 = 4;

/// The `COM-PORT` option: we are the "Access Server" in RFC 2217 parlance.
///
/// Parity values: 1=None, 2=Odd, 3=Even, 4=Mark, 5=Space. Stop sizes:
/// 1=1 bit, 2=2 bits, 3=1.5 bits. A zero value in any set-command is a
/// query and leaves the recorded state unchanged.
#[derive(Debug, Default)]
pub struct ComPortOption {
    baud_rate: Option<u32>,
    data_size: Option<u8>,
    parity: Option<u8>,
    stop_size: Option<u8>,
}

impl ComPortOption {
    /// A fresh access-server side with no parameters reported yet.
    pub fn new() -> Self {
        ComPortOption::default()
    }

    /// The most recently reported baud rate.
    pub fn baud_rate(&self) -> Option<u32> {
        self.baud_rate
    }

    /// The most recently reported data size.
    pub fn data_size(&self) -> Option<u8> {
        self.data_size
    }

    /// The most recently reported parity setting.
    pub fn parity(&self) -> Option<u8> {
        self.parity
    }

    /// The most recently reported stop size.
    pub fn stop_size(&self) -> Option<u8> {
        self.stop_size
    }
}

impl OptionHandler for ComPortOption {
    fn code(&self) -> u8 {
        option::COM_PORT
    }

    fn name(&self) -> &'static str {
        "COM-PORT"
    }

    fn should_accept(&mut self, them: bool) -> bool {
        them
    }

    /// Action a request from the client to set one of various serial port
    /// parameters.
    fn subnegotiate(&mut self, _ctx: &OptionContext<'_>, payload: &Bytes) -> Result<(), SessionError> {
        let Some((&subcommand, data)) = payload.split_first() else {
            return Err(SessionError::protocol("Empty COM-PORT subnegotiation"));
        };
        match subcommand {
            SET_BAUDRATE => {
                let bytes: [u8; 4] = data
                    .get(..4)
                    .and_then(|slice| slice.try_into().ok())
                    .ok_or_else(|| SessionError::protocol("Short COM-PORT baud rate"))?;
                let baud_rate = u32::from_be_bytes(bytes);
                if baud_rate != 0 && Some(baud_rate) != self.baud_rate {
                    debug!(baud_rate, "COM-PORT baud rate changed");
                    self.baud_rate = Some(baud_rate);
                }
            }
            SET_DATASIZE => {
                let data_size = *data
                    .first()
                    .ok_or_else(|| SessionError::protocol("Short COM-PORT data size"))?;
                if data_size != 0 && Some(data_size) != self.data_size {
                    debug!(data_size, "COM-PORT data size changed");
                    self.data_size = Some(data_size);
                }
            }
            SET_PARITY => {
                let parity = *data
                    .first()
                    .ok_or_else(|| SessionError::protocol("Short COM-PORT parity"))?;
                if parity != 0 && Some(parity) != self.parity {
                    debug!(parity, "COM-PORT parity changed");
                    self.parity = Some(parity);
                }
            }
            SET_STOPSIZE => {
                let stop_size = *data
                    .first()
                    .ok_or_else(|| SessionError::protocol("Short COM-PORT stop size"))?;
                if stop_size != 0 && Some(stop_size) != self.stop_size {
                    debug!(stop_size, "COM-PORT stop size changed");
                    self.stop_size = Some(stop_size);
                }
            }
            _ => {}
        }
        Ok(())
    }
}
