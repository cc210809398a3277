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

//! # vSPC Server
//!
//! A virtual serial port concentrator (vSPC) suitable for VMware ESXi
//! virtual machines. Facilitates the VMware vMotion migration of virtual
//! machines with network-attached serial ports, ensuring that no data loss
//! occurs.
//!
//! Each VM-facing Telnet connection negotiates the VMware serial-proxy
//! extension and is bound to a [`VmPort`], the logical identity of one VM
//! serial port. The port survives vMotion: the extension's handoff moves
//! the port from the source connection to the destination connection
//! atomically with respect to inbound data. Every port fans its output out
//! to an ordered list of [`Backend`]s - a disk log by default, plus any
//! admin clients coupled through the vSPC admin option with their requested
//! locking mode.
//!
//! The process-wide state (port registry, vMotion broker, statistics) lives
//! in a single [`VspcState`] created in `main` and passed explicitly to
//! every connection task.

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

mod admin;
mod backend;
pub mod bootstrap;
mod config;
mod listener;
mod port;
mod registry;
mod stats;
mod vmware;

pub use self::admin::{AdminCoupling, VspcAdminHooks};
pub use self::backend::{AdminBackend, Backend, DiskBackend, MemoryBackend};
pub use self::config::ServerConfig;
pub use self::listener::{
    admin_accept, drive_vm_connection, run_admin_listener, run_vm_listener, vm_port_accept,
};
pub use self::port::VmPort;
pub use self::registry::VspcState;
pub use self::stats::VspcStats;
pub use self::vmware::{VmConnection, VmwareServerOption};
