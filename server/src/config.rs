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

//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::warn;

/// Configuration for the vSPC server.
///
/// Built from [`Default`] plus builder-style setters; [`from_env`] applies
/// the `VSPC_*` environment overrides used in place of a command-line
/// layer.
///
/// [`from_env`]: ServerConfig::from_env
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address of the VM-facing serial port listener.
    pub vm_bind: SocketAddr,
    /// Address of the admin listener.
    pub admin_bind: SocketAddr,
    /// The service URI we accept in `DO-PROXY` requests.
    pub service_uri: String,
    /// Root directory of the per-port disk logs.
    pub log_root: PathBuf,
    /// Statistics reporting interval in seconds.
    pub stats_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            vm_bind: "0.0.0.0:13370".parse().unwrap(),
            admin_bind: "127.0.0.1:13371".parse().unwrap(),
            service_uri: "vSPC".into(),
            log_root: PathBuf::from("var/run/vspc"),
            stats_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// The defaults with any `VSPC_VM_BIND`, `VSPC_ADMIN_BIND`,
    /// `VSPC_SERVICE_URI` and `VSPC_LOG_ROOT` environment overrides
    /// applied. Unparseable values are reported and ignored.
    pub fn from_env() -> Self {
        let mut config = ServerConfig::default();
        if let Ok(value) = std::env::var("VSPC_VM_BIND") {
            match value.parse() {
                Ok(addr) => config.vm_bind = addr,
                Err(_) => warn!(value, "Ignoring unparseable VSPC_VM_BIND"),
            }
        }
        if let Ok(value) = std::env::var("VSPC_ADMIN_BIND") {
            match value.parse() {
                Ok(addr) => config.admin_bind = addr,
                Err(_) => warn!(value, "Ignoring unparseable VSPC_ADMIN_BIND"),
            }
        }
        if let Ok(value) = std::env::var("VSPC_SERVICE_URI") {
            config.service_uri = value;
        }
        if let Ok(value) = std::env::var("VSPC_LOG_ROOT") {
            config.log_root = PathBuf::from(value);
        }
        config
    }

    /// Set the VM-facing listener address.
    pub fn with_vm_bind(mut self, addr: SocketAddr) -> Self {
        self.vm_bind = addr;
        self
    }

    /// Set the admin listener address.
    pub fn with_admin_bind(mut self, addr: SocketAddr) -> Self {
        self.admin_bind = addr;
        self
    }

    /// Set the service URI accepted in `DO-PROXY` requests.
    pub fn with_service_uri(mut self, uri: impl Into<String>) -> Self {
        self.service_uri = uri.into();
        self
    }

    /// Set the disk log root.
    pub fn with_log_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.log_root = root.into();
        self
    }
}
