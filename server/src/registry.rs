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

//! Process-wide concentrator state.
//!
//! One [`VspcState`] exists per server process, created in `main` and
//! passed explicitly to every connection task. It owns the VM port
//! registry, the vMotion broker and the statistics counters; there are no
//! hidden globals.

use crate::backend::DiskBackend;
use crate::config::ServerConfig;
use crate::port::VmPort;
use crate::stats::VspcStats;
use crate::vmware::VmConnection;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};
use vspc_service::VmPortInfo;

/// The registries shared by every connection of one vSPC process.
pub struct VspcState {
    /// Server configuration.
    pub config: ServerConfig,
    /// Runtime statistics counters.
    pub stats: Arc<VspcStats>,
    /// All VM ports known to this vSPC, by port id.
    ports: DashMap<String, Arc<VmPort>>,
    /// Pending migrations: `sequence || secret` to the source connection.
    /// Entries live from `VMOTION-BEGIN` until complete, abort or abandon.
    vmotions: DashMap<Vec<u8>, VmConnection>,
}

impl VspcState {
    /// Fresh state for a server process.
    pub fn new(config: ServerConfig) -> Self {
        VspcState {
            config,
            stats: Arc::new(VspcStats::new()),
            ports: DashMap::new(),
            vmotions: DashMap::new(),
        }
    }

    /// Look up a VM port with the given identity, creating it if it does
    /// not already exist. New ports start owned by `veo` and with their
    /// disk log attached.
    pub fn port_for(
        &self,
        veo: &VmConnection,
        vc_uuid: &str,
        port_label: Option<&str>,
        vm_name: Option<&str>,
    ) -> Arc<VmPort> {
        let port_id = VmPort::make_port_id(vc_uuid, port_label);
        let entry = self.ports.entry(port_id).or_insert_with(|| {
            let port = Arc::new(VmPort::new(
                veo.clone(),
                vc_uuid.to_string(),
                port_label.map(ToString::to_string),
                vm_name.map(ToString::to_string),
            ));
            info!("New: {port}");
            match DiskBackend::open(&self.config.log_root, vc_uuid) {
                Ok(disk) => port.attach_unclassified_backend(Arc::new(disk)),
                Err(error) => {
                    warn!(%error, port = %port.port_id(), "Could not open port log, continuing without");
                }
            }
            port
        });
        entry.value().clone()
    }

    /// The port registered under the given id, if any.
    pub fn lookup_port(&self, port_id: &str) -> Option<Arc<VmPort>> {
        self.ports.get(port_id).map(|entry| entry.value().clone())
    }

    /// Drop the port registered under the given id.
    pub fn remove_port(&self, port_id: &str) {
        self.ports.remove(port_id);
    }

    /// A list of all of the VM ports known to this vSPC.
    pub fn port_list(&self) -> Vec<VmPortInfo> {
        self.ports.iter().map(|entry| entry.value().info()).collect()
    }

    /// Number of ports currently registered.
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// File a pending migration under its `sequence || secret` key.
    pub fn insert_vmotion(&self, key: Vec<u8>, source: VmConnection) {
        self.vmotions.insert(key, source);
    }

    /// The source connection of the pending migration with this key.
    pub fn find_vmotion(&self, key: &[u8]) -> Option<VmConnection> {
        self.vmotions.get(key).map(|entry| entry.value().clone())
    }

    /// Clear a pending migration.
    pub fn remove_vmotion(&self, key: &[u8]) {
        self.vmotions.remove(key);
    }

    /// Number of migrations currently pending.
    pub fn pending_vmotions(&self) -> usize {
        self.vmotions.len()
    }
}
