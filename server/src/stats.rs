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

//! Lock-free runtime statistics.
//!
//! The vSPC is on the vMotion critical path, so the counters are plain
//! atomics touched from the connection tasks; the periodic reporter reads
//! them without coordination. Each counter is mirrored into the `metrics`
//! facade for whichever recorder the embedding process installs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Totals since server start.
#[derive(Debug)]
pub struct VspcStats {
    serial_bytes_received: AtomicU64,
    serial_bytes_transmitted: AtomicU64,
    vm_connections_received: AtomicU64,
    vm_connections_active: AtomicU64,
    admin_connections_received: AtomicU64,
    admin_connections_active: AtomicU64,
    vmotion_begins: AtomicU64,
    vmotion_peers: AtomicU64,
    vmotion_completes: AtomicU64,
    vmotion_aborts: AtomicU64,
    vmotion_abandons: AtomicU64,
    started_at: Instant,
}

impl Default for VspcStats {
    fn default() -> Self {
        Self::new()
    }
}

impl VspcStats {
    /// Fresh counters, stamped with the current time.
    pub fn new() -> Self {
        VspcStats {
            serial_bytes_received: AtomicU64::new(0),
            serial_bytes_transmitted: AtomicU64::new(0),
            vm_connections_received: AtomicU64::new(0),
            vm_connections_active: AtomicU64::new(0),
            admin_connections_received: AtomicU64::new(0),
            admin_connections_active: AtomicU64::new(0),
            vmotion_begins: AtomicU64::new(0),
            vmotion_peers: AtomicU64::new(0),
            vmotion_completes: AtomicU64::new(0),
            vmotion_aborts: AtomicU64::new(0),
            vmotion_abandons: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record serial data arriving from a VM.
    pub fn serial_received(&self, count: u64) {
        self.serial_bytes_received.fetch_add(count, Ordering::Relaxed);
        metrics::counter!("vspc_serial_bytes_received").increment(count);
    }

    /// Record serial data sent toward a VM.
    pub fn serial_transmitted(&self, count: u64) {
        self.serial_bytes_transmitted
            .fetch_add(count, Ordering::Relaxed);
        metrics::counter!("vspc_serial_bytes_transmitted").increment(count);
    }

    /// Record a VM serial port connection being accepted.
    pub fn vm_connection_opened(&self) {
        self.vm_connections_received.fetch_add(1, Ordering::Relaxed);
        self.vm_connections_active.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vspc_vm_connections").increment(1);
        metrics::gauge!("vspc_vm_connections_active").increment(1.0);
    }

    /// Record a VM serial port connection ending.
    pub fn vm_connection_closed(&self) {
        self.vm_connections_active.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!("vspc_vm_connections_active").decrement(1.0);
    }

    /// Record an admin connection being accepted.
    pub fn admin_connection_opened(&self) {
        self.admin_connections_received
            .fetch_add(1, Ordering::Relaxed);
        self.admin_connections_active.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vspc_admin_connections").increment(1);
        metrics::gauge!("vspc_admin_connections_active").increment(1.0);
    }

    /// Record an admin connection ending.
    pub fn admin_connection_closed(&self) {
        self.admin_connections_active.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!("vspc_admin_connections_active").decrement(1.0);
    }

    /// Record a `VMOTION-BEGIN`.
    pub fn vmotion_begin(&self) {
        self.vmotion_begins.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vspc_vmotion_begins").increment(1);
    }

    /// Record a `VMOTION-PEER` lookup.
    pub fn vmotion_peer(&self) {
        self.vmotion_peers.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vspc_vmotion_peers").increment(1);
    }

    /// Record a completed vMotion handoff.
    pub fn vmotion_complete(&self) {
        self.vmotion_completes.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vspc_vmotion_completes").increment(1);
    }

    /// Record an aborted vMotion.
    pub fn vmotion_abort(&self) {
        self.vmotion_aborts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vspc_vmotion_aborts").increment(1);
    }

    /// Record a vMotion abandoned without an explicit abort.
    pub fn vmotion_abandon(&self) {
        self.vmotion_abandons.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("vspc_vmotion_abandons").increment(1);
    }

    /// Bytes received from VMs so far.
    pub fn serial_bytes_received(&self) -> u64 {
        self.serial_bytes_received.load(Ordering::Relaxed)
    }

    /// Bytes transmitted to VMs so far.
    pub fn serial_bytes_transmitted(&self) -> u64 {
        self.serial_bytes_transmitted.load(Ordering::Relaxed)
    }

    /// Log the periodic statistics summary.
    pub fn report(&self, vmotions_in_progress: usize) {
        let uptime = self.started_at.elapsed().as_secs();
        info!(
            uptime_secs = uptime,
            begins = self.vmotion_begins.load(Ordering::Relaxed),
            peers = self.vmotion_peers.load(Ordering::Relaxed),
            completes = self.vmotion_completes.load(Ordering::Relaxed),
            aborts = self.vmotion_aborts.load(Ordering::Relaxed),
            abandons = self.vmotion_abandons.load(Ordering::Relaxed),
            in_progress = vmotions_in_progress,
            "vMotion activity"
        );
        info!(
            vm_total = self.vm_connections_received.load(Ordering::Relaxed),
            vm_active = self.vm_connections_active.load(Ordering::Relaxed),
            admin_total = self.admin_connections_received.load(Ordering::Relaxed),
            admin_active = self.admin_connections_active.load(Ordering::Relaxed),
            "Connections"
        );
        info!(
            received = self.serial_bytes_received.load(Ordering::Relaxed),
            transmitted = self.serial_bytes_transmitted.load(Ordering::Relaxed),
            "Serial data bytes"
        );
    }
}
