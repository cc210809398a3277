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

//! The logical identity of one VM serial port.
//!
//! A [`VmPort`] outlives any single Telnet connection: vMotion moves the
//! port from the source connection to the destination connection while the
//! attached backends and their access classifications stay put. All mutable
//! state sits behind one mutex; the handoff's linearization point is the
//! `veo` swap under that mutex, and no suspension ever occurs while it is
//! held.

use crate::backend::Backend;
use crate::vmware::VmConnection;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tracing::warn;
use vspc_service::{AccessMode, PortConnectError, SessionError, VmPortInfo};

/// One VM serial port known to the concentrator.
pub struct VmPort {
    vc_uuid: String,
    port_label: Option<String>,
    port_id: String,
    state: Mutex<PortState>,
}

struct PortState {
    vm_name: Option<String>,
    listening_uri: Option<String>,
    /// The VMware-extension side of the VM connection currently feeding
    /// this port. Reassigned by vMotion; briefly `None` when detached.
    veo: Option<VmConnection>,
    backends: Vec<Arc<dyn Backend>>,
    readonly_backends: Vec<Arc<dyn Backend>>,
    readwrite_backends: Vec<Arc<dyn Backend>>,
    exclusive_backend: Option<Arc<dyn Backend>>,
    exclusive_write_backend: Option<Arc<dyn Backend>>,
}

impl VmPort {
    /// Format a VM port identifier into the form used for display and for
    /// lookup.
    pub fn make_port_id(vc_uuid: &str, port_label: Option<&str>) -> String {
        match port_label {
            Some(label) => format!("{vc_uuid}.{label}"),
            None => vc_uuid.to_string(),
        }
    }

    /// A new port owned by the given VM connection.
    pub fn new(
        veo: VmConnection,
        vc_uuid: String,
        port_label: Option<String>,
        vm_name: Option<String>,
    ) -> Self {
        let port_id = VmPort::make_port_id(&vc_uuid, port_label.as_deref());
        VmPort {
            vc_uuid,
            port_label,
            port_id,
            state: Mutex::new(PortState {
                vm_name,
                listening_uri: None,
                veo: Some(veo),
                backends: Vec::new(),
                readonly_backends: Vec::new(),
                readwrite_backends: Vec::new(),
                exclusive_backend: None,
                exclusive_write_backend: None,
            }),
        }
    }

    /// The identifier this port registers under.
    pub fn port_id(&self) -> &str {
        &self.port_id
    }

    /// The VC UUID of the owning VM.
    pub fn vc_uuid(&self) -> &str {
        &self.vc_uuid
    }

    /// The port label, when the VM exposes more than one serial port.
    pub fn port_label(&self) -> Option<&str> {
        self.port_label.as_deref()
    }

    /// A snapshot of this port's identity for the admin port list.
    pub fn info(&self) -> VmPortInfo {
        let state = self.state.lock().unwrap();
        VmPortInfo {
            port_id: self.port_id.clone(),
            vm_name: state.vm_name.clone(),
            listening_uri: state.listening_uri.clone(),
        }
    }

    /// Hand off this port from its current VM connection to a new one (or
    /// to none). This is only used during vMotion and admin-forced
    /// disconnects, and is the critical step where the VM's connection
    /// changes from the source host to the destination host.
    pub fn switch_to_veo(&self, new_veo: Option<VmConnection>) {
        self.state.lock().unwrap().veo = new_veo;
    }

    /// Whether the given connection currently owns this port.
    pub fn is_owned_by(&self, veo: &VmConnection) -> bool {
        match &self.state.lock().unwrap().veo {
            Some(current) => current.same_as(veo),
            None => false,
        }
    }

    /// Whether the port currently has an owning connection at all.
    pub fn has_owner(&self) -> bool {
        self.state.lock().unwrap().veo.is_some()
    }

    /// Claim the port for the given connection if it has no owner.
    pub(crate) fn adopt_if_orphaned(&self, veo: &VmConnection) {
        let mut state = self.state.lock().unwrap();
        if state.veo.is_none() {
            state.veo = Some(veo.clone());
        }
    }

    /// Given the access mode requested by a new backend desiring to connect
    /// to this port, figure out whether the access would be granted based
    /// upon the set of existing backend connections. Returns `true` for
    /// read-write access, `false` for read-only.
    pub fn determine_port_access(&self, requested: AccessMode) -> Result<bool, PortConnectError> {
        self.state.lock().unwrap().determine_port_access(requested)
    }

    /// Register a backend outside the locking classification, like the
    /// always-on disk log: it receives all output but never conflicts with
    /// any requested access mode.
    pub fn attach_unclassified_backend(&self, backend: Arc<dyn Backend>) {
        self.state.lock().unwrap().backends.push(backend);
    }

    /// Atomically check access and register `backend` to receive this
    /// port's output. Returns the granted write permission.
    pub fn attach_backend(
        &self,
        backend: Arc<dyn Backend>,
        requested: AccessMode,
    ) -> Result<bool, PortConnectError> {
        let mut state = self.state.lock().unwrap();
        let write = state.determine_port_access(requested)?;
        state.backends.push(backend.clone());
        match requested {
            AccessMode::Exclusive => state.exclusive_backend = Some(backend),
            AccessMode::ExclusiveWrite => state.exclusive_write_backend = Some(backend),
            _ if write => state.readwrite_backends.push(backend),
            _ => state.readonly_backends.push(backend),
        }
        Ok(write)
    }

    /// Remove `backend` from this port; it no longer receives output, and
    /// whatever classification it held is released.
    pub fn remove_backend(&self, backend: &Arc<dyn Backend>) {
        let mut state = self.state.lock().unwrap();
        state
            .backends
            .retain(|existing| !Arc::ptr_eq(existing, backend));
        if state
            .exclusive_backend
            .as_ref()
            .is_some_and(|existing| Arc::ptr_eq(existing, backend))
        {
            state.exclusive_backend = None;
        } else if state
            .exclusive_write_backend
            .as_ref()
            .is_some_and(|existing| Arc::ptr_eq(existing, backend))
        {
            state.exclusive_write_backend = None;
        } else {
            state
                .readwrite_backends
                .retain(|existing| !Arc::ptr_eq(existing, backend));
            state
                .readonly_backends
                .retain(|existing| !Arc::ptr_eq(existing, backend));
        }
    }

    /// The VM has produced bytes of data from its serial port. Send them to
    /// each registered backend, in registration order.
    ///
    /// Only the connection currently owning the port may deliver data; any
    /// other caller is a protocol violation and loses its connection.
    pub fn receive_bytes(&self, veo: &VmConnection, data: &Bytes) -> Result<(), SessionError> {
        let state = self.state.lock().unwrap();
        let owned = matches!(&state.veo, Some(current) if current.same_as(veo));
        if !owned {
            return Err(SessionError::protocol(
                "Received data from an unexpected source",
            ));
        }
        for backend in &state.backends {
            backend.receive_bytes(data);
        }
        Ok(())
    }

    /// A backend has produced bytes of data to send to the VM's serial
    /// port.
    pub fn send_bytes(&self, data: Bytes) {
        let veo = self.state.lock().unwrap().veo.clone();
        match veo {
            Some(veo) => veo.send_bytes(data),
            None => warn!(port = %self.port_id, "Dropping data for detached port"),
        }
    }
}

impl std::fmt::Display for VmPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        match (&self.port_label, &state.vm_name) {
            (Some(label), Some(name)) => write!(
                f,
                "<VM Port: UUID={}, port label=\"{label}\", name=\"{name}\">",
                self.vc_uuid
            ),
            (None, Some(name)) => {
                write!(f, "<VM Port: UUID={}, name=\"{name}\">", self.vc_uuid)
            }
            _ => write!(f, "<VM Port: UUID={}>", self.vc_uuid),
        }
    }
}

impl PortState {
    fn determine_port_access(&self, requested: AccessMode) -> Result<bool, PortConnectError> {
        let mut write_ok = requested != AccessMode::ReadOnly;

        if self.exclusive_backend.is_some() {
            // Another client has exclusive access to this port.
            return Err(PortConnectError::AccessDenied);
        }

        if self.exclusive_write_backend.is_some() {
            match requested {
                // Downgrade to read-only.
                AccessMode::ReadOnlyOk => write_ok = false,
                AccessMode::ReadOnly => {}
                // Another client has exclusive write access to this port.
                _ => return Err(PortConnectError::AccessDenied),
            }
        }

        match requested {
            AccessMode::Exclusive => {
                // There must be no other backends.
                if !self.readonly_backends.is_empty() || !self.readwrite_backends.is_empty() {
                    return Err(PortConnectError::AccessDenied);
                }
            }
            AccessMode::ExclusiveWrite => {
                // There must be no other writer.
                if !self.readwrite_backends.is_empty() {
                    return Err(PortConnectError::AccessDenied);
                }
            }
            _ => {}
        }

        Ok(write_ok)
    }
}
