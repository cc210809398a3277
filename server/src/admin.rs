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

//! Glue between an admin connection and the port registry.
//!
//! An admin client that connects to a port registers an [`AdminBackend`]
//! with that port so it is notified of incoming data; the coupling keeps
//! the reference needed to send data the other way and to detach again.
//! The coupling is shared between the admin option handler (which mutates
//! it on connect/disconnect requests) and the connection task (which routes
//! in-band data through it and tears it down at the end).

use crate::backend::{AdminBackend, Backend};
use crate::port::VmPort;
use crate::registry::VspcState;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use vspc_service::{AccessMode, AdminServerHooks, PortConnectError, SessionHandle, VmPortInfo};

/// The admin connection's attachment to at most one VM port.
pub struct AdminCoupling {
    vspc: Arc<VspcState>,
    session: SessionHandle,
    attached: Option<(Arc<VmPort>, Arc<dyn Backend>)>,
}

impl AdminCoupling {
    /// A coupling for one admin connection, not yet attached to any port.
    pub fn new(vspc: Arc<VspcState>, session: SessionHandle) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(AdminCoupling {
            vspc,
            session,
            attached: None,
        }))
    }

    /// Serial data from the admin client has arrived. Forward it to the
    /// connected VM port, if any.
    pub fn send_to_port(&self, data: Bytes) {
        if let Some((port, _)) = &self.attached {
            port.send_bytes(data);
        }
    }

    /// Ensure this admin client is no longer connected to any VM port.
    pub fn disconnect(&mut self) {
        if let Some((port, backend)) = self.attached.take() {
            port.remove_backend(&backend);
        }
    }

    fn connect(&mut self, port_id: &str, mode: AccessMode) -> Result<(), PortConnectError> {
        self.disconnect();

        let port = self
            .vspc
            .lookup_port(port_id)
            .ok_or(PortConnectError::NotFound)?;

        // Wrap ourselves in a backend and register it with the VM port so
        // that we find out about data arriving from that port; keep the
        // port reference to send data back the other way.
        let backend: Arc<dyn Backend> = Arc::new(AdminBackend::new(self.session.clone()));
        port.attach_backend(backend.clone(), mode)?;
        self.attached = Some((port, backend));
        Ok(())
    }
}

/// The [`AdminServerHooks`] implementation bound to one admin connection.
pub struct VspcAdminHooks {
    coupling: Arc<Mutex<AdminCoupling>>,
}

impl VspcAdminHooks {
    /// Hooks sharing the given coupling with the connection task.
    pub fn new(coupling: Arc<Mutex<AdminCoupling>>) -> Self {
        VspcAdminHooks { coupling }
    }
}

impl AdminServerHooks for VspcAdminHooks {
    fn vm_port_list(&mut self) -> Vec<VmPortInfo> {
        self.coupling.lock().unwrap().vspc.port_list()
    }

    fn connect_to_vm_port(
        &mut self,
        port_id: Option<&str>,
        mode: Option<AccessMode>,
    ) -> Result<(), PortConnectError> {
        let mut coupling = self.coupling.lock().unwrap();
        match port_id {
            Some(port_id) => coupling.connect(port_id, mode.unwrap_or(AccessMode::ReadWrite)),
            None => {
                coupling.disconnect();
                Ok(())
            }
        }
    }
}
