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

//! The two concentrator listeners.
//!
//! Each accepted TCP connection runs as one independent task that drives
//! its session to completion. Errors never cross connection boundaries: a
//! faulted connection logs, releases whatever it owned and closes, while
//! every other connection continues.

use crate::admin::{AdminCoupling, VspcAdminHooks};
use crate::registry::VspcState;
use crate::vmware::{VmConnection, VmwareServerOption};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use vspc_service::{AdminServerOption, OptionSlot, SessionEvent, TelnetSession};

/// Accept loop for the VM-facing serial port listener.
pub async fn run_vm_listener(vspc: Arc<VspcState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(vspc.config.vm_bind).await?;
    info!("vSPC serving on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "VM serial port connection accepted");
        let vspc = vspc.clone();
        tokio::spawn(async move {
            vm_port_accept(vspc, stream).await;
        });
    }
}

/// Accept loop for the admin listener.
pub async fn run_admin_listener(vspc: Arc<VspcState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(vspc.config.admin_bind).await?;
    info!("vSPC admin console serving on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "Admin connection accepted");
        let vspc = vspc.clone();
        tokio::spawn(async move {
            admin_accept(vspc, stream).await;
        });
    }
}

/// One VM serial port connection, from accept to teardown.
pub async fn vm_port_accept<T>(vspc: Arc<VspcState>, transport: T)
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    vspc.stats.vm_connection_opened();

    let mut session = TelnetSession::new(transport);
    let conn = VmConnection::new(session.handle(), vspc.stats.clone());
    session.add_option(OptionSlot::new(Box::new(VmwareServerOption::new(
        conn.clone(),
        vspc.clone(),
    ))));

    drive_vm_connection(&vspc, &conn, &mut session).await;
    vspc.stats.vm_connection_closed();
}

/// Drive an already-assembled VM connection to completion, then release
/// whatever it owned.
pub async fn drive_vm_connection<T>(
    vspc: &Arc<VspcState>,
    conn: &VmConnection,
    session: &mut TelnetSession<T>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        match session.next_event().await {
            Ok(Some(SessionEvent::Data(data))) => {
                if let Err(error) = conn.receive_bytes(&data) {
                    warn!(%error, "VM connection terminated");
                    break;
                }
            }
            Ok(Some(SessionEvent::Function(function))) => {
                debug!(function, "Ignoring NVT control function from VM");
            }
            Ok(Some(SessionEvent::UpgradeTls(_))) => {
                warn!("Unexpected TLS upgrade request on VM connection");
            }
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "VM connection terminated");
                break;
            }
        }
    }

    conn.teardown(vspc);
}

/// One admin connection, from accept to teardown.
pub async fn admin_accept<T>(vspc: Arc<VspcState>, transport: T)
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    vspc.stats.admin_connection_opened();

    let mut session = TelnetSession::new(transport);
    let coupling = AdminCoupling::new(vspc.clone(), session.handle());
    session.add_option(AdminServerOption::slot(VspcAdminHooks::new(
        coupling.clone(),
    )));

    loop {
        match session.next_event().await {
            Ok(Some(SessionEvent::Data(data))) => {
                // The admin client sent data for its connected port.
                coupling.lock().unwrap().send_to_port(data);
            }
            Ok(Some(SessionEvent::Function(function))) => {
                debug!(function, "Ignoring NVT control function from admin client");
            }
            Ok(Some(SessionEvent::UpgradeTls(_))) => {
                warn!("Unexpected TLS upgrade request on admin connection");
            }
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "Admin connection terminated");
                break;
            }
        }
    }

    coupling.lock().unwrap().disconnect();
    vspc.stats.admin_connection_closed();
}
