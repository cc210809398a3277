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

//! Accepts connections from VMware virtual serial ports (or other
//! compatible endpoints) and sends all in-band data from each port to each
//! other port. There is no checking of serial port parameters, so this
//! somewhat-unusual "null modem" allows communication between endpoints
//! with differing baud rates, data sizes and the like.
//!
//! Although intended to connect just two ports at a time, it imposes no
//! limit on the number of ports; just be careful to avoid creating feedback
//! loops through the attached endpoints.

use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vspc_service::{SessionEvent, SessionHandle, TelnetSession};

/// Every connected endpoint's outbound handle, by connection id.
type Connections = Arc<Mutex<Vec<(u64, SessionHandle)>>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let bind = std::env::var("VSPC_NULL_MODEM_BIND").unwrap_or_else(|_| "127.0.0.1:13370".into());
    let listener = TcpListener::bind(&bind).await?;
    info!("Serving on {}", listener.local_addr()?);

    let connections: Connections = Arc::new(Mutex::new(Vec::new()));
    let mut next_id = 0u64;
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "Serial port connection received");
        let id = next_id;
        next_id += 1;
        let connections = connections.clone();
        tokio::spawn(async move {
            telnet_accept(connections, id, stream).await;
        });
    }
}

/// A serial port connection has been received. Add it to the list of
/// connections and forward its data to all other connections.
async fn telnet_accept(connections: Connections, id: u64, stream: TcpStream) {
    let mut session = TelnetSession::new(stream);
    connections.lock().unwrap().push((id, session.handle()));

    loop {
        match session.next_event().await {
            Ok(Some(SessionEvent::Data(data))) => {
                let peers = connections.lock().unwrap();
                for (other_id, other) in peers.iter() {
                    if *other_id != id {
                        other.send_data(data.clone());
                    }
                }
            }
            // We aren't expecting any Telnet functions here. If one slips
            // through, ignore it.
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "Connection terminated");
                break;
            }
        }
    }

    connections.lock().unwrap().retain(|(other_id, _)| *other_id != id);
}
