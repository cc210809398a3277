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

//! A client to interact with the virtual serial port concentrator through
//! its administrative interface, conventionally on TCP port 13371.
//!
//! With no port identifier on the command line, lists the serial ports
//! available on the vSPC, sorted by VM name. With one, connects the local
//! terminal to that port read-write and bridges stdin/stdout to it until
//! end-of-file.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use vspc_service::{
    AccessMode, AdminClientEvents, AdminClientOption, AdminRequester, OptionSlot, SessionEvent,
    TelnetSession, VmPortInfo,
};

/// What the option callbacks tell the main loop to do next.
enum Control {
    /// The requested port is attached; begin bridging the terminal.
    Bridge,
    /// All done (a listing was printed, or the server turned us away).
    Exit(i32),
}

struct ClientEvents {
    wanted_port: Option<String>,
    control: mpsc::UnboundedSender<Control>,
}

impl ClientEvents {
    fn display(port: &VmPortInfo) -> String {
        format!(
            "{}  {}  {}",
            port.vm_name.as_deref().unwrap_or(""),
            port.port_id,
            port.listening_uri.as_deref().unwrap_or("")
        )
    }
}

impl AdminClientEvents for ClientEvents {
    fn admin_server_is_available(&mut self, requests: &AdminRequester) {
        match &self.wanted_port {
            // Attempt to connect to the named port.
            Some(port_id) => requests.connect_to_vm_port(port_id, AccessMode::ReadWrite),
            // No port given; request a list of known ports.
            None => requests.request_vm_port_list(),
        }
    }

    fn received_vm_port_list(&mut self, _requests: &AdminRequester, mut ports: Vec<VmPortInfo>) {
        if self.wanted_port.is_some() {
            println!("The server did not recognize the port identifier.  Known ports:");
        } else {
            println!("List of known ports:");
            println!("VM_NAME    VM_PORT_ID");
            println!("=======    ==========");
        }
        ports.sort_by(|a, b| a.vm_name.cmp(&b.vm_name));
        for port in &ports {
            println!("{}", ClientEvents::display(port));
        }
        let _ = self.control.send(Control::Exit(0));
    }

    fn connection_state_update(&mut self, requests: &AdminRequester, connected: bool) {
        if connected {
            eprintln!(
                "Connected to virtual serial port \"{}\".",
                self.wanted_port.as_deref().unwrap_or("")
            );
            let _ = self.control.send(Control::Bridge);
        } else {
            // The named port was not known or not available; show what is.
            requests.request_vm_port_list();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let wanted_port = args.next();
    if args.next().is_some() {
        eprintln!("usage: vspc-client [vm_port_id]");
        std::process::exit(2);
    }
    let server = std::env::var("VSPC_ADMIN_ADDR").unwrap_or_else(|_| "127.0.0.1:13371".into());

    let stream = TcpStream::connect(&server).await?;
    let mut session = TelnetSession::new(stream);

    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    let events = ClientEvents {
        wanted_port,
        control: control_tx,
    };
    session.add_option(OptionSlot::new(Box::new(AdminClientOption::new(events))));

    let handle = session.handle();
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut stdin_buffer = [0u8; 1024];
    let mut bridging = false;

    loop {
        tokio::select! {
            event = session.next_event() => match event {
                Ok(Some(SessionEvent::Data(data))) => {
                    // Received data from the VM.
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
                Ok(Some(SessionEvent::Function(_))) => {
                    // We aren't expecting any Telnet functions here. If one
                    // slips through, ignore it.
                }
                Ok(Some(SessionEvent::UpgradeTls(_))) => {
                    warn!("Server requested a TLS upgrade this client does not perform");
                }
                Ok(None) => break,
                Err(error) => {
                    eprintln!("Connection failed: {error}");
                    std::process::exit(1);
                }
            },
            control = control_rx.recv() => match control {
                Some(Control::Bridge) => {
                    bridging = true;
                }
                Some(Control::Exit(code)) => {
                    std::process::exit(code);
                }
                None => break,
            },
            read = stdin.read(&mut stdin_buffer), if bridging => {
                match read {
                    Ok(0) => break,
                    Ok(count) => {
                        handle.send_data(Bytes::copy_from_slice(&stdin_buffer[..count]));
                    }
                    Err(error) => {
                        eprintln!("stdin failed: {error}");
                        break;
                    }
                }
            },
        }
    }

    eprintln!("Exiting.");
    Ok(())
}
