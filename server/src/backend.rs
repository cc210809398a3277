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

//! VM port backends.
//!
//! A [`Backend`] represents one consumer of a serial port's output: a file
//! on disk, a buffer in memory, an admin client's Telnet connection, or any
//! manner of thing. Backends receive every inbound byte of their port in
//! registration order.

use bytes::{Bytes, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;
use vspc_service::SessionHandle;

/// One consumer of a VM port's output.
///
/// `receive_bytes` must not block the event loop for long: it runs on the
/// VM connection's task while the port is locked.
pub trait Backend: Send + Sync {
    /// Serial data from the VM has arrived.
    fn receive_bytes(&self, data: &Bytes);
}

/// Logs serial data to a file named for the VC UUID of the associated VM.
///
/// The log lands in `<root>/<uuid[0:2]>/<uuid[0:4]>/<uuid>.log`, appended
/// in binary; parent directories are created as needed.
pub struct DiskBackend {
    path: PathBuf,
    file: Mutex<File>,
}

impl DiskBackend {
    /// Open (or create) the log file for the given VC UUID.
    pub fn open(root: &Path, vc_uuid: &str) -> std::io::Result<Self> {
        let dir = root
            .join(&vc_uuid[0..vc_uuid.len().min(2)])
            .join(&vc_uuid[0..vc_uuid.len().min(4)]);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{vc_uuid}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(DiskBackend {
            path,
            file: Mutex::new(file),
        })
    }

    /// Where this backend writes.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for DiskBackend {
    fn receive_bytes(&self, data: &Bytes) {
        let mut file = self.file.lock().unwrap();
        if let Err(error) = file.write_all(data) {
            warn!(path = %self.path.display(), %error, "Failed to append to port log");
        }
    }
}

/// Stashes serial data into a buffer in memory.
#[derive(Default)]
pub struct MemoryBackend {
    buffer: Mutex<BytesMut>,
}

impl MemoryBackend {
    /// An empty buffer backend.
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// A copy of everything received so far.
    pub fn contents(&self) -> Bytes {
        self.buffer.lock().unwrap().clone().freeze()
    }
}

impl Backend for MemoryBackend {
    fn receive_bytes(&self, data: &Bytes) {
        self.buffer.lock().unwrap().extend_from_slice(data);
    }
}

/// Couples an admin client's Telnet connection to a VM port: inbound serial
/// data is forwarded onto the admin session as in-band data.
pub struct AdminBackend {
    session: SessionHandle,
}

impl AdminBackend {
    /// Forward the port's output onto the given admin session.
    pub fn new(session: SessionHandle) -> Self {
        AdminBackend { session }
    }
}

impl Backend for AdminBackend {
    fn receive_bytes(&self, data: &Bytes) {
        self.session.send_data(data.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_accumulates() {
        let backend = MemoryBackend::new();
        backend.receive_bytes(&Bytes::from_static(b"boot "));
        backend.receive_bytes(&Bytes::from_static(b"ok"));
        assert_eq!(backend.contents(), Bytes::from_static(b"boot ok"));
    }

    #[test]
    fn disk_backend_shards_by_uuid_prefix() {
        let root = std::env::temp_dir().join(format!("vspc-test-{}", std::process::id()));
        let uuid = "50072A6BC1AE2E53CF9CE34A7296B181";
        let backend = DiskBackend::open(&root, uuid).expect("open log");
        backend.receive_bytes(&Bytes::from_static(b"hello"));
        let expected = root.join("50").join("5007").join(format!("{uuid}.log"));
        assert_eq!(backend.path(), expected.as_path());
        assert_eq!(std::fs::read(&expected).unwrap(), b"hello");
        let _ = std::fs::remove_dir_all(&root);
    }
}
