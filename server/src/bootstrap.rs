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

//! Process-level adjustments applied at startup.
//!
//! The concentrator uses a file descriptor per connection and sits on the
//! vMotion critical path, so it raises its open-file limit and asks for a
//! high scheduling priority. Both adjustments are best-effort: failure is
//! reported and the server runs on regardless.

use tracing::{info, warn};

/// File descriptors we would like to have available.
const WANTED_NOFILE: u64 = 32767;

/// Priority we would like to run at.
const WANTED_PRIORITY: i32 = -20;

/// Raise the open-file limit for the process toward [`WANTED_NOFILE`].
pub fn raise_file_limit() {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit writes into the provided struct and nothing else.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
        warn!("Could not read the open-file limit");
        return;
    }
    info!(soft = limit.rlim_cur, hard = limit.rlim_max, "Initial FD limits");

    let wanted = libc::rlimit {
        rlim_cur: limit.rlim_cur.max(WANTED_NOFILE),
        rlim_max: limit.rlim_max.max(WANTED_NOFILE),
    };
    if wanted.rlim_cur == limit.rlim_cur && wanted.rlim_max == limit.rlim_max {
        return;
    }
    // SAFETY: setrlimit reads the provided struct and nothing else.
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &wanted) } == 0 {
        info!(
            soft = wanted.rlim_cur,
            hard = wanted.rlim_max,
            "Raised FD limits"
        );
    } else {
        warn!("Failed to adjust the open-file limit");
    }
}

/// Raise the process priority toward [`WANTED_PRIORITY`]. The vSPC is on
/// the vMotion critical path, so it must not be impeded by lower-priority
/// work.
pub fn raise_priority() {
    // The `which` argument is a distinct type on glibc targets.
    #[allow(clippy::unnecessary_cast)]
    let which = libc::PRIO_PROCESS as _;
    // SAFETY: both calls only touch this process's scheduling priority.
    let original = unsafe { libc::getpriority(which, 0) };
    if unsafe { libc::setpriority(which, 0, WANTED_PRIORITY) } == 0 {
        let current = unsafe { libc::getpriority(which, 0) };
        if current == original {
            info!(priority = original, "Process priority unchanged");
        } else {
            info!(from = original, to = current, "Process priority changed");
        }
    } else {
        warn!(priority = original, "Failed to raise process priority");
    }
}
