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

//! The vSPC server binary.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vspc_server::{ServerConfig, VspcState, bootstrap, run_admin_listener, run_vm_listener};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    bootstrap::raise_file_limit();
    bootstrap::raise_priority();

    let config = ServerConfig::from_env();
    let vspc = Arc::new(VspcState::new(config));

    let stats_task = {
        let vspc = vspc.clone();
        tokio::spawn(async move {
            let interval = Duration::from_secs(vspc.config.stats_interval_secs);
            loop {
                tokio::time::sleep(interval).await;
                vspc.stats.report(vspc.pending_vmotions());
            }
        })
    };

    let admin_task = {
        let vspc = vspc.clone();
        tokio::spawn(async move { run_admin_listener(vspc).await })
    };

    let result = tokio::select! {
        result = run_vm_listener(vspc.clone()) => result.map_err(Into::into),
        result = admin_task => match result {
            Ok(inner) => inner.map_err(Into::into),
            Err(join_error) => Err(join_error.into()),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    stats_task.abort();
    vspc.stats.report(vspc.pending_vmotions());
    result
}
