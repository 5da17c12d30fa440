// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Launcher: env config + CLI overlay feeding the runtime with the
// allow-everything capability. Unknown CLI options are ignored.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};

use edgeguard::constants::defaults;
use edgeguard::{AgentConfig, AgentServer, DefaultCapability, TransportKind};

#[derive(Parser, Debug)]
#[command(name = "edgeguard", version, about, ignore_errors = true)]
struct Cli {
    /// UDS socket path
    #[arg(long)]
    socket: Option<PathBuf>,

    /// TCP bind host
    #[arg(long)]
    host: Option<String>,

    /// TCP bind port
    #[arg(long)]
    port: Option<u16>,

    /// Transport: uds, grpc (alias tcp)
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Log filter, e.g. "info" or "edgeguard=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON-structured logs
    #[arg(long)]
    json_logs: bool,

    /// Agent name reported in the handshake
    #[arg(long)]
    name: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = AgentConfig::from_env();
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(transport) = cli.transport {
        config.transport = transport;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if cli.json_logs {
        config.json_logs = true;
    }
    if let Some(name) = cli.name {
        config.agent_name_override = Some(name);
    }

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let agent_name = config
        .agent_name_override
        .clone()
        .unwrap_or_else(|| defaults::AGENT_NAME.to_string());
    install_panic_hook(agent_name);
    init_tracing(&config);

    let server = match AgentServer::bind(config, DefaultCapability).await {
        Ok(server) => server,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let runner = server.clone();
    let serve_task = tokio::spawn(async move { runner.serve().await });

    wait_for_signal().await;
    info!("Signal received, shutting down");
    let stopper = server.clone();
    tokio::spawn(async move { stopper.shutdown().await });

    // a second signal means terminate now
    tokio::select! {
        _ = wait_for_signal() => {
            warn!("Second signal, terminating immediately");
            std::process::exit(1);
        }
        result = serve_task => {
            result??;
        }
    }

    info!("Agent stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// A panic anywhere in the process is tagged with the agent name so the
/// proxy operator can tell which sidecar fell over when several share a
/// host. Logging may itself be broken mid-panic, so this writes straight
/// to stderr.
fn install_panic_hook(agent_name: String) {
    std::panic::set_hook(Box::new(move |info| {
        let cause = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown cause".to_string());
        let location = info
            .location()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown location".to_string());
        let thread = std::thread::current();
        eprintln!(
            "PANIC in agent '{}' (thread '{}') at {}: {}",
            agent_name,
            thread.name().unwrap_or("unnamed"),
            location,
            cause
        );
    }));
}

fn init_tracing(config: &AgentConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    // config.log_level is the single source here: the env var and the CLI
    // flag have already been folded into it by the overlay above
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new(defaults::LOG_LEVEL));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}
