use async_trait::async_trait;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

use crate::config::SourceConfig;

/// Tells whether the game client is up and serving telemetry.
#[async_trait]
pub trait PresenceProbe: Send + Sync {
    async fn is_source_active(&self) -> bool;
}

/// Process table check plus a TCP connect to the telemetry port.
pub struct PresenceDetector {
    process_names: Vec<String>,
    host: String,
    port: u16,
    connect_timeout: Duration,
    system: Arc<Mutex<System>>,
}

impl PresenceDetector {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            process_names: config
                .process_names
                .iter()
                .map(|name| name.trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout(),
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    fn check(
        system: &Mutex<System>,
        process_names: &[String],
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> bool {
        if !process_names.is_empty() && !process_running(system, process_names) {
            return false;
        }
        port_open(host, port, timeout)
    }
}

#[async_trait]
impl PresenceProbe for PresenceDetector {
    async fn is_source_active(&self) -> bool {
        let system = Arc::clone(&self.system);
        let names = self.process_names.clone();
        let host = self.host.clone();
        let port = self.port;
        let timeout = self.connect_timeout;

        tokio::task::spawn_blocking(move || Self::check(&system, &names, &host, port, timeout))
            .await
            .unwrap_or(false)
    }
}

fn process_running(system: &Mutex<System>, names: &[String]) -> bool {
    let Ok(mut system) = system.lock() else {
        return false;
    };
    system.refresh_processes(ProcessesToUpdate::All, true);
    system.processes().values().any(|process| {
        let process_name = process.name().to_string_lossy().to_ascii_lowercase();
        let exe_name = process
            .exe()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().to_ascii_lowercase());
        names.iter().any(|candidate| {
            *candidate == process_name || exe_name.as_deref() == Some(candidate.as_str())
        })
    })
}

/// Any failure (resolution, refusal, timeout) counts as closed.
pub fn port_open(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            debug!("Cannot resolve {}:{}: {}", host, port, e);
            return false;
        }
    };
    addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, timeout).is_ok())
}
