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

//! Listener binding.
//!
//! UDS paths are unlinked before bind (stale socket from a crashed run) and
//! again on clean shutdown.

use std::path::PathBuf;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tracing::{debug, warn};

use crate::config::{AgentConfig, TransportKind};
use crate::error::AgentError;

/// A bound listener plus the stream type it accepts.
pub enum AgentListener {
    #[cfg(unix)]
    Uds { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

/// One accepted socket.
pub enum AgentStream {
    #[cfg(unix)]
    Uds(tokio::net::UnixStream),
    Tcp(tokio::net::TcpStream),
}

impl AgentListener {
    pub async fn bind(config: &AgentConfig) -> Result<Self, AgentError> {
        match config.transport {
            TransportKind::Uds => {
                #[cfg(unix)]
                {
                    let path = config.socket_path.clone();
                    unlink_stale(&path);
                    let listener = UnixListener::bind(&path).map_err(|source| AgentError::Bind {
                        target: path.display().to_string(),
                        source,
                    })?;
                    debug!("Bound UDS listener at {}", path.display());
                    Ok(Self::Uds { listener, path })
                }
                #[cfg(not(unix))]
                {
                    Err(AgentError::Bind {
                        target: config.socket_path.display().to_string(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::Unsupported,
                            "UDS transport requires a Unix platform",
                        ),
                    })
                }
            }
            TransportKind::Grpc => {
                let target = format!("{}:{}", config.host, config.port);
                let listener =
                    TcpListener::bind(&target)
                        .await
                        .map_err(|source| AgentError::Bind {
                            target: target.clone(),
                            source,
                        })?;
                debug!("Bound TCP listener at {}", target);
                Ok(Self::Tcp(listener))
            }
        }
    }

    /// Accept one connection; the string is a peer label for logs.
    pub async fn accept(&self) -> std::io::Result<(AgentStream, String)> {
        match self {
            #[cfg(unix)]
            Self::Uds { listener, path } => {
                let (stream, _addr) = listener.accept().await?;
                Ok((AgentStream::Uds(stream), format!("uds:{}", path.display())))
            }
            Self::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                Ok((AgentStream::Tcp(stream), addr.to_string()))
            }
        }
    }

    /// Remove the socket path on clean shutdown; TCP is a no-op.
    pub fn cleanup(&self) {
        #[cfg(unix)]
        if let Self::Uds { path, .. } = self {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to unlink {}: {}", path.display(), e);
                }
            }
        }
    }
}

#[cfg(unix)]
fn unlink_stale(path: &std::path::Path) {
    match std::fs::remove_file(path) {
        Ok(()) => warn!("Removed stale socket at {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not unlink {}: {}", path.display(), e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_over_a_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        let config = AgentConfig {
            socket_path: path.clone(),
            ..Default::default()
        };

        // first bind creates the socket file; dropping the listener leaves
        // the path behind, as a crash would
        let first = AgentListener::bind(&config).await.unwrap();
        drop(first);
        assert!(path.exists());

        let second = AgentListener::bind(&config).await.unwrap();
        second.cleanup();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn tcp_bind_error_is_reported() {
        let config = AgentConfig {
            transport: TransportKind::Grpc,
            host: "203.0.113.1".to_string(), // not a local address
            port: 1,
            ..Default::default()
        };
        assert!(matches!(
            AgentListener::bind(&config).await,
            Err(AgentError::Bind { .. })
        ));
    }
}
