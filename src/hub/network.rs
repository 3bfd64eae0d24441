//! Connectivity check run at the top of every loop iteration.

use crate::config::ControlPlaneConfig;
use crate::control_plane::client::resolve_base_url;
use crate::session::SessionStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Answers "is it worth trying the network right now?".
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probe for hosts that always have connectivity (and for tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl NetworkProbe for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Online when a TCP connection to the Control Plane host succeeds.
pub struct TcpProbe {
    config: ControlPlaneConfig,
    session: Arc<SessionStore>,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(config: ControlPlaneConfig, session: Arc<SessionStore>, timeout: Duration) -> Self {
        Self {
            config,
            session,
            timeout,
        }
    }

    fn target(&self) -> Option<(String, u16)> {
        let base = resolve_base_url(&self.config, &self.session).ok()?;
        let url = url::Url::parse(&base).ok()?;
        let host = url.host_str()?.to_owned();
        let port = url.port_or_known_default()?;
        Some((host, port))
    }
}

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn is_online(&self) -> bool {
        let Some((host, port)) = self.target() else {
            debug!("no usable control plane address to probe");
            return false;
        };
        match tokio::time::timeout(
            self.timeout,
            tokio::net::TcpStream::connect((host.as_str(), port)),
        )
        .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(%host, port, "connectivity probe failed: {e}");
                false
            }
            Err(_) => {
                debug!(%host, port, "connectivity probe timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn probe_for(base_url: String) -> TcpProbe {
        let config = ControlPlaneConfig {
            base_url,
            allow_insecure: true,
            ..Default::default()
        };
        TcpProbe::new(
            config,
            Arc::new(SessionStore::in_memory(None)),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn listening_host_is_online() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = probe_for(format!("http://127.0.0.1:{port}"));
        assert!(probe.is_online().await);
    }

    #[tokio::test]
    async fn closed_port_is_offline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let probe = probe_for(format!("http://127.0.0.1:{port}"));
        assert!(!probe.is_online().await);
    }

    #[test]
    fn https_default_port() {
        let probe = probe_for("https://cp.example.com".into());
        assert_eq!(probe.target(), Some(("cp.example.com".to_owned(), 443)));
    }

    #[tokio::test]
    async fn always_online() {
        assert!(AlwaysOnline.is_online().await);
    }
}
