//! Kubernetes client bootstrap.
//!
//! Start-up never fails on cluster problems: without a usable config the
//! server runs offline, and when the API server does not answer the reachability check it
//! runs in limited mode. Tools then report the problem instead.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use serde::Serialize;

use crate::cluster_api::{ClusterApi, KubeClusterApi};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Client built and the API server answered.
    Connected,
    /// Client built, connectivity check failed.
    Limited,
    /// No Kubernetes configuration could be loaded.
    Offline,
}

/// Cluster access of this process, fixed at start-up.
pub struct ClusterConnection {
    mode: ConnectionMode,
    config_source: Option<&'static str>,
    error: Option<String>,
    api: Option<Arc<dyn ClusterApi>>,
}

impl ClusterConnection {
    pub fn connected(api: Arc<dyn ClusterApi>, config_source: &'static str) -> Self {
        Self {
            mode: ConnectionMode::Connected,
            config_source: Some(config_source),
            error: None,
            api: Some(api),
        }
    }

    pub fn limited(config_source: &'static str, error: impl Into<String>) -> Self {
        Self {
            mode: ConnectionMode::Limited,
            config_source: Some(config_source),
            error: Some(error.into()),
            api: None,
        }
    }

    pub fn offline(error: impl Into<String>) -> Self {
        Self {
            mode: ConnectionMode::Offline,
            config_source: None,
            error: Some(error.into()),
            api: None,
        }
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn config_source(&self) -> Option<&'static str> {
        self.config_source
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The cluster API, present only when connected.
    pub fn api(&self) -> Option<&Arc<dyn ClusterApi>> {
        self.api.as_ref()
    }
}

/// Loads in-cluster config first, then the local kubeconfig, and checks
/// the API server by listing one namespace.
pub async fn bootstrap() -> ClusterConnection {
    let (mut config, source) = match load_config().await {
        Ok(loaded) => loaded,
        Err(reason) => {
            tracing::error!(error = %reason, "failed to load Kubernetes configuration");
            tracing::warn!("starting in offline mode, cluster operations are unavailable");
            return ClusterConnection::offline(reason);
        }
    };
    config.connect_timeout = Some(CONNECT_TIMEOUT);
    config.read_timeout = Some(READ_TIMEOUT);

    let client = match Client::try_from(config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "failed to build Kubernetes client");
            return ClusterConnection::limited(source, e.to_string());
        }
    };

    tracing::info!(source, "testing cluster connectivity");
    let namespaces: Api<Namespace> = Api::all(client.clone());
    match namespaces.list(&ListParams::default().limit(1)).await {
        Ok(_) => {
            tracing::info!(source, "cluster connection established");
            ClusterConnection::connected(Arc::new(KubeClusterApi::new(client)), source)
        }
        Err(e) => {
            tracing::error!(error = %e, "cluster connection failed");
            tracing::warn!("starting in limited mode, cluster operations will report errors");
            ClusterConnection::limited(source, e.to_string())
        }
    }
}

async fn load_config() -> Result<(Config, &'static str), String> {
    match Config::incluster() {
        Ok(config) => {
            tracing::info!("loaded in-cluster configuration");
            return Ok((config, "in-cluster"));
        }
        Err(e) => tracing::debug!(error = %e, "in-cluster configuration not available"),
    }

    let config = Config::from_kubeconfig(&KubeConfigOptions::default())
        .await
        .map_err(|e| format!("failed to load kubeconfig: {}", e))?;
    tracing::info!("loaded local kubeconfig");
    Ok((config, "kubeconfig"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_api::testing::FakeClusterApi;

    #[test]
    fn test_only_connected_exposes_api() {
        let connected = ClusterConnection::connected(Arc::new(FakeClusterApi::default()), "kubeconfig");
        assert_eq!(connected.mode(), ConnectionMode::Connected);
        assert!(connected.api().is_some());

        let limited = ClusterConnection::limited("in-cluster", "connection refused");
        assert!(limited.api().is_none());
        assert_eq!(limited.config_source(), Some("in-cluster"));

        let offline = ClusterConnection::offline("no kubeconfig");
        assert!(offline.api().is_none());
        assert_eq!(offline.error(), Some("no kubeconfig"));
    }
}
