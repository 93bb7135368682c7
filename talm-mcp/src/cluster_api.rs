//! Access to the ACM and TALM custom resources.
//!
//! [`ClusterApi`] is the seam the server talks to; [`KubeClusterApi`] backs it
//! with a `kube::Client` and dynamic objects.

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, PostParams};
use kube::core::GroupVersionKind;
use kube::Client;

use common::errors::{AppError, AppResult};

pub fn managed_cluster_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("cluster.open-cluster-management.io", "v1", "ManagedCluster"),
        "managedclusters",
    )
}

pub fn policy_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("policy.open-cluster-management.io", "v1", "Policy"),
        "policies",
    )
}

pub fn cgu_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("ran.openshift.io", "v1alpha1", "ClusterGroupUpgrade"),
        "clustergroupupgrades",
    )
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_managed_clusters(&self) -> AppResult<Vec<DynamicObject>>;

    /// # Errors
    /// `ResourceNotFound` when no ManagedCluster has this name.
    async fn get_managed_cluster(&self, name: &str) -> AppResult<DynamicObject>;

    /// Policies across all namespaces.
    async fn list_policies(&self) -> AppResult<Vec<DynamicObject>>;

    /// ClusterGroupUpgrades across all namespaces.
    async fn list_cgus(&self) -> AppResult<Vec<DynamicObject>>;

    async fn create_cgu(&self, namespace: &str, cgu: &DynamicObject) -> AppResult<DynamicObject>;
}

pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn list_all(&self, resource: &ApiResource) -> AppResult<Vec<DynamicObject>> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), resource);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(kube_error)?;
        tracing::debug!(kind = %resource.kind, count = list.items.len(), "listed resources");
        Ok(list.items)
    }
}

fn kube_error(e: kube::Error) -> AppError {
    match e {
        kube::Error::Api(resp) => AppError::Kubernetes(format!("{} ({})", resp.message, resp.reason)),
        other => AppError::Kubernetes(other.to_string()),
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_managed_clusters(&self) -> AppResult<Vec<DynamicObject>> {
        self.list_all(&managed_cluster_resource()).await
    }

    async fn get_managed_cluster(&self, name: &str) -> AppResult<DynamicObject> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &managed_cluster_resource());
        match api.get(name).await {
            Ok(obj) => Ok(obj),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                Err(AppError::ResourceNotFound(format!("cluster '{}'", name)))
            }
            Err(e) => Err(kube_error(e)),
        }
    }

    async fn list_policies(&self) -> AppResult<Vec<DynamicObject>> {
        self.list_all(&policy_resource()).await
    }

    async fn list_cgus(&self) -> AppResult<Vec<DynamicObject>> {
        self.list_all(&cgu_resource()).await
    }

    async fn create_cgu(&self, namespace: &str, cgu: &DynamicObject) -> AppResult<DynamicObject> {
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &cgu_resource());
        let created = api
            .create(&PostParams::default(), cgu)
            .await
            .map_err(kube_error)?;
        tracing::info!(
            namespace,
            name = created.metadata.name.as_deref().unwrap_or_default(),
            "ClusterGroupUpgrade created"
        );
        Ok(created)
    }
}
