use crate::{Api, Client, Endpoints, Ingress, ListParams, Service};
use anyhow::Result;
use tracing::debug;

/// Reads the cluster's routing state.
///
/// Lookups of a single object return `Ok(None)` when the object does not exist, so that callers can
/// distinguish an absent object from a failed query.
#[async_trait::async_trait]
pub trait RoutingSource {
    /// Lists ingresses in all namespaces.
    async fn ingresses(&self) -> Result<Vec<Ingress>>;

    async fn service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    async fn endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>>;
}

#[async_trait::async_trait]
impl RoutingSource for Client {
    async fn ingresses(&self) -> Result<Vec<Ingress>> {
        let list = Api::<Ingress>::all(self.clone())
            .list(&ListParams::default())
            .await?;
        debug!(count = list.items.len(), "Listed ingresses");
        Ok(list.items)
    }

    async fn service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        let svc = Api::<Service>::namespaced(self.clone(), namespace)
            .get_opt(name)
            .await?;
        Ok(svc)
    }

    async fn endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>> {
        let eps = Api::<Endpoints>::namespaced(self.clone(), namespace)
            .get_opt(name)
            .await?;
        Ok(eps)
    }
}
