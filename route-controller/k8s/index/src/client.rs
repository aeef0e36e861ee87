//! Fetching one consistent snapshot of the cluster's routing resources.

use crate::annotations;
use crate::state::{ClusterState, ResourceId};
use crate::Options;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::networking::v1 as networking;
use kube::api::{Api, ListParams, ObjectMeta};
use regex::Regex;
use route_controller_k8s_api as k8s;
use tracing::debug;

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

/// Out-of-cluster default, the local API proxy convention.
const DEFAULT_KUBERNETES_URL: &str = "http://localhost:8001";

/// The data client's upstream seam: anything that can produce one cluster
/// snapshot per call.
#[async_trait]
pub trait FetchClusterState: Send + Sync {
    async fn fetch_cluster_state(&self) -> Result<ClusterState>;
}

/// Lists the four resource kinds from the API server and assembles the
/// indexed snapshot. The four lists are fetched concurrently; any failure
/// abandons the whole snapshot.
pub struct ClusterClient {
    client: kube::Client,
    namespace: Option<String>,
    ingress_class: Regex,
    fetch_secrets: bool,
}

// === impl ClusterClient ===

impl ClusterClient {
    pub fn new(options: &Options) -> Result<Self> {
        let config = if options.kubernetes_in_cluster {
            if std::env::var_os(SERVICE_HOST_ENV).is_none()
                || std::env::var_os(SERVICE_PORT_ENV).is_none()
            {
                bail!(
                    "API server URL not found: {} and {} must be set",
                    SERVICE_HOST_ENV,
                    SERVICE_PORT_ENV,
                );
            }
            kube::Config::incluster().context("in-cluster configuration")?
        } else {
            let url = options
                .kubernetes_url
                .as_deref()
                .unwrap_or(DEFAULT_KUBERNETES_URL);
            let uri = url
                .parse::<http::Uri>()
                .with_context(|| format!("invalid API server URL: {}", url))?;
            kube::Config::new(uri)
        };

        let client = kube::Client::try_from(config).context("building API server client")?;
        let ingress_class = Regex::new(options.ingress_class.as_deref().unwrap_or(""))
            .context("invalid ingress class expression")?;

        Ok(ClusterClient {
            client,
            namespace: options.kubernetes_namespace.clone(),
            ingress_class,
            fetch_secrets: options.certificate_registry.is_some(),
        })
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    fn admits(&self, ingress: &networking::Ingress) -> bool {
        let annotations = ingress.metadata.annotations.as_ref();
        let class = annotations.and_then(|a| {
            a.get(annotations::INGRESS_CLASS_INTERNAL_KEY)
                .or_else(|| a.get(annotations::INGRESS_CLASS_KEY))
        });
        class_annotation_admits(class.map(String::as_str), &self.ingress_class)
    }
}

#[async_trait]
impl FetchClusterState for ClusterClient {
    async fn fetch_cluster_state(&self) -> Result<ClusterState> {
        let params = ListParams::default();
        let ingress_api: Api<networking::Ingress> = self.api();
        let service_api: Api<corev1::Service> = self.api();
        let endpoints_api: Api<corev1::Endpoints> = self.api();
        let secret_api: Api<corev1::Secret> = self.api();

        let (ingresses, services, endpoints, secrets) = tokio::try_join!(
            async { ingress_api.list(&params).await.context("listing ingresses") },
            async { service_api.list(&params).await.context("listing services") },
            async { endpoints_api.list(&params).await.context("listing endpoints") },
            async {
                if self.fetch_secrets {
                    secret_api
                        .list(&params)
                        .await
                        .context("listing secrets")
                        .map(Some)
                } else {
                    Ok(None)
                }
            },
        )?;

        let ingresses = ingresses
            .items
            .into_iter()
            .filter(|ingress| {
                let admitted = self.admits(ingress);
                if !admitted {
                    debug!(
                        ingress = %object_id(&ingress.metadata),
                        "skipping ingress: class does not match",
                    );
                }
                admitted
            })
            .map(k8s::IngressItem::from)
            .collect();

        let services = services.items.into_iter().map(|service| {
            let id = object_id(&service.metadata);
            (id, k8s::Service::from(service))
        });
        let endpoints = endpoints.items.into_iter().map(|endpoints| {
            let id = object_id(&endpoints.metadata);
            (id, k8s::Endpoints::from(endpoints))
        });
        let secrets = secrets
            .map(|list| {
                list.items
                    .into_iter()
                    .map(|secret| (object_id(&secret.metadata), secret))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ClusterState::new(ingresses, services, endpoints, secrets))
    }
}

/// Whether the class annotation admits an ingress: absent always does;
/// otherwise at least one element of the comma-separated value has to match.
pub(crate) fn class_annotation_admits(class: Option<&str>, ingress_class: &Regex) -> bool {
    match class {
        None => true,
        Some(value) => value
            .split(',')
            .map(str::trim)
            .any(|c| ingress_class.is_match(c)),
    }
}

fn object_id(meta: &ObjectMeta) -> ResourceId {
    ResourceId::new(
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_class_regex_admits_matching_and_unannotated() {
        let rx = Regex::new("^test-filter$").expect("valid expression");
        assert!(class_annotation_admits(None, &rx));
        assert!(class_annotation_admits(Some("test-filter"), &rx));
        assert!(!class_annotation_admits(Some("another-test-filter"), &rx));
    }

    #[test]
    fn wildcard_class_regex_admits_everything() {
        let rx = Regex::new(".*").expect("valid expression");
        assert!(class_annotation_admits(None, &rx));
        assert!(class_annotation_admits(Some(""), &rx));
        assert!(class_annotation_admits(Some("anything"), &rx));
    }

    #[test]
    fn comma_separated_classes_admit_on_any_element() {
        let rx = Regex::new("^test-filter$").expect("valid expression");
        assert!(class_annotation_admits(Some("other, test-filter"), &rx));
        assert!(!class_annotation_admits(Some("other, another"), &rx));
    }
}
