use ahash::AHashMap as HashMap;
use route_controller_k8s_api as k8s;
use std::fmt;
use thiserror::Error;

/// Namespace/name pair identifying a resource within the snapshot.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum StateError {
    #[error("service not found")]
    ServiceNotFound,

    #[error("resource not found")]
    ResourceNotFound,
}

/// One poll's snapshot, indexed for the lookups the translator performs.
///
/// Ingresses keep their API order; services and endpoints become lookup
/// indexes keyed by namespace and name.
#[derive(Clone, Debug, Default)]
pub struct ClusterState {
    pub ingresses: Vec<k8s::IngressItem>,
    services: HashMap<String, HashMap<String, k8s::Service>>,
    endpoints: HashMap<ResourceId, k8s::Endpoints>,
    pub secrets: Vec<(ResourceId, k8s::Secret)>,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ResourceId {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl ClusterState ===

impl ClusterState {
    pub fn new(
        ingresses: Vec<k8s::IngressItem>,
        services: impl IntoIterator<Item = (ResourceId, k8s::Service)>,
        endpoints: impl IntoIterator<Item = (ResourceId, k8s::Endpoints)>,
        secrets: Vec<(ResourceId, k8s::Secret)>,
    ) -> Self {
        let mut by_ns: HashMap<String, HashMap<String, k8s::Service>> = HashMap::default();
        for (id, service) in services {
            by_ns.entry(id.namespace).or_default().insert(id.name, service);
        }
        ClusterState {
            ingresses,
            services: by_ns,
            endpoints: endpoints.into_iter().collect(),
            secrets,
        }
    }

    /// Looks up a service, distinguishing an unknown namespace from an
    /// unknown name so callers can report accordingly.
    pub fn service(&self, namespace: &str, name: &str) -> Result<&k8s::Service, StateError> {
        match self.services.get(namespace) {
            None => Err(StateError::ResourceNotFound),
            Some(by_name) => by_name.get(name).ok_or(StateError::ServiceNotFound),
        }
    }

    /// Whether any ready address exists for the named service's endpoints.
    pub fn has_endpoints(&self, namespace: &str, name: &str) -> bool {
        self.endpoints
            .get(&ResourceId::new(namespace, name))
            .map(|ep| ep.subsets.iter().any(|s| !s.addresses.is_empty()))
            .unwrap_or(false)
    }

    /// Backend URLs for a service's endpoints: the service's target port is
    /// matched against every subset's port list (by name or by number), the
    /// matching ports are combined with every address of the subset, and the
    /// result is sorted by address and port for deterministic output.
    pub fn endpoint_urls(
        &self,
        namespace: &str,
        name: &str,
        protocol: &str,
        service_port: &k8s::ServicePort,
    ) -> Vec<String> {
        let Some(endpoints) = self.endpoints.get(&ResourceId::new(namespace, name)) else {
            return Vec::new();
        };

        let mut targets = Vec::new();
        for subset in &endpoints.subsets {
            for port in &subset.ports {
                if !target_port_matches(service_port, port) {
                    continue;
                }
                for address in &subset.addresses {
                    targets.push((address.clone(), port.port));
                }
            }
        }
        targets.sort();

        targets
            .into_iter()
            .map(|(ip, port)| format!("{}://{}:{}", protocol, ip, port))
            .collect()
    }
}

fn target_port_matches(service_port: &k8s::ServicePort, endpoint_port: &k8s::EndpointPort) -> bool {
    match &service_port.target_port {
        Some(k8s::IntOrString::String(name)) => endpoint_port.name.as_deref() == Some(name.as_str()),
        Some(k8s::IntOrString::Int(number)) => endpoint_port.port == *number,
        None => false,
    }
}
