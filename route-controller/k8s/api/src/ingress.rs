use k8s_openapi::api::networking::v1 as networking;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// The slice of object metadata the translator reads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    pub namespace: String,
    pub name: String,
    pub annotations: BTreeMap<String, String>,
}

/// An Ingress narrowed to the fields driving route generation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngressItem {
    pub metadata: Metadata,
    pub class: Option<String>,
    pub default_backend: Option<IngressBackend>,
    pub rules: Vec<IngressRule>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngressRule {
    /// May be empty for host-less rules.
    pub host: String,
    pub paths: Vec<PathRule>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathRule {
    pub path: String,
    pub path_type: PathType,
    /// Absent when the wire object carries no service reference.
    pub backend: Option<IngressBackend>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PathType {
    Exact,
    Prefix,
    #[default]
    ImplementationSpecific,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngressBackend {
    pub service_name: String,
    pub service_port: BackendPort,

    /// Not part of the wire format; assigned by the weight computation.
    pub traffic: Traffic,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackendPort {
    Name(String),
    Number(i32),
}

/// Traffic-split state of one backend, relative to the other backends
/// sharing its path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Traffic {
    pub weight: f64,
    pub noop_count: usize,
}

// === impl Metadata ===

impl Metadata {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

impl From<ObjectMeta> for Metadata {
    fn from(meta: ObjectMeta) -> Self {
        Metadata {
            namespace: meta.namespace.unwrap_or_default(),
            name: meta.name.unwrap_or_default(),
            annotations: meta.annotations.unwrap_or_default(),
        }
    }
}

// === impl IngressItem ===

impl From<networking::Ingress> for IngressItem {
    fn from(ingress: networking::Ingress) -> Self {
        let spec = ingress.spec.unwrap_or_default();
        IngressItem {
            metadata: ingress.metadata.into(),
            class: spec.ingress_class_name,
            default_backend: spec.default_backend.and_then(convert_backend),
            rules: spec.rules.into_iter().flatten().map(Into::into).collect(),
        }
    }
}

impl From<networking::IngressRule> for IngressRule {
    fn from(rule: networking::IngressRule) -> Self {
        IngressRule {
            host: rule.host.unwrap_or_default(),
            paths: rule
                .http
                .map(|http| http.paths.into_iter().map(Into::into).collect())
                .unwrap_or_default(),
        }
    }
}

impl From<networking::HTTPIngressPath> for PathRule {
    fn from(path: networking::HTTPIngressPath) -> Self {
        PathRule {
            path: path.path.unwrap_or_default(),
            path_type: path.path_type.as_str().into(),
            backend: convert_backend(path.backend),
        }
    }
}

fn convert_backend(backend: networking::IngressBackend) -> Option<IngressBackend> {
    let service = backend.service?;
    let port = service.port.unwrap_or_default();
    let service_port = match port.name {
        Some(name) if !name.is_empty() => BackendPort::Name(name),
        _ => BackendPort::Number(port.number.unwrap_or_default()),
    };
    Some(IngressBackend {
        service_name: service.name,
        service_port,
        traffic: Traffic::default(),
    })
}

// === impl PathType ===

impl From<&str> for PathType {
    fn from(path_type: &str) -> Self {
        match path_type {
            "Exact" => PathType::Exact,
            "Prefix" => PathType::Prefix,
            _ => PathType::ImplementationSpecific,
        }
    }
}

// === impl BackendPort ===

impl Default for BackendPort {
    fn default() -> Self {
        BackendPort::Number(0)
    }
}

// === impl Traffic ===

impl Default for Traffic {
    fn default() -> Self {
        Traffic {
            weight: 0.0,
            noop_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::networking::v1 as networking;

    #[test]
    fn narrows_a_wire_ingress() {
        let wire = networking::Ingress {
            metadata: ObjectMeta {
                namespace: Some("namespace1".to_string()),
                name: Some("mega".to_string()),
                annotations: Some(
                    [("zalando.org/skipper-filter".to_string(), "f()".to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            spec: Some(networking::IngressSpec {
                rules: Some(vec![networking::IngressRule {
                    host: Some("foo.example.org".to_string()),
                    http: Some(networking::HTTPIngressRuleValue {
                        paths: vec![networking::HTTPIngressPath {
                            path: Some("/test1".to_string()),
                            path_type: "ImplementationSpecific".to_string(),
                            backend: networking::IngressBackend {
                                service: Some(networking::IngressServiceBackend {
                                    name: "service1".to_string(),
                                    port: Some(networking::ServiceBackendPort {
                                        number: Some(8080),
                                        ..Default::default()
                                    }),
                                }),
                                ..Default::default()
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            }),
            status: None,
        };

        let item = IngressItem::from(wire);
        assert_eq!(item.metadata.namespace, "namespace1");
        assert_eq!(item.metadata.name, "mega");
        assert_eq!(item.metadata.annotation("zalando.org/skipper-filter"), Some("f()"));
        assert_eq!(item.rules.len(), 1);
        assert_eq!(item.rules[0].host, "foo.example.org");

        let path = &item.rules[0].paths[0];
        assert_eq!(path.path, "/test1");
        assert_eq!(path.path_type, PathType::ImplementationSpecific);
        let backend = path.backend.as_ref().expect("backend converts");
        assert_eq!(backend.service_name, "service1");
        assert_eq!(backend.service_port, BackendPort::Number(8080));
    }

    #[test]
    fn missing_service_reference_yields_no_backend() {
        let path = networking::HTTPIngressPath {
            path: Some("/".to_string()),
            path_type: "Prefix".to_string(),
            backend: networking::IngressBackend::default(),
        };
        let rule = PathRule::from(path);
        assert_eq!(rule.path_type, PathType::Prefix);
        assert!(rule.backend.is_none());
    }
}
