use crate::ingress::BackendPort;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// A Service narrowed to backend resolution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Service {
    pub cluster_ip: Option<String>,
    pub kind: ServiceKind,
    pub ports: Vec<ServicePort>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ServiceKind {
    /// Backed by pods inside the cluster. NodePort and LoadBalancer services
    /// resolve the same way and are folded in here.
    #[default]
    ClusterIp,

    /// Points at an external DNS host instead of pods.
    ExternalName(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: i32,
    pub target_port: Option<IntOrString>,
}

// === impl Service ===

impl Service {
    /// Resolves an ingress backend's port reference against this service.
    ///
    /// Only ports that carry a target port qualify; without one there is
    /// nothing to match endpoints against.
    pub fn resolve_port(&self, backend_port: &BackendPort) -> Option<&ServicePort> {
        self.ports
            .iter()
            .find(|p| p.matches(backend_port) && p.target_port.is_some())
    }
}

impl From<corev1::Service> for Service {
    fn from(service: corev1::Service) -> Self {
        let spec = service.spec.unwrap_or_default();
        let kind = match spec.type_.as_deref() {
            Some("ExternalName") => ServiceKind::ExternalName(spec.external_name.unwrap_or_default()),
            _ => ServiceKind::ClusterIp,
        };
        Service {
            cluster_ip: spec.cluster_ip,
            kind,
            ports: spec.ports.into_iter().flatten().map(Into::into).collect(),
        }
    }
}

// === impl ServicePort ===

impl ServicePort {
    pub fn matches(&self, backend_port: &BackendPort) -> bool {
        match backend_port {
            BackendPort::Name(name) => self.name.as_deref() == Some(name.as_str()),
            BackendPort::Number(number) => self.port == *number,
        }
    }
}

impl From<corev1::ServicePort> for ServicePort {
    fn from(port: corev1::ServicePort) -> Self {
        ServicePort {
            name: port.name,
            port: port.port,
            target_port: port.target_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(ports: Vec<ServicePort>) -> Service {
        Service {
            cluster_ip: Some("10.3.190.97".to_string()),
            kind: ServiceKind::ClusterIp,
            ports,
        }
    }

    #[test]
    fn resolves_ports_by_name_and_number() {
        let service = svc(vec![
            ServicePort {
                name: Some("main".to_string()),
                port: 8080,
                target_port: Some(IntOrString::Int(8080)),
            },
            ServicePort {
                name: Some("metrics".to_string()),
                port: 9100,
                target_port: Some(IntOrString::String("metrics".to_string())),
            },
        ]);

        let by_number = service
            .resolve_port(&BackendPort::Number(8080))
            .expect("numeric reference resolves");
        assert_eq!(by_number.name.as_deref(), Some("main"));

        let by_name = service
            .resolve_port(&BackendPort::Name("metrics".to_string()))
            .expect("named reference resolves");
        assert_eq!(by_name.port, 9100);

        assert!(service.resolve_port(&BackendPort::Number(80)).is_none());
        assert!(service
            .resolve_port(&BackendPort::Name("missing".to_string()))
            .is_none());
    }

    #[test]
    fn ports_without_target_do_not_resolve() {
        let service = svc(vec![ServicePort {
            name: Some("main".to_string()),
            port: 8080,
            target_port: None,
        }]);
        assert!(service.resolve_port(&BackendPort::Number(8080)).is_none());
    }

    #[test]
    fn external_name_services_keep_their_host() {
        let wire = corev1::Service {
            spec: Some(corev1::ServiceSpec {
                type_: Some("ExternalName".to_string()),
                external_name: Some("www.zalando.de".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let service = Service::from(wire);
        assert_eq!(
            service.kind,
            ServiceKind::ExternalName("www.zalando.de".to_string()),
        );
    }
}
