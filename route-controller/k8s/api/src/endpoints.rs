use k8s_openapi::api::core::v1 as corev1;

/// The ready addresses implementing a Service.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Endpoints {
    pub subsets: Vec<EndpointSubset>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EndpointSubset {
    /// Pod IPs.
    pub addresses: Vec<String>,
    pub ports: Vec<EndpointPort>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EndpointPort {
    pub name: Option<String>,
    pub port: i32,
}

impl From<corev1::Endpoints> for Endpoints {
    fn from(endpoints: corev1::Endpoints) -> Self {
        Endpoints {
            subsets: endpoints
                .subsets
                .into_iter()
                .flatten()
                .map(Into::into)
                .collect(),
        }
    }
}

impl From<corev1::EndpointSubset> for EndpointSubset {
    fn from(subset: corev1::EndpointSubset) -> Self {
        EndpointSubset {
            addresses: subset
                .addresses
                .into_iter()
                .flatten()
                .map(|addr| addr.ip)
                .collect(),
            ports: subset
                .ports
                .into_iter()
                .flatten()
                .map(|port| EndpointPort {
                    name: port.name,
                    port: port.port,
                })
                .collect(),
        }
    }
}
