//! Conversion of a single ingress path rule into a route record.

use crate::annotations;
use crate::state::{ClusterState, StateError};
use crate::PathMode;
use regex::Regex;
use route_controller_core::{Backend, Filter, Predicate, Route};
use route_controller_k8s_api as k8s;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub(crate) enum ConvertError {
    #[error("invalid path rule, missing backend in: {0}")]
    MissingBackend(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("not allowed external name: {0}")]
    NotAllowedExternalName(String),
}

/// Builds the stable route identifier. Every component is sanitized to the
/// word-character alphabet so the id survives round trips through the
/// engine's parser.
pub(crate) fn route_id(namespace: &str, name: &str, host: &str, path: &str, backend: &str) -> String {
    format!(
        "kube_{}__{}__{}__{}__{}",
        sanitize(namespace),
        sanitize(name),
        sanitize(host),
        sanitize(path),
        sanitize(backend),
    )
}

/// Identifier for a route originating in the custom-routes annotation: the
/// fragment's label and sequence index extend the ingress name, the path
/// folds into the host component.
pub(crate) fn custom_route_id(
    namespace: &str,
    name: &str,
    label: &str,
    host_and_path: &str,
    index: usize,
) -> String {
    route_id(
        namespace,
        &format!("{}_{}_{}", name, label, index),
        host_and_path,
        "",
        "",
    )
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Host condition for a literal ingress host: matches the host itself, an
/// optional trailing dot and an optional port.
pub(crate) fn host_regexp(host: &str) -> String {
    format!("^({}[.]?(:[0-9]+)?)$", host.replace('.', "[.]"))
}

/// Applies the rule's path as a path condition according to its type and the
/// effective path mode.
pub(crate) fn set_path(mode: PathMode, route: &mut Route, path: &str, path_type: k8s::PathType) {
    match path_type {
        k8s::PathType::Exact => route.path = Some(path.to_string()),
        k8s::PathType::Prefix => route
            .predicates
            .push(Predicate::PathSubtree(path.to_string())),
        k8s::PathType::ImplementationSpecific => {
            if path.is_empty() {
                return;
            }
            match mode {
                PathMode::PathPrefix => route
                    .predicates
                    .push(Predicate::PathSubtree(path.to_string())),
                PathMode::PathRegexp => route.path_regexps.push(path.to_string()),
                PathMode::KubernetesIngress => {
                    if path == "/" {
                        route.path_regexps.push("^/".to_string());
                    } else {
                        route.path_regexps.push(format!("^({})", path));
                    }
                }
            }
        }
    }
}

/// Attaches the traffic-split conditions computed by the weight pass. A
/// weight of 1 is implicit; the no-op conditions pad the predicate count so
/// more specific splits rank first in the matching tree.
pub(crate) fn set_traffic(route: &mut Route, traffic: &k8s::Traffic) {
    if traffic.weight > 0.0 && traffic.weight < 1.0 {
        route.predicates.push(Predicate::Traffic(traffic.weight));
    }
    for _ in 0..traffic.noop_count {
        route.predicates.push(Predicate::True);
    }
}

/// Turns the route into a fixed 502 response while keeping its identifier in
/// the table, so endpoint flaps do not delete and recreate ids.
pub(crate) fn shunt_route(route: &mut Route) {
    route.filters = vec![Filter::Status(502)];
    route.backend = Backend::Shunt;
}

pub(crate) fn convert_path_rule(
    state: &ClusterState,
    meta: &k8s::Metadata,
    host: &str,
    prule: &k8s::PathRule,
    path_mode: PathMode,
    allowed_external_names: &[Regex],
) -> Result<Route, ConvertError> {
    let ns = &meta.namespace;
    let name = &meta.name;

    let backend = prule.backend.as_ref().ok_or_else(|| {
        ConvertError::MissingBackend(format!("{}/{}/{}", ns, name, host))
    })?;

    let host_regexps = if host.is_empty() {
        Vec::new()
    } else {
        vec![host_regexp(host)]
    };

    let service = state.service(ns, &backend.service_name).map_err(|err| {
        error!(
            namespace = %ns,
            service = %backend.service_name,
            error = %err,
            "convert_path_rule: failed to get service",
        );
        err
    })?;

    let mut endpoints = Vec::new();
    match service.resolve_port(&backend.service_port) {
        None => {
            if state.has_endpoints(ns, &backend.service_name) {
                error!(
                    namespace = %ns,
                    service = %backend.service_name,
                    "convert_path_rule: endpoints exist but no matching service port; \
                     cluster data is inconsistent",
                );
            }
        }
        Some(port) => match &service.kind {
            k8s::ServiceKind::ExternalName(external) => {
                return external_name_route(
                    ns,
                    name,
                    host,
                    host_regexps,
                    external,
                    port,
                    allowed_external_names,
                );
            }
            k8s::ServiceKind::ClusterIp => {
                let protocol = annotations::backend_protocol(meta);
                endpoints = state.endpoint_urls(ns, &backend.service_name, protocol, port);
                debug!(
                    namespace = %ns,
                    service = %backend.service_name,
                    endpoints = endpoints.len(),
                    "convert_path_rule: enumerated endpoints",
                );
            }
        },
    }

    let mut route = Route {
        id: route_id(ns, name, host, &prule.path, &backend.service_name),
        host_regexps,
        ..Default::default()
    };
    set_path(path_mode, &mut route, &prule.path, prule.path_type);

    match endpoints.len() {
        0 => {
            debug!(
                namespace = %ns,
                ingress = %name,
                service = %backend.service_name,
                "convert_path_rule: no endpoints, adding 502 shunt route",
            );
            shunt_route(&mut route);
        }
        1 => route.backend = Backend::Network(endpoints.remove(0)),
        _ => {
            route.backend = Backend::LoadBalanced {
                endpoints,
                algorithm: Some(annotations::load_balancer_algorithm(meta)),
            };
        }
    }
    set_traffic(&mut route, &backend.traffic);

    Ok(route)
}

/// Converts the ingress's default backend: no host, no path condition, no
/// traffic split; the id carries only namespace and name.
pub(crate) fn convert_default_backend(
    state: &ClusterState,
    meta: &k8s::Metadata,
    backend: &k8s::IngressBackend,
    allowed_external_names: &[Regex],
) -> Result<Route, ConvertError> {
    let ns = &meta.namespace;
    let name = &meta.name;

    let service = state.service(ns, &backend.service_name).map_err(|err| {
        error!(
            namespace = %ns,
            service = %backend.service_name,
            error = %err,
            "convert_default_backend: failed to get service",
        );
        err
    })?;

    let mut endpoints = Vec::new();
    match service.resolve_port(&backend.service_port) {
        None => {
            error!(
                namespace = %ns,
                service = %backend.service_name,
                "convert_default_backend: no matching service port, adding shunt route",
            );
        }
        Some(port) => match &service.kind {
            k8s::ServiceKind::ExternalName(external) => {
                return external_name_route(
                    ns,
                    name,
                    "default",
                    Vec::new(),
                    external,
                    port,
                    allowed_external_names,
                );
            }
            k8s::ServiceKind::ClusterIp => {
                let protocol = annotations::backend_protocol(meta);
                endpoints = state.endpoint_urls(ns, &backend.service_name, protocol, port);
            }
        },
    }

    let mut route = Route {
        id: route_id(ns, name, "", "", ""),
        ..Default::default()
    };
    match endpoints.len() {
        0 => shunt_route(&mut route),
        1 => route.backend = Backend::Network(endpoints.remove(0)),
        _ => {
            route.backend = Backend::LoadBalanced {
                endpoints,
                algorithm: Some(annotations::load_balancer_algorithm(meta)),
            };
        }
    }
    Ok(route)
}

fn external_name_route(
    ns: &str,
    name: &str,
    id_host: &str,
    host_regexps: Vec<String>,
    external_name: &str,
    port: &k8s::ServicePort,
    allowed_external_names: &[Regex],
) -> Result<Route, ConvertError> {
    if !allowed_external_names
        .iter()
        .any(|rx| rx.is_match(external_name))
    {
        return Err(ConvertError::NotAllowedExternalName(
            external_name.to_string(),
        ));
    }

    let (scheme, target_port) = match &port.target_port {
        Some(k8s::IntOrString::Int(number)) => {
            let scheme = if *number == 443 { "https" } else { "http" };
            (scheme, Some(number.to_string()))
        }
        Some(k8s::IntOrString::String(named)) => ("http", Some(named.clone())),
        None => ("http", None),
    };
    let url = match target_port {
        Some(p) => format!("{}://{}:{}", scheme, external_name, p),
        None => format!("{}://{}", scheme, external_name),
    };

    Ok(Route {
        id: route_id(ns, name, id_host, "", external_name),
        host_regexps,
        filters: vec![Filter::SetRequestHeader(
            "Host".to_string(),
            external_name.to_string(),
        )],
        backend: Backend::Network(url),
        ..Default::default()
    })
}
