//! Decoding of the per-ingress annotations into translation inputs.
//!
//! Filter, predicate and route fragments stay syntactically split but
//! semantically opaque; a fragment the splitter rejects is dropped for this
//! ingress only, and the rest of the translation proceeds.

use crate::PathMode;
use route_controller_core::dsl::{self, RouteFragment};
use route_controller_core::{Filter, Predicate};
use route_controller_k8s_api::Metadata;
use std::collections::HashMap;
use tracing::error;

pub(crate) const INGRESS_CLASS_KEY: &str = "kubernetes.io/ingress.class";
pub(crate) const INGRESS_CLASS_INTERNAL_KEY: &str = "zalando.org/skipper-ingress-class";
pub(crate) const REDIRECT_KEY: &str = "zalando.org/skipper-ingress-redirect";
pub(crate) const REDIRECT_CODE_KEY: &str = "zalando.org/skipper-ingress-redirect-code";

const FILTER_KEY: &str = "zalando.org/skipper-filter";
const PREDICATE_KEY: &str = "zalando.org/skipper-predicate";
const ROUTES_KEY: &str = "zalando.org/skipper-routes";
const BACKEND_WEIGHTS_KEY: &str = "zalando.org/backend-weights";
const LOAD_BALANCER_KEY: &str = "zalando.org/skipper-loadbalancer";
const BACKEND_PROTOCOL_KEY: &str = "zalando.org/skipper-backend-protocol";
const RATELIMIT_KEY: &str = "zalando.org/ratelimit";
const PATH_MODE_KEY: &str = "zalando.org/skipper-path-mode";

const DEFAULT_LOAD_BALANCER_ALGORITHM: &str = "roundRobin";

/// The ingress's filter chain fragment: the rate limit annotation first,
/// then the filter annotation.
pub(crate) fn filters(meta: &Metadata) -> Vec<Filter> {
    let mut fragment = String::new();
    if let Some(ratelimit) = meta.annotation(RATELIMIT_KEY) {
        fragment.push_str(ratelimit);
    }
    if let Some(filters) = meta.annotation(FILTER_KEY) {
        if !fragment.is_empty() {
            fragment.push_str(" -> ");
        }
        fragment.push_str(filters);
    }
    if fragment.is_empty() {
        return Vec::new();
    }

    match dsl::parse_filters(&fragment) {
        Ok(filters) => filters,
        Err(err) => {
            error!(
                ingress = %meta_ref(meta),
                error = %err,
                "cannot parse annotation filters",
            );
            Vec::new()
        }
    }
}

pub(crate) fn predicates(meta: &Metadata) -> Vec<Predicate> {
    let Some(fragment) = meta.annotation(PREDICATE_KEY) else {
        return Vec::new();
    };
    match dsl::parse_predicates(fragment) {
        Ok(predicates) => predicates,
        Err(err) => {
            error!(
                ingress = %meta_ref(meta),
                error = %err,
                "cannot parse annotation predicates",
            );
            Vec::new()
        }
    }
}

pub(crate) fn extra_routes(meta: &Metadata) -> Vec<RouteFragment> {
    let Some(fragment) = meta.annotation(ROUTES_KEY) else {
        return Vec::new();
    };
    match dsl::parse_routes(fragment) {
        Ok(routes) => routes,
        Err(err) => {
            error!(
                ingress = %meta_ref(meta),
                error = %err,
                "cannot parse annotation routes",
            );
            Vec::new()
        }
    }
}

/// Declared traffic weights by service name.
pub(crate) fn backend_weights(meta: &Metadata) -> HashMap<String, f64> {
    let Some(value) = meta.annotation(BACKEND_WEIGHTS_KEY) else {
        return HashMap::new();
    };
    match serde_json::from_str(value) {
        Ok(weights) => weights,
        Err(err) => {
            error!(
                ingress = %meta_ref(meta),
                error = %err,
                "cannot parse backend weights annotation",
            );
            HashMap::new()
        }
    }
}

/// The ingress's path mode, falling back to the global one.
pub(crate) fn path_mode(meta: &Metadata, global: PathMode) -> PathMode {
    let Some(value) = meta.annotation(PATH_MODE_KEY) else {
        return global;
    };
    match value.parse() {
        Ok(mode) => mode,
        Err(err) => {
            error!(ingress = %meta_ref(meta), error = %err, "invalid path mode annotation");
            global
        }
    }
}

pub(crate) fn load_balancer_algorithm(meta: &Metadata) -> String {
    meta.annotation(LOAD_BALANCER_KEY)
        .unwrap_or(DEFAULT_LOAD_BALANCER_ALGORITHM)
        .to_string()
}

pub(crate) fn backend_protocol(meta: &Metadata) -> &str {
    meta.annotation(BACKEND_PROTOCOL_KEY).unwrap_or("http")
}

fn meta_ref(meta: &Metadata) -> String {
    format!("{}/{}", meta.namespace, meta.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn meta(annotations: &[(&str, &str)]) -> Metadata {
        Metadata {
            namespace: "namespace1".to_string(),
            name: "ingress1".to_string(),
            annotations: annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn ratelimit_is_prepended_to_the_filter_chain() {
        let meta = meta(&[
            ("zalando.org/ratelimit", "localRatelimit(20,\"1m\")"),
            ("zalando.org/skipper-filter", "consecutiveBreaker(15)"),
        ]);
        assert_eq!(
            filters(&meta),
            vec![
                Filter::Raw("localRatelimit(20,\"1m\")".to_string()),
                Filter::Raw("consecutiveBreaker(15)".to_string()),
            ],
        );
    }

    #[test]
    fn unparsable_filters_are_dropped() {
        let meta = meta(&[("zalando.org/skipper-filter", "setPath(\"/broken")]);
        assert!(filters(&meta).is_empty());
    }

    #[test]
    fn backend_weights_parse_as_json() {
        let annotated = meta(&[(
            "zalando.org/backend-weights",
            r#"{"foo": 25, "bar": 45, "baz": 3, "qux": 27}"#,
        )]);
        let weights = backend_weights(&annotated);
        assert_eq!(weights.get("bar"), Some(&45.0));
        assert_eq!(weights.len(), 4);

        let broken = meta(&[("zalando.org/backend-weights", "{broken")]);
        assert!(backend_weights(&broken).is_empty());
    }

    #[test]
    fn path_mode_annotation_overrides_the_global_mode() {
        let overridden = meta(&[("zalando.org/skipper-path-mode", "path-prefix")]);
        assert_eq!(
            path_mode(&overridden, PathMode::KubernetesIngress),
            PathMode::PathPrefix,
        );

        let invalid = meta(&[("zalando.org/skipper-path-mode", "something-else")]);
        assert_eq!(
            path_mode(&invalid, PathMode::PathRegexp),
            PathMode::PathRegexp,
        );

        assert_eq!(path_mode(&meta(&[]), PathMode::KubernetesIngress), PathMode::KubernetesIngress);
    }

    #[test]
    fn backend_protocol_defaults_to_http() {
        assert_eq!(backend_protocol(&meta(&[])), "http");
        assert_eq!(
            backend_protocol(&meta(&[("zalando.org/skipper-backend-protocol", "https")])),
            "https",
        );
    }

    #[test]
    fn load_balancer_algorithm_defaults_to_round_robin() {
        assert_eq!(load_balancer_algorithm(&meta(&[])), "roundRobin");
        assert_eq!(
            load_balancer_algorithm(&meta(&[(
                "zalando.org/skipper-loadbalancer",
                "consistentHash",
            )])),
            "consistentHash",
        );
    }
}
