//! Synthetic healthcheck routes, reachable only from private networks.

use route_controller_core::{Backend, Filter, Predicate, Route};

const HEALTHCHECK_PATH: &str = "/kube-system/healthz";

const INTERNAL_NETWORKS: &[&str] = &[
    "10.0.0.0/8",
    "192.168.0.0/16",
    "172.16.0.0/12",
    "127.0.0.1/8",
    "fd00::/8",
    "::1/128",
];

pub(crate) fn healthcheck_routes(reverse_source_predicate: bool) -> Vec<Route> {
    let source = if reverse_source_predicate {
        "SourceFromLast"
    } else {
        "Source"
    };
    let networks = INTERNAL_NETWORKS
        .iter()
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(", ");
    let source_predicate = Predicate::Raw(format!("{}({})", source, networks));

    let mut up_filters = Vec::new();
    if !tracing::enabled!(tracing::Level::DEBUG) {
        up_filters.push(Filter::DisableAccessLog(200));
    }
    up_filters.push(Filter::Status(200));

    vec![
        Route {
            id: "kube__healthz_up".to_string(),
            path: Some(HEALTHCHECK_PATH.to_string()),
            predicates: vec![source_predicate.clone()],
            filters: up_filters,
            backend: Backend::Shunt,
            ..Default::default()
        },
        Route {
            id: "kube__healthz_down".to_string(),
            path: Some(HEALTHCHECK_PATH.to_string()),
            predicates: vec![source_predicate, Predicate::Raw("Shutdown()".to_string())],
            filters: vec![Filter::Status(503)],
            backend: Backend::Shunt,
            ..Default::default()
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthz_routes_print_their_canonical_form() {
        let routes = healthcheck_routes(false);
        assert_eq!(
            routes[0].to_string(),
            "kube__healthz_up: Path(\"/kube-system/healthz\") && \
             Source(\"10.0.0.0/8\", \"192.168.0.0/16\", \"172.16.0.0/12\", \
             \"127.0.0.1/8\", \"fd00::/8\", \"::1/128\") \
             -> disableAccessLog(200) -> status(200) -> <shunt>;",
        );
        assert_eq!(
            routes[1].to_string(),
            "kube__healthz_down: Path(\"/kube-system/healthz\") && \
             Source(\"10.0.0.0/8\", \"192.168.0.0/16\", \"172.16.0.0/12\", \
             \"127.0.0.1/8\", \"fd00::/8\", \"::1/128\") && Shutdown() \
             -> status(503) -> <shunt>;",
        );
    }

    #[test]
    fn reverse_source_predicate_swaps_the_source() {
        let routes = healthcheck_routes(true);
        assert!(routes[0].to_string().contains("SourceFromLast(\"10.0.0.0/8\""));
        assert!(routes[1].to_string().contains("SourceFromLast(\"10.0.0.0/8\""));
    }
}
