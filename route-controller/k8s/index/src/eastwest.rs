//! East-west mirrors: the same routes exposed under cluster-internal names.

use crate::convert;
use route_controller_core::Route;

pub(crate) const DEFAULT_EAST_WEST_DOMAIN: &str = "skipper.cluster.local";

const ROUTE_ID_PREFIX: &str = "kube_";
const EAST_WEST_ID_PREFIX: &str = "kubeew_";

pub(crate) fn east_west_host(name: &str, namespace: &str, domain: &str) -> String {
    format!("{}.{}.{}", name, namespace, domain)
}

/// The mirror of an ingress route: same conditions and backend, but matched
/// on the `<name>.<namespace>.<domain>` host and carrying the east-west id
/// prefix.
pub(crate) fn east_west_route(
    domain: &str,
    name: &str,
    namespace: &str,
    route: &Route,
) -> Route {
    let Some(rest) = route.id.strip_prefix(ROUTE_ID_PREFIX) else {
        return route.clone();
    };
    let mut mirror = route.clone();
    mirror.id = format!("{}{}", EAST_WEST_ID_PREFIX, rest);
    mirror.host_regexps = vec![convert::host_regexp(&east_west_host(name, namespace, domain))];
    mirror
}

#[cfg(test)]
mod tests {
    use super::*;
    use route_controller_core::Backend;

    #[test]
    fn mirrors_swap_the_id_prefix_and_the_host() {
        let route = Route {
            id: "kube_namespace1__new1__new1_example_org___test1__service1".to_string(),
            host_regexps: vec![convert::host_regexp("new1.example.org")],
            backend: Backend::Network("http://1.1.1.0:8080".to_string()),
            ..Default::default()
        };

        let mirror = east_west_route(DEFAULT_EAST_WEST_DOMAIN, "new1", "namespace1", &route);
        assert_eq!(
            mirror.id,
            "kubeew_namespace1__new1__new1_example_org___test1__service1",
        );
        assert_eq!(
            mirror.host_regexps,
            vec![convert::host_regexp("new1.namespace1.skipper.cluster.local")],
        );
        assert_eq!(mirror.backend, route.backend);
    }
}
