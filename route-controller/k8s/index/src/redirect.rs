//! Per-host HTTPS-redirect auxiliaries.

use crate::annotations;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use route_controller_core::{Backend, Filter, Predicate, Route};
use route_controller_k8s_api::Metadata;
use tracing::error;

pub(crate) const DEFAULT_REDIRECT_CODE: u16 = 308;

const FORWARDED_PROTO_HEADER: &str = "X-Forwarded-Proto";
const ENABLE_SUFFIX: &str = "_https_redirect";
const DISABLE_SUFFIX: &str = "_disable_https_redirect";

/// Redirect bookkeeping for one poll: which hosts asked for or refused the
/// redirect, and with which status code, so the per-host catch-alls can
/// replicate the same variants. Reset at the start of every poll.
pub(crate) struct RedirectInfo {
    pub default_enabled: bool,
    pub enable: bool,
    pub disable: bool,
    pub default_code: u16,
    pub code: u16,
    pub set_host_code: HashMap<String, u16>,
    pub disable_host: HashSet<String>,
}

impl RedirectInfo {
    pub fn new(default_enabled: bool, code: u16) -> Self {
        RedirectInfo {
            default_enabled,
            enable: false,
            disable: false,
            default_code: code,
            code,
            set_host_code: HashMap::default(),
            disable_host: HashSet::default(),
        }
    }

    /// Seeds the per-ingress state from the redirect annotations.
    pub fn init_current(&mut self, meta: &Metadata) {
        self.enable = meta.annotation(annotations::REDIRECT_KEY) == Some("true");
        self.disable = meta.annotation(annotations::REDIRECT_KEY) == Some("false");

        self.code = self.default_code;
        if let Some(value) = meta.annotation(annotations::REDIRECT_CODE_KEY) {
            match value.parse::<u16>() {
                Ok(code) if (300..400).contains(&code) => self.code = code,
                _ => {
                    let ingress = format!("{}/{}", meta.namespace, meta.name);
                    error!(ingress = %ingress, code = %value, "invalid redirect code annotation");
                }
            }
        }
    }

    pub fn set_host(&mut self, host: &str) {
        self.set_host_code.insert(host.to_string(), self.code);
    }

    pub fn set_host_disabled(&mut self, host: &str) {
        self.disable_host.insert(host.to_string());
    }
}

/// The redirecting twin of a route: same match plus the forwarded-proto
/// condition, responding with a redirect instead of proxying.
pub(crate) fn enable_https_redirect(route: &Route, code: u16) -> Route {
    let mut redirect = route.clone();
    redirect.id.push_str(ENABLE_SUFFIX);
    redirect.predicates.push(forwarded_proto_predicate());
    redirect.filters = vec![Filter::RedirectTo(code, "https:".to_string())];
    redirect.backend = Backend::Shunt;
    redirect
}

/// The opt-out twin: a more specific route that serves plain-HTTP traffic
/// normally on a host exempted from a default-enabled redirect.
pub(crate) fn disable_https_redirect(route: &Route) -> Route {
    let mut passthrough = route.clone();
    passthrough.id.push_str(DISABLE_SUFFIX);
    passthrough.predicates.push(forwarded_proto_predicate());
    passthrough
}

fn forwarded_proto_predicate() -> Predicate {
    Predicate::Raw(format!("Header(\"{}\", \"http\")", FORWARDED_PROTO_HEADER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn meta(annotations: &[(&str, &str)]) -> Metadata {
        Metadata {
            namespace: "namespace1".to_string(),
            name: "redirect".to_string(),
            annotations: annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn annotation_toggles_per_ingress_state() {
        let mut info = RedirectInfo::new(false, DEFAULT_REDIRECT_CODE);

        info.init_current(&meta(&[("zalando.org/skipper-ingress-redirect", "true")]));
        assert!(info.enable);
        assert!(!info.disable);

        info.init_current(&meta(&[("zalando.org/skipper-ingress-redirect", "false")]));
        assert!(!info.enable);
        assert!(info.disable);
    }

    #[test]
    fn code_annotation_must_be_a_redirect_code() {
        let mut info = RedirectInfo::new(true, DEFAULT_REDIRECT_CODE);

        info.init_current(&meta(&[(
            "zalando.org/skipper-ingress-redirect-code",
            "301",
        )]));
        assert_eq!(info.code, 301);

        info.init_current(&meta(&[(
            "zalando.org/skipper-ingress-redirect-code",
            "200",
        )]));
        assert_eq!(info.code, DEFAULT_REDIRECT_CODE);

        info.init_current(&meta(&[(
            "zalando.org/skipper-ingress-redirect-code",
            "redirect",
        )]));
        assert_eq!(info.code, DEFAULT_REDIRECT_CODE);
    }

    #[test]
    fn redirect_twins_extend_the_id_and_match_plain_http() {
        let route = Route {
            id: "kube_namespace1__app__www_example_org_____service1".to_string(),
            backend: Backend::Network("http://1.1.1.0:8080".to_string()),
            ..Default::default()
        };

        let enabled = enable_https_redirect(&route, 308);
        assert_eq!(
            enabled.id,
            "kube_namespace1__app__www_example_org_____service1_https_redirect",
        );
        assert_eq!(
            enabled.predicates,
            vec![Predicate::Raw(
                "Header(\"X-Forwarded-Proto\", \"http\")".to_string()
            )],
        );
        assert_eq!(
            enabled.filters,
            vec![Filter::RedirectTo(308, "https:".to_string())],
        );
        assert_eq!(enabled.backend, Backend::Shunt);

        let disabled = disable_https_redirect(&route);
        assert_eq!(
            disabled.id,
            "kube_namespace1__app__www_example_org_____service1_disable_https_redirect",
        );
        assert_eq!(disabled.backend, route.backend);
        assert!(disabled.filters.is_empty());
    }
}
