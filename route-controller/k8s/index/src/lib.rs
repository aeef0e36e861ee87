//! Kubernetes data client for the routing engine.
//!
//! On every poll the client lists the cluster's Ingresses, Services,
//! Endpoints and (optionally) Secrets, indexes the snapshot by
//! namespace/name, and translates every admitted Ingress into the flat route
//! records the proxy's matching engine consumes:
//!
//! ```ignore
//! [Ingress] -> [rule] -> [path] -- Service lookup --> [Endpoints]
//!                          |
//!                          |-> route record
//!                          |-> custom routes from annotations
//!                          |-> per-host catch-all, HTTPS-redirect variants
//!                          |-> east-west mirror
//! ```
//!
//! Translation is best effort: one ingress's problems — missing services,
//! empty endpoints, unparsable annotation fragments — never prevent other
//! ingresses from being served. Only a failure to fetch the snapshot itself
//! aborts a poll, in which case the previously produced route set stays in
//! effect.
//!
//! Emission order is deterministic for identical snapshots: ingresses in API
//! order, paths in declaration order, host groups in first-touch order with
//! their catch-alls last, so repeated polls over unchanged inputs produce an
//! empty delta.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod annotations;
mod client;
mod convert;
mod dataclient;
mod default_filters;
mod eastwest;
mod healthcheck;
mod ingress;
mod redirect;
mod state;
mod weights;


pub use self::client::{ClusterClient, FetchClusterState};
pub use self::dataclient::DataClient;
pub use self::state::{ClusterState, ResourceId, StateError};

use anyhow::bail;
use route_controller_k8s_api::Secret;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Receives the cluster's TLS secrets once per successful poll.
pub trait CertificateRegistry: Send + Sync {
    fn configure(&self, secrets: &[(ResourceId, Secret)]);
}

/// How `ImplementationSpecific` ingress paths translate to path conditions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PathMode {
    /// The path is a regular expression anchored at the start.
    #[default]
    KubernetesIngress,

    /// The path matches as a subtree prefix.
    PathPrefix,

    /// The path is used verbatim as a path regexp.
    PathRegexp,
}

/// Configuration of the data client.
#[derive(Clone, Default)]
pub struct Options {
    /// API server base URL for out-of-cluster use. Defaults to the local API
    /// proxy convention, `http://localhost:8001`.
    pub kubernetes_url: Option<String>,

    /// Use the service-account environment, token and CA bundle of the
    /// enclosing pod instead of `kubernetes_url`.
    pub kubernetes_in_cluster: bool,

    /// Restrict all resource lists to a single namespace.
    pub kubernetes_namespace: Option<String>,

    /// Regex selecting the ingress classes served by this proxy. Unset
    /// admits every class; unannotated ingresses are always admitted.
    pub ingress_class: Option<String>,

    pub path_mode: PathMode,

    /// Mirror every ingress route under `<name>.<namespace>.<domain>`.
    pub enable_east_west: bool,

    /// East-west DNS domain; dots are trimmed and an empty value falls back
    /// to the built-in default.
    pub east_west_domain: Option<String>,

    /// Host suffixes for which no HTTPS-redirect auxiliaries are generated.
    pub east_west_range_domains: Vec<String>,

    /// Generate HTTPS-redirect routes for every host by default.
    pub provide_https_redirect: bool,
    pub https_redirect_code: u16,

    /// Append the synthetic healthcheck routes to every full load.
    pub provide_healthcheck: bool,

    /// Use `SourceFromLast` instead of `Source` in the healthcheck routes.
    pub reverse_source_predicate: bool,

    /// Directory of per-service default filter files named
    /// `<service>.<namespace>`.
    pub default_filters_dir: Option<PathBuf>,

    /// Regexes gating which ExternalName services may be routed to.
    pub allowed_external_names: Vec<String>,

    /// When set, Secrets are fetched and forwarded here each poll.
    pub certificate_registry: Option<Arc<dyn CertificateRegistry>>,
}

// === impl PathMode ===

impl FromStr for PathMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kubernetes-ingress" => Ok(PathMode::KubernetesIngress),
            "path-prefix" => Ok(PathMode::PathPrefix),
            "path-regexp" => Ok(PathMode::PathRegexp),
            s => bail!("invalid path mode: {}", s),
        }
    }
}

impl fmt::Display for PathMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathMode::KubernetesIngress => f.write_str("kubernetes-ingress"),
            PathMode::PathPrefix => f.write_str("path-prefix"),
            PathMode::PathRegexp => f.write_str("path-regexp"),
        }
    }
}
