//! The polling facade: full loads, update deltas, and the cached previous
//! route set.

use crate::client::{ClusterClient, FetchClusterState};
use crate::default_filters::DefaultFilters;
use crate::healthcheck::healthcheck_routes;
use crate::ingress::Translator;
use crate::{CertificateRegistry, Options};
use ahash::AHashMap as HashMap;
use anyhow::Result;
use route_controller_core::Route;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// The data client. One instance owns the route set produced by the previous
/// poll and serializes polls; it is the only holder of that state.
pub struct DataClient {
    fetch: Box<dyn FetchClusterState>,
    translator: Translator,
    default_filters_dir: Option<PathBuf>,
    provide_healthcheck: bool,
    reverse_source_predicate: bool,
    certificate_registry: Option<Arc<dyn CertificateRegistry>>,
    current: HashMap<String, Route>,
}

// === impl DataClient ===

impl DataClient {
    /// A client polling the API server per `options`.
    pub fn new(options: &Options) -> Result<Self> {
        let fetch = Box::new(ClusterClient::new(options)?);
        Self::with_fetch(fetch, options)
    }

    /// A client over an arbitrary snapshot source.
    pub fn with_fetch(fetch: Box<dyn FetchClusterState>, options: &Options) -> Result<Self> {
        Ok(DataClient {
            fetch,
            translator: Translator::new(options)?,
            default_filters_dir: options.default_filters_dir.clone(),
            provide_healthcheck: options.provide_healthcheck,
            reverse_source_predicate: options.reverse_source_predicate,
            certificate_registry: options.certificate_registry.clone(),
            current: HashMap::default(),
        })
    }

    /// One full poll: the complete route set, which also becomes the
    /// baseline for the next update delta.
    pub async fn load_all(&mut self) -> Result<Vec<Route>> {
        let routes = self.load_routes().await?;
        self.current = map_routes(&routes);
        debug!(routes = routes.len(), "loaded all routes");
        Ok(routes)
    }

    /// One poll returning the delta against the previous poll: the routes to
    /// insert or update, and the sorted ids of routes that disappeared. The
    /// baseline only moves on success; a failed poll leaves it untouched.
    pub async fn load_update(&mut self) -> Result<(Vec<Route>, Vec<String>)> {
        let fresh = self.load_routes().await?;
        let next = map_routes(&fresh);

        let upserts: Vec<Route> = fresh
            .iter()
            .filter(|route| {
                self.current
                    .get(&route.id)
                    .map_or(true, |previous| previous != *route)
            })
            .cloned()
            .collect();
        let mut deleted: Vec<String> = self
            .current
            .keys()
            .filter(|id| !next.contains_key(*id))
            .cloned()
            .collect();
        deleted.sort();

        debug!(
            upserts = upserts.len(),
            deleted = deleted.len(),
            "loaded route updates",
        );
        self.current = next;
        Ok((upserts, deleted))
    }

    async fn load_routes(&self) -> Result<Vec<Route>> {
        let state = self.fetch.fetch_cluster_state().await?;

        if let Some(registry) = &self.certificate_registry {
            registry.configure(&state.secrets);
        }

        let default_filters = match &self.default_filters_dir {
            Some(dir) => DefaultFilters::load(dir),
            None => DefaultFilters::default(),
        };

        let mut routes = self.translator.convert(&state, &default_filters);
        if self.provide_healthcheck {
            routes.extend(healthcheck_routes(self.reverse_source_predicate));
        }
        Ok(routes)
    }
}

fn map_routes(routes: &[Route]) -> HashMap<String, Route> {
    routes
        .iter()
        .map(|route| (route.id.clone(), route.clone()))
        .collect()
}
