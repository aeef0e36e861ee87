//! Translation of the admitted ingresses into the route table.

use crate::annotations;
use crate::convert::{self, ConvertError};
use crate::default_filters::DefaultFilters;
use crate::eastwest;
use crate::redirect::{self, RedirectInfo};
use crate::state::ClusterState;
use crate::weights;
use crate::{Options, PathMode};
use ahash::AHashMap as HashMap;
use anyhow::{Context, Result};
use regex::Regex;
use route_controller_core::dsl::RouteFragment;
use route_controller_core::{Backend, Filter, Predicate, Route};
use route_controller_k8s_api as k8s;
use std::collections::HashMap as StdHashMap;
use tracing::{error, info, warn};

pub(crate) struct Translator {
    path_mode: PathMode,
    allowed_external_names: Vec<Regex>,
    enable_east_west: bool,
    east_west_domain: String,
    east_west_range_domains: Vec<String>,
    provide_https_redirect: bool,
    https_redirect_code: u16,
}

// Per-ingress translation inputs, decoded once from the annotations.
struct IngressContext<'a> {
    item: &'a k8s::IngressItem,
    annotation_filters: Vec<Filter>,
    annotation_predicates: Vec<Predicate>,
    extra_routes: Vec<RouteFragment>,
    backend_weights: StdHashMap<String, f64>,
    path_mode: PathMode,
    default_filters: &'a DefaultFilters,
}

// Route buckets per host, in first-touch order. The order makes repeated
// polls over identical snapshots emit identical lists.
#[derive(Default)]
struct HostRoutes {
    by_host: HashMap<String, Vec<Route>>,
    order: Vec<String>,
}

// === impl Translator ===

impl Translator {
    pub fn new(options: &Options) -> Result<Self> {
        let allowed_external_names = options
            .allowed_external_names
            .iter()
            .map(|source| {
                Regex::new(source)
                    .with_context(|| format!("invalid external name expression: {}", source))
            })
            .collect::<Result<Vec<_>>>()?;

        let domain = options
            .east_west_domain
            .as_deref()
            .unwrap_or("")
            .trim_matches('.');
        let east_west_domain = if domain.is_empty() {
            eastwest::DEFAULT_EAST_WEST_DOMAIN.to_string()
        } else {
            domain.to_string()
        };

        let https_redirect_code = if options.https_redirect_code == 0 {
            redirect::DEFAULT_REDIRECT_CODE
        } else {
            options.https_redirect_code
        };

        Ok(Translator {
            path_mode: options.path_mode,
            allowed_external_names,
            enable_east_west: options.enable_east_west,
            east_west_domain,
            east_west_range_domains: options.east_west_range_domains.clone(),
            provide_https_redirect: options.provide_https_redirect,
            https_redirect_code,
        })
    }

    /// Translates the whole snapshot. Best effort: a failing ingress is
    /// logged and skipped, never failing the poll.
    pub fn convert(&self, state: &ClusterState, default_filters: &DefaultFilters) -> Vec<Route> {
        let mut routes = Vec::new();
        let mut host_routes = HostRoutes::default();
        let mut redirect_info =
            RedirectInfo::new(self.provide_https_redirect, self.https_redirect_code);
        let mut east_west_defaults = Vec::new();

        for item in &state.ingresses {
            if item.metadata.namespace.is_empty() || item.metadata.name.is_empty() {
                error!("invalid ingress item: missing metadata");
                continue;
            }
            redirect_info.init_current(&item.metadata);
            let ctx = IngressContext::new(item, self.path_mode, default_filters);

            if let Some(route) = self.convert_default_backend_route(state, &ctx) {
                if self.enable_east_west {
                    east_west_defaults.push(eastwest::east_west_route(
                        &self.east_west_domain,
                        &item.metadata.name,
                        &item.metadata.namespace,
                        &route,
                    ));
                }
                routes.push(route);
            }

            for rule in &item.rules {
                self.add_spec_rule(state, &ctx, rule, &mut host_routes, &mut redirect_info);
            }
        }

        for host in host_routes.order {
            let Some(bucket) = host_routes.by_host.remove(&host) else {
                continue;
            };
            if bucket.is_empty() {
                continue;
            }
            let catch_all = (!host.is_empty() && !has_catch_all(&bucket))
                .then(|| self.catch_all_routes(&host, &bucket[0], &redirect_info));
            routes.extend(bucket);
            if let Some(mut catch_all) = catch_all {
                routes.append(&mut catch_all);
            }
        }

        if !east_west_defaults.is_empty() {
            info!(mirrors = east_west_defaults.len(), "added east-west default routes");
            routes.append(&mut east_west_defaults);
        }

        routes
    }

    fn convert_default_backend_route(
        &self,
        state: &ClusterState,
        ctx: &IngressContext<'_>,
    ) -> Option<Route> {
        let backend = ctx.item.default_backend.as_ref()?;
        match convert::convert_default_backend(
            state,
            &ctx.item.metadata,
            backend,
            &self.allowed_external_names,
        ) {
            Ok(mut route) => {
                ctx.compose_filters(&mut route, Some(&backend.service_name));
                apply_annotation_predicates(ctx.path_mode, &mut route, &ctx.annotation_predicates);
                Some(route)
            }
            Err(err) => {
                log_dropped_rule(&ctx.item.metadata, &err);
                None
            }
        }
    }

    fn add_spec_rule(
        &self,
        state: &ClusterState,
        ctx: &IngressContext<'_>,
        rule: &k8s::IngressRule,
        host_routes: &mut HostRoutes,
        redirect_info: &mut RedirectInfo,
    ) {
        if rule.paths.is_empty() {
            warn!(
                ingress = %ctx.ingress_ref(),
                "invalid ingress item: rule missing http definitions",
            );
            return;
        }

        let mut paths = rule.paths.clone();
        weights::compute_backend_weights(&ctx.backend_weights, &mut paths);

        for prule in &paths {
            self.add_extra_routes(ctx, &rule.host, prule, host_routes);
            let emit = prule
                .backend
                .as_ref()
                .map_or(true, |b| b.traffic.weight > 0.0);
            if emit {
                self.add_endpoints_rule(state, ctx, &rule.host, prule, host_routes, redirect_info);
            }
        }
    }

    fn add_endpoints_rule(
        &self,
        state: &ClusterState,
        ctx: &IngressContext<'_>,
        host: &str,
        prule: &k8s::PathRule,
        host_routes: &mut HostRoutes,
        redirect_info: &mut RedirectInfo,
    ) {
        let mut route = match convert::convert_path_rule(
            state,
            &ctx.item.metadata,
            host,
            prule,
            ctx.path_mode,
            &self.allowed_external_names,
        ) {
            Ok(route) => route,
            Err(err) => {
                log_dropped_rule(&ctx.item.metadata, &err);
                return;
            }
        };

        ctx.compose_filters(
            &mut route,
            prule.backend.as_ref().map(|b| b.service_name.as_str()),
        );
        apply_annotation_predicates(ctx.path_mode, &mut route, &ctx.annotation_predicates);
        host_routes.add(host, route.clone());

        if !self.in_east_west_range(host) {
            if redirect_info.enable {
                host_routes.add(
                    host,
                    redirect::enable_https_redirect(&route, redirect_info.code),
                );
                redirect_info.set_host(host);
            } else if redirect_info.disable {
                host_routes.add(host, redirect::disable_https_redirect(&route));
                redirect_info.set_host_disabled(host);
            } else if redirect_info.default_enabled {
                host_routes.add(
                    host,
                    redirect::enable_https_redirect(&route, redirect_info.code),
                );
                redirect_info.set_host(host);
            }
        }

        if self.enable_east_west {
            self.add_east_west_mirror(ctx, &route, host_routes);
        }
    }

    fn add_extra_routes(
        &self,
        ctx: &IngressContext<'_>,
        host: &str,
        prule: &k8s::PathRule,
        host_routes: &mut HostRoutes,
    ) {
        if ctx.extra_routes.is_empty() {
            return;
        }

        let host_regexps = if host.is_empty() {
            Vec::new()
        } else {
            vec![convert::host_regexp(host)]
        };
        let host_and_path = format!("{}{}", host, prule.path.replace('/', "_"));

        for (index, fragment) in ctx.extra_routes.iter().enumerate() {
            let mut route = Route {
                id: convert::custom_route_id(
                    &ctx.item.metadata.namespace,
                    &ctx.item.metadata.name,
                    fragment.label.as_deref().unwrap_or(""),
                    &host_and_path,
                    index,
                ),
                path: fragment.path.clone(),
                host_regexps: host_regexps.clone(),
                path_regexps: Vec::new(),
                predicates: fragment.predicates.clone(),
                filters: fragment.filters.clone(),
                backend: fragment.backend.clone(),
            };
            convert::set_path(ctx.path_mode, &mut route, &prule.path, prule.path_type);

            if route.path_condition_count() > 1 {
                error!(
                    ingress = %ctx.ingress_ref(),
                    route = %route.id,
                    "dropping custom route with conflicting path conditions",
                );
                continue;
            }

            host_routes.add(host, route.clone());
            if self.enable_east_west {
                self.add_east_west_mirror(ctx, &route, host_routes);
            }
        }
    }

    fn add_east_west_mirror(
        &self,
        ctx: &IngressContext<'_>,
        route: &Route,
        host_routes: &mut HostRoutes,
    ) {
        let mirror = eastwest::east_west_route(
            &self.east_west_domain,
            &ctx.item.metadata.name,
            &ctx.item.metadata.namespace,
            route,
        );
        let host = eastwest::east_west_host(
            &ctx.item.metadata.name,
            &ctx.item.metadata.namespace,
            &self.east_west_domain,
        );
        host_routes.add(&host, mirror);
    }

    fn catch_all_routes(
        &self,
        host: &str,
        first: &Route,
        redirect_info: &RedirectInfo,
    ) -> Vec<Route> {
        let catch_all = Route {
            id: convert::route_id("", "catchall", host, "", ""),
            host_regexps: first.host_regexps.clone(),
            backend: Backend::Shunt,
            ..Default::default()
        };

        let mut routes = vec![catch_all.clone()];
        if let Some(&code) = redirect_info.set_host_code.get(host) {
            routes.push(redirect::enable_https_redirect(&catch_all, code));
        }
        if redirect_info.disable_host.contains(host) {
            routes.push(redirect::disable_https_redirect(&catch_all));
        }
        routes
    }

    fn in_east_west_range(&self, host: &str) -> bool {
        self.east_west_range_domains
            .iter()
            .any(|domain| host.ends_with(domain))
            || (self.enable_east_west && host.ends_with(&self.east_west_domain))
    }
}

// === impl IngressContext ===

impl<'a> IngressContext<'a> {
    fn new(
        item: &'a k8s::IngressItem,
        global_path_mode: PathMode,
        default_filters: &'a DefaultFilters,
    ) -> Self {
        IngressContext {
            item,
            annotation_filters: annotations::filters(&item.metadata),
            annotation_predicates: annotations::predicates(&item.metadata),
            extra_routes: annotations::extra_routes(&item.metadata),
            backend_weights: annotations::backend_weights(&item.metadata),
            path_mode: annotations::path_mode(&item.metadata, global_path_mode),
            default_filters,
        }
    }

    // Filter chain composition: default filters, then the annotation chain,
    // then whatever the route itself produced.
    fn compose_filters(&self, route: &mut Route, service: Option<&str>) {
        let mut filters = match service {
            Some(service) => self
                .default_filters
                .get(&self.item.metadata.namespace, service),
            None => Vec::new(),
        };
        filters.extend(self.annotation_filters.iter().cloned());
        filters.append(&mut route.filters);
        route.filters = filters;
    }

    fn ingress_ref(&self) -> String {
        format!("{}/{}", self.item.metadata.namespace, self.item.metadata.name)
    }
}

// === impl HostRoutes ===

impl HostRoutes {
    fn add(&mut self, host: &str, route: Route) {
        if !self.by_host.contains_key(host) {
            self.order.push(host.to_string());
        }
        self.by_host.entry(host.to_string()).or_default().push(route);
    }
}

// Annotation predicates win over the rule's own path condition in
// path-prefix mode; elsewhere they are appended as-is.
fn apply_annotation_predicates(mode: PathMode, route: &mut Route, predicates: &[Predicate]) {
    if predicates.is_empty() {
        return;
    }

    if mode == PathMode::PathPrefix {
        for p in predicates {
            if !p.is_path_condition() {
                continue;
            }
            route.path = None;
            if let Some(i) = route.predicates.iter().position(|q| q.is_path_condition()) {
                route.predicates.remove(i);
            }
        }
    }

    route.predicates.extend(predicates.iter().cloned());
}

// A host already has a catch-all when some route matches every path: no
// path regex at all, or the root regex.
fn has_catch_all(routes: &[Route]) -> bool {
    routes
        .iter()
        .any(|r| r.path_regexps.is_empty() || r.path_regexps.iter().any(|rx| rx == "^/"))
}

fn log_dropped_rule(meta: &k8s::Metadata, err: &ConvertError) {
    let ingress = format!("{}/{}", meta.namespace, meta.name);
    match err {
        ConvertError::State(state_err) => {
            tracing::debug!(ingress = %ingress, error = %state_err, "dropping path rule");
        }
        ConvertError::NotAllowedExternalName(_) => {
            info!(ingress = %ingress, error = %err, "dropping path rule");
        }
        ConvertError::MissingBackend(_) => {
            error!(ingress = %ingress, error = %err, "dropping path rule");
        }
    }
}
