//! Backend traffic weights for paths served by more than one backend.

use ahash::AHashMap as HashMap;
use route_controller_k8s_api::PathRule;
use std::collections::HashMap as StdHashMap;

/// Computes and sets the traffic weight of every backend, relative to the
/// backends remaining for its path.
///
/// A backend without a declared weight gets weight 0; if no backend of a
/// path declares a weight, traffic is split equally. Declared weights are
/// relative: with
///
/// ```text
/// backend-1: 0.2
/// backend-2: 0.6
/// backend-3: 0.2
/// ```
///
/// the computed weights are `0.2`, `0.75`, `1.0` — each one the share of the
/// traffic still remaining at its position, so the last backend with a
/// nonzero weight always ends at exactly 1.0 and absorbs rounding drift. A
/// weight of 1.0 produces no traffic condition on the route.
pub(crate) fn compute_backend_weights(
    backend_weights: &StdHashMap<String, f64>,
    paths: &mut [PathRule],
) {
    #[derive(Default)]
    struct PathInfo {
        sum: f64,
        last_active: Option<usize>,
        count: usize,
        weights_count: usize,
    }

    // First pass: per path, the declared weight sum, the number of
    // unweighted backends, and the position of the last active weight.
    let mut infos: HashMap<String, PathInfo> = HashMap::default();
    for (i, rule) in paths.iter().enumerate() {
        let Some(backend) = &rule.backend else { continue };
        let info = infos.entry(rule.path.clone()).or_default();
        match backend_weights.get(&backend.service_name) {
            Some(&weight) => {
                info.sum += weight;
                if weight > 0.0 {
                    info.last_active = Some(i);
                    info.weights_count += 1;
                }
            }
            None => info.count += 1,
        }
    }

    // Second pass: assign weights against the residual sum or count, so each
    // skip hands its share on to the backends after it.
    for i in 0..paths.len() {
        let path = paths[i].path.clone();
        let Some(backend) = paths[i].backend.as_mut() else {
            continue;
        };
        let Some(info) = infos.get_mut(&path) else {
            continue;
        };

        match backend_weights.get(&backend.service_name).copied() {
            Some(weight) => {
                // The last active backend is pinned to 1.0 and skips the
                // residual accounting entirely.
                if info.last_active == Some(i) {
                    backend.traffic.weight = 1.0;
                    continue;
                }

                backend.traffic.weight = if info.sum > 0.0 { weight / info.sum } else { 0.0 };
                info.sum -= weight;

                if info.weights_count > 2 {
                    backend.traffic.noop_count = info.weights_count - 2;
                }
                info.weights_count = info.weights_count.saturating_sub(1);
            }
            None => {
                if info.sum == 0.0 && info.count > 0 {
                    backend.traffic.weight = 1.0 / info.count as f64;
                }
            }
        }
        info.count = info.count.saturating_sub(1);
    }
}
