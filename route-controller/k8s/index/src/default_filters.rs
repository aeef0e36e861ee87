//! Per-service default filters, loaded from a directory once per poll.

use crate::state::ResourceId;
use ahash::AHashMap as HashMap;
use route_controller_core::{dsl, Filter};
use std::path::Path;
use tracing::{debug, warn};

const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Filter fragments keyed by service, from files named
/// `<service>.<namespace>`. Contents stay raw: an invalid fragment is kept
/// as a string and surfaces from the engine's filter parser, not from here.
#[derive(Debug, Default)]
pub(crate) struct DefaultFilters {
    by_service: HashMap<ResourceId, String>,
}

impl DefaultFilters {
    pub fn load(dir: &Path) -> Self {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(dir = %dir.display(), %error, "cannot read default filters directory");
                return Self::default();
            }
        };

        let mut by_service = HashMap::default();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(id) = parse_file_name(name) else {
                debug!(file = %name, "incompatible file name");
                continue;
            };
            let keep = entry
                .metadata()
                .map(|m| m.is_file() && m.len() <= MAX_FILE_SIZE)
                .unwrap_or(false);
            if !keep {
                debug!(file = %name, "incompatible file");
                continue;
            }
            match std::fs::read_to_string(entry.path()) {
                Ok(content) => {
                    by_service.insert(id, content);
                }
                Err(error) => debug!(file = %name, %error, "could not read file"),
            }
        }

        DefaultFilters { by_service }
    }

    /// The filters to prepend for a service, split for chain composition. An
    /// unsplittable fragment is passed through whole.
    pub fn get(&self, namespace: &str, service: &str) -> Vec<Filter> {
        let Some(fragment) = self.by_service.get(&ResourceId::new(namespace, service)) else {
            return Vec::new();
        };
        match dsl::parse_filters(fragment) {
            Ok(filters) => filters,
            Err(_) => vec![Filter::Raw(fragment.clone())],
        }
    }
}

// File names are `<service>.<namespace>` over the word/dot/dash alphabet;
// the namespace is the segment after the last dot.
fn parse_file_name(name: &str) -> Option<ResourceId> {
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return None;
    }
    let (service, namespace) = name.rsplit_once('.')?;
    if service.is_empty() || namespace.is_empty() {
        return None;
    }
    Some(ResourceId::new(namespace, service))
}
