//! Adapter instances keyed by (platform, config id)
//!
//! One adapter per connection profile keeps its token cache and rate budget
//! alive across calls.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tablesync_domain::{Platform, PlatformConfig, Result};
use tracing::debug;

use crate::adapter::{AdapterFactory, TableAdapter};

struct CachedAdapter {
    config: PlatformConfig,
    adapter: Arc<dyn TableAdapter>,
}

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<(Platform, String), CachedAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached adapter for the profile, built on first use
    ///
    /// A profile whose contents changed since the adapter was built gets a
    /// fresh adapter. The map entry stays locked while the factory runs, so
    /// concurrent callers for one profile share a single adapter.
    pub fn get_or_create(
        &self,
        platform: Platform,
        config: &PlatformConfig,
        factory: &dyn AdapterFactory,
    ) -> Result<Arc<dyn TableAdapter>> {
        match self.adapters.entry((platform, config.id.clone())) {
            Entry::Occupied(entry) if entry.get().config == *config => {
                Ok(Arc::clone(&entry.get().adapter))
            }
            Entry::Occupied(mut entry) => {
                let cached = build(platform, config, factory)?;
                let adapter = Arc::clone(&cached.adapter);
                entry.insert(cached);
                Ok(adapter)
            }
            Entry::Vacant(entry) => {
                let cached = build(platform, config, factory)?;
                let adapter = Arc::clone(&cached.adapter);
                entry.insert(cached);
                Ok(adapter)
            }
        }
    }

    pub fn invalidate(&self, platform: Platform, config_id: &str) -> bool {
        self.adapters.remove(&(platform, config_id.to_string())).is_some()
    }

    pub fn invalidate_all(&self) {
        self.adapters.clear();
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

fn build(
    platform: Platform,
    config: &PlatformConfig,
    factory: &dyn AdapterFactory,
) -> Result<CachedAdapter> {
    let adapter = factory.create(platform, config)?;
    debug!(platform = %platform, config_id = %config.id, "adapter instantiated");
    Ok(CachedAdapter { config: config.clone(), adapter })
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry").field("cached", &self.adapters.len()).finish()
    }
}
