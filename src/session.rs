// One interactive session: configuration, the injected load cache and the
// current filters. Each report pass recomputes everything from the cache.
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::loader::SourceCache;
use crate::reports::{build_dashboard, prepare, Dashboard, Filters, Prepared};
use crate::types::RawSources;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub shop_rows: usize,
    pub shops_without_district: usize,
    pub worker_rows: usize,
    pub worker_records: usize,
    pub districts: usize,
    pub budget_brand_shops: usize,
}

#[derive(Debug)]
pub struct Session {
    pub config: Config,
    cache: SourceCache,
    filters: Filters,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self::with_cache(config, SourceCache::new())
    }

    pub fn with_cache(config: Config, cache: SourceCache) -> Self {
        let filters = Filters::all_brands(&config);
        Self {
            config,
            cache,
            filters,
        }
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn is_loaded(&self) -> bool {
        self.cache
            .contains(&self.config.data.shops_path, &self.config.data.workers_path)
    }

    fn sources(&mut self) -> Result<Arc<RawSources>> {
        let data = &self.config.data;
        self.cache
            .get_or_load(&data.shops_path, &data.workers_path, &data.worker_encoding)
    }

    fn prepared(&mut self) -> Result<(Arc<RawSources>, Prepared)> {
        let raw = self.sources()?;
        let prepared = prepare(&raw, &self.config)?;
        Ok((raw, prepared))
    }

    pub fn load(&mut self) -> Result<LoadReport> {
        let (raw, prepared) = self.prepared()?;
        Ok(LoadReport {
            shop_rows: raw.shops.len(),
            shops_without_district: prepared.shops.iter().filter(|s| !s.has_district()).count(),
            worker_rows: raw.workers.len(),
            worker_records: prepared.workers.len(),
            districts: prepared.summary.len(),
            budget_brand_shops: prepared
                .shops
                .iter()
                .filter(|s| s.budget_brand.is_some())
                .count(),
        })
    }

    /// Recompute every table with the current filters.
    pub fn generate(&mut self) -> Result<Dashboard> {
        let (raw, prepared) = self.prepared()?;
        Ok(build_dashboard(&raw, &prepared, &self.filters, &self.config))
    }

    /// Replace the brand selection. Names must come from the configured list;
    /// an empty list selects every brand.
    pub fn select_brands(&mut self, names: &[String]) -> Result<()> {
        let known = self.config.brand_names();
        if names.is_empty() {
            self.filters.selected_brands = known;
            return Ok(());
        }
        if let Some(unknown) = names.iter().find(|n| !known.contains(n)) {
            return Err(PipelineError::Config(format!(
                "unknown brand '{}' (choose from {})",
                unknown,
                known.join(", ")
            )));
        }
        // Keep declaration order regardless of input order.
        self.filters.selected_brands = known.into_iter().filter(|k| names.contains(k)).collect();
        info!(brands = ?self.filters.selected_brands, "brand selection changed");
        Ok(())
    }

    pub fn set_score_range(&mut self, range: Option<(f64, f64)>) {
        self.filters.score_range = range;
        info!(?range, "site score range changed");
    }

    /// Drop cached sources so the next pass reads the files again.
    pub fn reload(&mut self) {
        self.cache.clear();
    }
}
