// Pure derivations over typed records. Nothing here touches the disk;
// every function is recomputed from the cached load on each pass.
use crate::config::BrandPattern;
use crate::error::{PipelineError, Result};
use crate::types::{
    BrandCrosstab, CrosstabRow, DistrictSummary, MapPoint, RawTable, ShopRecord, SummarySortKey,
    WorkerRecord, DISTRICT_COLUMN, TOTAL_LABEL, WORKER_COUNT_COLUMN,
};
use crate::util::parse_f64_safe;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Worker records from the renamed worker table: marker rows dropped,
/// unparseable counts excluded.
pub fn clean_worker_records(raw: &RawTable, markers: &[String]) -> Vec<WorkerRecord> {
    let (Some(district_col), Some(count_col)) = (
        raw.column_index(DISTRICT_COLUMN),
        raw.column_index(WORKER_COUNT_COLUMN),
    ) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(raw.len());
    let mut markers_dropped = 0usize;
    let mut unparsed = 0usize;
    for row in 0..raw.len() {
        let district = raw.cell(row, district_col).unwrap_or("").trim();
        if markers.iter().any(|m| m == district) {
            markers_dropped += 1;
            continue;
        }
        let Some(worker_count) = parse_f64_safe(raw.cell(row, count_col)) else {
            unparsed += 1;
            continue;
        };
        out.push(WorkerRecord {
            district_name: district.to_string(),
            worker_count,
        });
    }
    debug!(kept = out.len(), markers_dropped, unparsed, "worker records cleaned");
    out
}

/// Ordered brand patterns, compiled case-insensitive.
#[derive(Debug, Clone)]
pub struct BrandMatcher {
    brands: Vec<(String, Regex)>,
}

impl BrandMatcher {
    pub fn new(patterns: &[BrandPattern]) -> Result<Self> {
        let brands = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(&p.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (p.name.clone(), re))
                    .map_err(|source| PipelineError::Pattern {
                        brand: p.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { brands })
    }

    /// First brand, in declaration order, whose pattern occurs in `shop_name`.
    pub fn brand_for(&self, shop_name: &str) -> Option<&str> {
        self.brands
            .iter()
            .find(|(_, re)| re.is_match(shop_name))
            .map(|(name, _)| name.as_str())
    }
}

/// Assign `budget_brand` from the shop name. Any previous tag is replaced by
/// the fresh match, so tagging twice gives the same result.
pub fn tag_budget_brand(shops: Vec<ShopRecord>, matcher: &BrandMatcher) -> Vec<ShopRecord> {
    shops
        .into_iter()
        .map(|mut shop| {
            shop.budget_brand = matcher.brand_for(&shop.shop_name).map(str::to_string);
            shop
        })
        .collect()
}

/// Shops per district, most shops first (ties by name). Shops without a
/// district are left out.
pub fn shop_counts(shops: &[ShopRecord]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for shop in shops.iter().filter(|s| s.has_district()) {
        *counts.entry(shop.district_name.as_str()).or_default() += 1;
    }
    let mut out: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(d, c)| (d.to_string(), c))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Inner join of shop counts and worker counts on district name, ordered by
/// district name. Worker rows sharing a district label are summed.
pub fn compute_district_summary(
    shops: &[ShopRecord],
    workers: &[WorkerRecord],
) -> Vec<DistrictSummary> {
    let mut worker_totals: BTreeMap<&str, f64> = BTreeMap::new();
    for w in workers {
        *worker_totals.entry(w.district_name.as_str()).or_default() += w.worker_count;
    }
    let shop_counts: HashMap<String, usize> = shop_counts(shops).into_iter().collect();

    worker_totals
        .into_iter()
        .filter_map(|(district, worker_count)| {
            let shop_count = *shop_counts.get(district)?;
            Some(DistrictSummary {
                district_name: district.to_string(),
                worker_count,
                shop_count,
                site_score: worker_count / shop_count as f64,
            })
        })
        .collect()
}

/// Sort descending by `key`, ties broken by district name.
pub fn sort_summary(summary: &mut [DistrictSummary], key: SummarySortKey) {
    summary.sort_by(|a, b| {
        let ord = match key {
            SummarySortKey::SiteScore => b.site_score.partial_cmp(&a.site_score),
            SummarySortKey::WorkerCount => b.worker_count.partial_cmp(&a.worker_count),
            SummarySortKey::ShopCount => Some(b.shop_count.cmp(&a.shop_count)),
        };
        ord.unwrap_or(Ordering::Equal)
            .then_with(|| a.district_name.cmp(&b.district_name))
    });
}

/// Smallest and largest site score, the default bounds of the range filter.
pub fn score_bounds(summary: &[DistrictSummary]) -> Option<(f64, f64)> {
    summary.iter().map(|d| d.site_score).fold(None::<(f64, f64)>, |acc, s| match acc {
        None => Some((s, s)),
        Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
    })
}

/// Inclusive on both ends; `lo > hi` yields nothing.
pub fn filter_by_site_score_range(
    summary: &[DistrictSummary],
    lo: f64,
    hi: f64,
) -> Vec<DistrictSummary> {
    summary
        .iter()
        .filter(|d| lo <= d.site_score && d.site_score <= hi)
        .cloned()
        .collect()
}

/// District × brand counts over shops tagged with one of `selected`.
pub fn compute_brand_crosstab(shops: &[ShopRecord], selected: &[String]) -> BrandCrosstab {
    let mut cells: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    let mut brands: BTreeSet<&str> = BTreeSet::new();
    for shop in shops.iter().filter(|s| s.has_district()) {
        let Some(brand) = shop.budget_brand.as_deref() else {
            continue;
        };
        if !selected.iter().any(|s| s == brand) {
            continue;
        }
        brands.insert(brand);
        *cells
            .entry(shop.district_name.as_str())
            .or_default()
            .entry(brand)
            .or_default() += 1;
    }

    let brands: Vec<String> = brands.into_iter().map(str::to_string).collect();
    let mut column_totals = vec![0usize; brands.len()];
    let rows: Vec<CrosstabRow> = cells
        .into_iter()
        .map(|(district, by_brand)| {
            let counts: Vec<usize> = brands
                .iter()
                .map(|b| by_brand.get(b.as_str()).copied().unwrap_or(0))
                .collect();
            for (total, c) in column_totals.iter_mut().zip(&counts) {
                *total += c;
            }
            CrosstabRow {
                district_name: district.to_string(),
                total: counts.iter().sum(),
                counts,
            }
        })
        .collect();

    let totals = CrosstabRow {
        district_name: TOTAL_LABEL.to_string(),
        total: column_totals.iter().sum(),
        counts: column_totals,
    };
    BrandCrosstab {
        brands,
        rows,
        totals,
    }
}

/// Shops per budget brand, largest first. Untagged shops are not counted.
pub fn brand_share(shops: &[ShopRecord]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for brand in shops.iter().filter_map(|s| s.budget_brand.as_deref()) {
        *counts.entry(brand).or_default() += 1;
    }
    let mut out: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(b, c)| (b.to_string(), c))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Empty cells per column of a raw table, most missing first.
pub fn missing_value_counts(raw: &RawTable) -> Vec<(String, usize)> {
    let mut out: Vec<(String, usize)> = raw
        .headers
        .iter()
        .enumerate()
        .map(|(col, name)| {
            let missing = (0..raw.len())
                .filter(|&row| raw.cell(row, col).map_or(true, |v| v.trim().is_empty()))
                .count();
            (name.clone(), missing)
        })
        .collect();
    // Stable sort keeps file order among equal counts.
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out
}

pub fn worker_ranking(workers: &[WorkerRecord]) -> Vec<WorkerRecord> {
    let mut out = workers.to_vec();
    out.sort_by(|a, b| {
        b.worker_count
            .partial_cmp(&a.worker_count)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.district_name.cmp(&b.district_name))
    });
    out
}

/// At most `limit` shops with both coordinates, evenly spaced over the input.
pub fn sample_map_points(shops: &[ShopRecord], limit: usize) -> Vec<MapPoint> {
    let located: Vec<(&ShopRecord, (f64, f64))> = shops
        .iter()
        .filter_map(|s| s.coordinates().map(|c| (s, c)))
        .collect();
    let n = located.len();
    let take = limit.min(n);
    (0..take)
        .map(|i| {
            let (shop, (latitude, longitude)) = located[i * n / take];
            MapPoint {
                latitude,
                longitude,
                district_name: shop.district_name.clone(),
                shop_name: shop.shop_name.clone(),
            }
        })
        .collect()
}
