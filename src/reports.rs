use crate::config::Config;
use crate::error::Result;
use crate::loader::ShopSchema;
use crate::pipeline::{
    brand_share, clean_worker_records, compute_brand_crosstab, compute_district_summary,
    filter_by_site_score_range, missing_value_counts, sample_map_points, score_bounds,
    shop_counts, sort_summary, tag_budget_brand, worker_ranking, BrandMatcher,
};
use crate::types::{
    BrandCrosstab, BrandShareRow, DescribeRow, DistrictSummary, DistrictSummaryRow, MapPoint,
    MissingValueRow, OverviewStats, RawSources, ShopCountRow, ShopRecord, SummarySortKey,
    WorkerRankingRow, WorkerRecord,
};
use crate::util::{average, describe, format_number, format_optional, ColumnStats};
use chrono::Local;
use tracing::info;

/// Typed tables derived from one raw load, before any user filter applies.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub shops: Vec<ShopRecord>,
    pub workers: Vec<WorkerRecord>,
    pub summary: Vec<DistrictSummary>,
}

/// User-chosen parameters of a generation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Filters {
    pub selected_brands: Vec<String>,
    /// `None` means the full range of the current summary.
    pub score_range: Option<(f64, f64)>,
}

impl Filters {
    pub fn all_brands(config: &Config) -> Self {
        Self {
            selected_brands: config.brand_names(),
            score_range: None,
        }
    }
}

pub fn prepare(raw: &RawSources, config: &Config) -> Result<Prepared> {
    let schema = ShopSchema::resolve(&raw.shops, &config.data, &config.data.shops_path)?;
    let matcher = BrandMatcher::new(&config.brands)?;
    let shops = tag_budget_brand(schema.records(&raw.shops), &matcher);
    let workers = clean_worker_records(&raw.workers, &config.data.aggregate_markers);
    let summary = compute_district_summary(&shops, &workers);
    info!(
        shops = shops.len(),
        workers = workers.len(),
        districts = summary.len(),
        "pipeline prepared"
    );
    Ok(Prepared {
        shops,
        workers,
        summary,
    })
}

/// Every table of one report pass, fully computed before anything is shown.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub overview: OverviewStats,
    pub describe: Vec<DescribeRow>,
    pub missing_values: Vec<MissingValueRow>,
    pub shop_counts: Vec<ShopCountRow>,
    pub brand_share: Vec<BrandShareRow>,
    pub crosstab: BrandCrosstab,
    pub worker_ranking: Vec<WorkerRankingRow>,
    pub site_scores: Vec<DistrictSummaryRow>,
    pub map_points: Vec<MapPoint>,
}

pub fn build_dashboard(
    raw: &RawSources,
    prepared: &Prepared,
    filters: &Filters,
    config: &Config,
) -> Dashboard {
    let (lo, hi) = filters
        .score_range
        .or_else(|| score_bounds(&prepared.summary))
        .unwrap_or((0.0, 0.0));
    let mut in_range = filter_by_site_score_range(&prepared.summary, lo, hi);
    sort_summary(&mut in_range, SummarySortKey::SiteScore);

    let overview = generate_overview(prepared, filters, (lo, hi), in_range.len());

    Dashboard {
        overview,
        describe: generate_describe(&prepared.summary),
        missing_values: missing_value_counts(&raw.shops)
            .into_iter()
            .map(|(column, missing)| MissingValueRow { column, missing })
            .collect(),
        shop_counts: shop_counts(&prepared.shops)
            .into_iter()
            .map(|(district_name, shop_count)| ShopCountRow {
                district_name,
                shop_count,
            })
            .collect(),
        brand_share: generate_brand_share(&prepared.shops),
        crosstab: compute_brand_crosstab(&prepared.shops, &filters.selected_brands),
        worker_ranking: worker_ranking(&prepared.workers)
            .into_iter()
            .map(|w| WorkerRankingRow {
                district_name: w.district_name,
                worker_count: format_number(w.worker_count, 0),
            })
            .collect(),
        site_scores: in_range.iter().map(summary_row).collect(),
        map_points: sample_map_points(&prepared.shops, config.report.map_sample_size),
    }
}

pub fn summary_row(d: &DistrictSummary) -> DistrictSummaryRow {
    DistrictSummaryRow {
        district_name: d.district_name.clone(),
        worker_count: format_number(d.worker_count, 0),
        shop_count: d.shop_count,
        site_score: format_number(d.site_score, 2),
    }
}

pub fn generate_overview(
    prepared: &Prepared,
    filters: &Filters,
    score_range: (f64, f64),
    districts_in_range: usize,
) -> OverviewStats {
    let scores: Vec<f64> = prepared.summary.iter().map(|d| d.site_score).collect();
    OverviewStats {
        generated_at: Local::now().to_rfc3339(),
        total_shops: prepared.shops.len(),
        analyzed_districts: prepared.summary.len(),
        avg_site_score: average(&scores),
        budget_brand_shops: prepared
            .shops
            .iter()
            .filter(|s| s.budget_brand.is_some())
            .count(),
        selected_brands: filters.selected_brands.clone(),
        score_range,
        districts_in_range,
    }
}

fn generate_brand_share(shops: &[ShopRecord]) -> Vec<BrandShareRow> {
    let counts = brand_share(shops);
    let total: usize = counts.iter().map(|(_, c)| c).sum();
    counts
        .into_iter()
        .map(|(brand, shop_count)| BrandShareRow {
            brand,
            shop_count,
            share_pct: format_number(shop_count as f64 / total as f64 * 100.0, 1),
        })
        .collect()
}

pub fn generate_describe(summary: &[DistrictSummary]) -> Vec<DescribeRow> {
    let workers = describe(&summary.iter().map(|d| d.worker_count).collect::<Vec<_>>());
    let shops = describe(
        &summary
            .iter()
            .map(|d| d.shop_count as f64)
            .collect::<Vec<_>>(),
    );
    let scores = describe(&summary.iter().map(|d| d.site_score).collect::<Vec<_>>());

    let pick: [(&str, fn(&ColumnStats) -> Option<f64>); 8] = [
        ("count", |s| Some(s.count as f64)),
        ("mean", |s| s.mean),
        ("std", |s| s.std),
        ("min", |s| s.min),
        ("25%", |s| s.q25),
        ("50%", |s| s.q50),
        ("75%", |s| s.q75),
        ("max", |s| s.max),
    ];
    pick.iter()
        .map(|(label, f)| DescribeRow {
            statistic: label.to_string(),
            worker_count: format_optional(f(&workers), 2),
            shop_count: format_optional(f(&shops), 2),
            site_score: format_optional(f(&scores), 2),
        })
        .collect()
}
