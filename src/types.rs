use serde::Serialize;
use tabled::Tabled;

/// Column label of appended row/column totals in the brand crosstab.
pub const TOTAL_LABEL: &str = "합계";

pub const DISTRICT_COLUMN: &str = "districtName";
pub const WORKER_COUNT_COLUMN: &str = "workerCount";

/// A decoded CSV file before any schema is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    /// Cell at `(row, col)`; short rows read as empty.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(|s| s.as_str())
    }
}

/// Both raw sources, as loaded once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSources {
    pub shops: RawTable,
    pub workers: RawTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShopRecord {
    pub district_name: String,
    pub shop_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub budget_brand: Option<String>,
}

impl ShopRecord {
    pub fn new(district_name: impl Into<String>, shop_name: impl Into<String>) -> Self {
        Self {
            district_name: district_name.into(),
            shop_name: shop_name.into(),
            latitude: None,
            longitude: None,
            budget_brand: None,
        }
    }

    pub fn has_district(&self) -> bool {
        !self.district_name.is_empty()
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRecord {
    pub district_name: String,
    pub worker_count: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistrictSummary {
    pub district_name: String,
    pub worker_count: f64,
    pub shop_count: usize,
    pub site_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarySortKey {
    SiteScore,
    WorkerCount,
    ShopCount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrosstabRow {
    pub district_name: String,
    /// One count per entry of `BrandCrosstab::brands`.
    pub counts: Vec<usize>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrandCrosstab {
    pub brands: Vec<String>,
    pub rows: Vec<CrosstabRow>,
    pub totals: CrosstabRow,
}

impl BrandCrosstab {
    pub fn count(&self, district: &str, brand: &str) -> Option<usize> {
        let col = self.brands.iter().position(|b| b == brand)?;
        if district == TOTAL_LABEL {
            return self.totals.counts.get(col).copied();
        }
        let row = self.rows.iter().find(|r| r.district_name == district)?;
        row.counts.get(col).copied()
    }

    /// District rows plus the totals row, largest total first.
    pub fn sorted_by_total(&self) -> Vec<&CrosstabRow> {
        let mut out: Vec<&CrosstabRow> = std::iter::once(&self.totals)
            .chain(self.rows.iter())
            .collect();
        out.sort_by(|a, b| b.total.cmp(&a.total));
        out
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.brands.len() + 2);
        header.push("행정동명".to_string());
        header.extend(self.brands.iter().cloned());
        header.push(TOTAL_LABEL.to_string());
        header
    }
}

impl CrosstabRow {
    pub fn to_record(&self) -> Vec<String> {
        let mut rec = Vec::with_capacity(self.counts.len() + 2);
        rec.push(self.district_name.clone());
        rec.extend(self.counts.iter().map(|c| c.to_string()));
        rec.push(self.total.to_string());
        rec
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DistrictSummaryRow {
    #[serde(rename = "행정동명")]
    #[tabled(rename = "행정동명")]
    pub district_name: String,
    #[serde(rename = "종사자수")]
    #[tabled(rename = "종사자수")]
    pub worker_count: String,
    #[serde(rename = "카페수")]
    #[tabled(rename = "카페수")]
    pub shop_count: usize,
    #[serde(rename = "입지점수")]
    #[tabled(rename = "입지점수")]
    pub site_score: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ShopCountRow {
    #[serde(rename = "행정동명")]
    #[tabled(rename = "행정동명")]
    pub district_name: String,
    #[serde(rename = "카페수")]
    #[tabled(rename = "카페수")]
    pub shop_count: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct WorkerRankingRow {
    #[serde(rename = "행정동명")]
    #[tabled(rename = "행정동명")]
    pub district_name: String,
    #[serde(rename = "종사자수")]
    #[tabled(rename = "종사자수")]
    pub worker_count: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct BrandShareRow {
    #[serde(rename = "브랜드")]
    #[tabled(rename = "브랜드")]
    pub brand: String,
    #[serde(rename = "점포수")]
    #[tabled(rename = "점포수")]
    pub shop_count: usize,
    #[serde(rename = "점유율")]
    #[tabled(rename = "점유율")]
    pub share_pct: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct MissingValueRow {
    #[serde(rename = "컬럼명")]
    #[tabled(rename = "컬럼명")]
    pub column: String,
    #[serde(rename = "결측치수")]
    #[tabled(rename = "결측치수")]
    pub missing: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DescribeRow {
    #[serde(rename = "statistic")]
    #[tabled(rename = "statistic")]
    pub statistic: String,
    #[serde(rename = "종사자수")]
    #[tabled(rename = "종사자수")]
    pub worker_count: String,
    #[serde(rename = "카페수")]
    #[tabled(rename = "카페수")]
    pub shop_count: String,
    #[serde(rename = "입지점수")]
    #[tabled(rename = "입지점수")]
    pub site_score: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MapPoint {
    #[serde(rename = "위도")]
    pub latitude: f64,
    #[serde(rename = "경도")]
    pub longitude: f64,
    #[serde(rename = "행정동명")]
    pub district_name: String,
    #[serde(rename = "상호명")]
    pub shop_name: String,
}

/// Headline metrics plus the filters the pass was computed with.
#[derive(Debug, Serialize, Clone)]
pub struct OverviewStats {
    pub generated_at: String,
    pub total_shops: usize,
    pub analyzed_districts: usize,
    pub avg_site_score: f64,
    pub budget_brand_shops: usize,
    pub selected_brands: Vec<String>,
    pub score_range: (f64, f64),
    pub districts_in_range: usize,
}
