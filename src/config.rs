// Runtime configuration.
//
// Every field has a default matching the Seoul data exports, so the binary
// runs without a config file. A `cafe_report.toml` in the working directory
// (or one passed with `--config`) overrides individual fields.
use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "cafe_report.toml";

/// Labels in the worker source that mark subtotal/total rows, not districts.
pub static AGGREGATE_MARKERS: Lazy<Vec<String>> =
    Lazy::new(|| ["소계", "합계", "전체"].iter().map(|s| s.to_string()).collect());

/// Budget chains in matching order. Two spellings of 매머드 are both in use.
pub static DEFAULT_BRANDS: Lazy<Vec<BrandPattern>> = Lazy::new(|| {
    [
        ("메가커피", "메가커피|메가엠지씨"),
        ("빽다방", "빽다방"),
        ("컴포즈커피", "컴포즈"),
        ("더벤티", "더벤티"),
        ("매머드커피", "매머드|메머드"),
    ]
    .iter()
    .map(|(name, pattern)| BrandPattern::new(*name, *pattern))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrandPattern {
    pub name: String,
    pub pattern: String,
}

impl BrandPattern {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub shops_path: PathBuf,
    pub workers_path: PathBuf,
    /// Codepage label of the worker file, e.g. `cp949` or `euc-kr`.
    pub worker_encoding: String,
    pub aggregate_markers: Vec<String>,
    pub shop_name_column: usize,
    /// Defaults to the second-to-last column when unset.
    pub district_column: Option<usize>,
    pub latitude_header: String,
    pub longitude_header: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            shops_path: PathBuf::from("data_2/cafe_data_merge.csv"),
            workers_path: PathBuf::from("data_2/seoul_work_data_updated.csv"),
            worker_encoding: "cp949".to_string(),
            aggregate_markers: AGGREGATE_MARKERS.clone(),
            shop_name_column: 21,
            district_column: None,
            latitude_header: "위도".to_string(),
            longitude_header: "경도".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub out_dir: PathBuf,
    pub top_n: usize,
    pub worker_detail_rows: usize,
    pub missing_value_rows: usize,
    pub map_sample_size: usize,
    pub preview_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("reports"),
            top_n: 20,
            worker_detail_rows: 50,
            missing_value_rows: 10,
            map_sample_size: 2000,
            preview_rows: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub report: ReportConfig,
    pub brands: Vec<BrandPattern>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            report: ReportConfig::default(),
            brands: DEFAULT_BRANDS.clone(),
        }
    }
}

impl Config {
    /// Load `path`, or `cafe_report.toml` if present, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.brands.is_empty() {
            return Err(PipelineError::Config(
                "at least one brand pattern is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for brand in &self.brands {
            if brand.name.trim().is_empty() || brand.pattern.is_empty() {
                return Err(PipelineError::Config(
                    "brand entries need a name and a pattern".to_string(),
                ));
            }
            if !seen.insert(brand.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "brand '{}' is listed more than once",
                    brand.name
                )));
            }
        }
        if self.data.district_column == Some(self.data.shop_name_column) {
            return Err(PipelineError::Config(
                "shop name and district columns must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn brand_names(&self) -> Vec<String> {
        self.brands.iter().map(|b| b.name.clone()).collect()
    }
}
