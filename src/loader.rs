// Reading and decoding of the two source files.
//
// Everything positional lives here: once a `ShopSchema` is resolved and the
// worker columns are renamed, the rest of the crate works by name or on
// typed records.
use crate::config::DataConfig;
use crate::error::{PipelineError, Result};
use crate::types::{RawSources, RawTable, ShopRecord, DISTRICT_COLUMN, WORKER_COUNT_COLUMN};
use crate::util::parse_f64_safe;
use csv::ReaderBuilder;
use encoding_rs::{Encoding, EUC_KR, UTF_8};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Both sources need at least this many columns.
pub const MIN_COLUMNS: usize = 5;
pub const WORKER_DISTRICT_POS: usize = 2;
pub const WORKER_COUNT_POS: usize = 4;

/// Map a codepage label to a decoder. `cp949` and friends are served by the
/// EUC-KR decoder, which implements the full windows-949 table.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    let label = label.trim();
    match label.to_ascii_lowercase().as_str() {
        "cp949" | "ms949" | "uhc" => Ok(EUC_KR),
        _ => Encoding::for_label(label.as_bytes()).ok_or_else(|| {
            PipelineError::Config(format!("unknown text encoding '{}'", label))
        }),
    }
}

/// Read `path` and decode it strictly; a byte order mark overrides `encoding`.
pub fn decode_file(path: &Path, encoding: &'static Encoding) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| PipelineError::data_load(path, e.to_string()))?;
    let (encoding, bom_len) = Encoding::for_bom(&bytes).unwrap_or((encoding, 0));
    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
        .map(|text| text.into_owned())
        .ok_or_else(|| {
            PipelineError::data_load(
                path,
                format!("contents are not valid {}", encoding.name()),
            )
        })
}

pub fn read_table(path: &Path, text: &str) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| PipelineError::data_load(path, e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| PipelineError::data_load(path, e.to_string()))?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }
    Ok(RawTable { headers, rows })
}

fn load_table(path: &Path, encoding: &'static Encoding) -> Result<RawTable> {
    let text = decode_file(path, encoding)?;
    let table = read_table(path, &text)?;
    if table.width() < MIN_COLUMNS {
        return Err(PipelineError::data_load(
            path,
            format!(
                "expected at least {} columns, found {}",
                MIN_COLUMNS,
                table.width()
            ),
        ));
    }
    debug!(path = %path.display(), rows = table.len(), columns = table.width(), "table read");
    Ok(table)
}

/// Read both sources from disk. The worker district/count columns are
/// renamed to their canonical names before returning.
pub fn load_raw_sources(
    shops_path: &Path,
    workers_path: &Path,
    worker_encoding: &str,
) -> Result<RawSources> {
    let worker_encoding = resolve_encoding(worker_encoding)?;
    let shops = load_table(shops_path, UTF_8)?;
    let mut workers = load_table(workers_path, worker_encoding)?;
    workers.headers[WORKER_DISTRICT_POS] = DISTRICT_COLUMN.to_string();
    workers.headers[WORKER_COUNT_POS] = WORKER_COUNT_COLUMN.to_string();
    info!(
        shops = shops.len(),
        workers = workers.len(),
        encoding = worker_encoding.name(),
        "raw sources loaded"
    );
    Ok(RawSources { shops, workers })
}

/// Per-session memo of `load_raw_sources`, keyed by the pair of paths.
///
/// Entries are never refreshed; `clear` is the only way to pick up changed
/// files.
#[derive(Debug, Default)]
pub struct SourceCache {
    entries: HashMap<(PathBuf, PathBuf), Arc<RawSources>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(
        &mut self,
        shops_path: &Path,
        workers_path: &Path,
        worker_encoding: &str,
    ) -> Result<Arc<RawSources>> {
        let key = (shops_path.to_path_buf(), workers_path.to_path_buf());
        if let Some(hit) = self.entries.get(&key) {
            debug!("raw sources served from cache");
            return Ok(Arc::clone(hit));
        }
        let sources = Arc::new(load_raw_sources(shops_path, workers_path, worker_encoding)?);
        self.entries.insert(key, Arc::clone(&sources));
        Ok(sources)
    }

    pub fn contains(&self, shops_path: &Path, workers_path: &Path) -> bool {
        self.entries
            .contains_key(&(shops_path.to_path_buf(), workers_path.to_path_buf()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Column positions of the shop file, resolved once against its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopSchema {
    pub shop_name: usize,
    pub district: usize,
    pub latitude: Option<usize>,
    pub longitude: Option<usize>,
}

impl ShopSchema {
    pub fn resolve(table: &RawTable, config: &DataConfig, path: &Path) -> Result<Self> {
        let width = table.width();
        let district = config.district_column.unwrap_or(width.saturating_sub(2));
        for (what, pos) in [("shop name", config.shop_name_column), ("district", district)] {
            if pos >= width {
                return Err(PipelineError::data_load(
                    path,
                    format!("{} column {} is out of range ({} columns)", what, pos, width),
                ));
            }
        }
        Ok(Self {
            shop_name: config.shop_name_column,
            district,
            latitude: table.column_index(&config.latitude_header),
            longitude: table.column_index(&config.longitude_header),
        })
    }

    /// One typed record per shop row. A missing district reads as an empty
    /// name; such shops are counted in totals but never grouped or joined.
    pub fn records(&self, table: &RawTable) -> Vec<ShopRecord> {
        let mut out = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let district = table.cell(row, self.district).unwrap_or("").trim();
            out.push(ShopRecord {
                district_name: district.to_string(),
                shop_name: table.cell(row, self.shop_name).unwrap_or("").trim().to_string(),
                latitude: self.latitude.and_then(|c| parse_f64_safe(table.cell(row, c))),
                longitude: self.longitude.and_then(|c| parse_f64_safe(table.cell(row, c))),
                budget_brand: None,
            });
        }
        let unlocated = out.iter().filter(|r| !r.has_district()).count();
        if unlocated > 0 {
            debug!(unlocated, "shop rows without a district name");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_bytes(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn cp949(text: &str) -> Vec<u8> {
        let (bytes, _, had_errors) = EUC_KR.encode(text);
        assert!(!had_errors);
        bytes.into_owned()
    }

    const WORKERS: &str = "시도,구,동,코드,종사자\n서울,종로구,사직동,1,1000\n서울,종로구,합계,2,1000\n";
    const SHOPS: &str = "a,b,c,d,동,e\n1,2,3,4,사직동,x\n";

    #[test]
    fn cp949_alias_resolves_to_euc_kr() {
        assert_eq!(resolve_encoding("cp949").unwrap(), EUC_KR);
        assert_eq!(resolve_encoding("CP949").unwrap(), EUC_KR);
        assert_eq!(resolve_encoding("utf-8").unwrap(), UTF_8);
        assert!(matches!(
            resolve_encoding("klingon"),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn worker_columns_are_renamed_after_decode() {
        let shops = write_bytes(SHOPS.as_bytes());
        let workers = write_bytes(&cp949(WORKERS));
        let raw = load_raw_sources(shops.path(), workers.path(), "cp949").unwrap();
        assert_eq!(raw.workers.headers[2], DISTRICT_COLUMN);
        assert_eq!(raw.workers.headers[4], WORKER_COUNT_COLUMN);
        assert_eq!(raw.workers.headers[0], "시도");
        assert_eq!(raw.workers.cell(0, 2), Some("사직동"));
        assert_eq!(raw.shops.len(), 1);
    }

    #[test]
    fn invalid_bytes_fail_strict_cp949_decoding() {
        // 0xFF is never a lead byte in windows-949.
        let shops = write_bytes(SHOPS.as_bytes());
        let workers = write_bytes(b"a,b,c,d,e\n1,2,\xff\x80,4,5\n");
        let err = load_raw_sources(shops.path(), workers.path(), "cp949").unwrap_err();
        assert!(err.is_data_load());
    }

    #[test]
    fn narrow_files_are_rejected() {
        let shops = write_bytes(SHOPS.as_bytes());
        let workers = write_bytes(&cp949("동,종사자\n사직동,1\n"));
        let err = load_raw_sources(shops.path(), workers.path(), "cp949").unwrap_err();
        match err {
            PipelineError::DataLoad { reason, .. } => assert!(reason.contains("at least 5")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_a_data_load_error() {
        let shops = write_bytes(SHOPS.as_bytes());
        let err = load_raw_sources(shops.path(), Path::new("nope/workers.csv"), "cp949")
            .unwrap_err();
        assert!(err.is_data_load());
    }

    #[test]
    fn cache_serves_second_load_without_disk() {
        let shops = write_bytes(SHOPS.as_bytes());
        let workers = write_bytes(&cp949(WORKERS));
        let shops_path = shops.path().to_path_buf();
        let workers_path = workers.path().to_path_buf();

        let mut cache = SourceCache::new();
        let first = cache.get_or_load(&shops_path, &workers_path, "cp949").unwrap();
        drop(shops);
        drop(workers);
        let second = cache.get_or_load(&shops_path, &workers_path, "cp949").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache
            .get_or_load(&shops_path, &workers_path, "cp949")
            .unwrap_err()
            .is_data_load());
    }

    #[test]
    fn shop_schema_maps_positions_and_coordinates() {
        let table = RawTable {
            headers: vec!["상호", "위도", "경도", "동", "구"]
                .into_iter()
                .map(String::from)
                .collect(),
            rows: vec![
                vec!["메가커피 사직점", "37.57", "126.97", "사직동", "종로구"],
                vec!["동네카페", "", "126.9", "사직동", "종로구"],
                vec!["무명", "37.5", "127.0", "", "종로구"],
            ]
            .into_iter()
            .map(|r| r.into_iter().map(String::from).collect())
            .collect(),
        };
        let config = DataConfig {
            shop_name_column: 0,
            ..DataConfig::default()
        };
        let schema = ShopSchema::resolve(&table, &config, Path::new("shops.csv")).unwrap();
        assert_eq!(schema.district, 3);
        assert_eq!(schema.latitude, Some(1));

        let records = schema.records(&table);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].coordinates(), Some((37.57, 126.97)));
        assert_eq!(records[1].latitude, None);
        assert_eq!(records[1].longitude, Some(126.9));
        assert!(!records[2].has_district());
        assert_eq!(records[2].shop_name, "무명");
    }

    #[test]
    fn shop_schema_rejects_out_of_range_name_column() {
        let table = RawTable {
            headers: (0..6).map(|i| i.to_string()).collect(),
            rows: vec![],
        };
        let err = ShopSchema::resolve(&table, &DataConfig::default(), Path::new("shops.csv"))
            .unwrap_err();
        assert!(err.is_data_load());
    }
}
