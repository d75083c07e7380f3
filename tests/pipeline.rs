use cafe_site_report::config::{BrandPattern, Config};
use cafe_site_report::loader::{load_raw_sources, SourceCache};
use cafe_site_report::pipeline::{
    clean_worker_records, compute_district_summary, filter_by_site_score_range,
    tag_budget_brand, BrandMatcher,
};
use cafe_site_report::reports::prepare;
use cafe_site_report::session::Session;
use cafe_site_report::types::{DistrictSummary, ShopRecord, TOTAL_LABEL};
use encoding_rs::EUC_KR;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SHOP_WIDTH: usize = 24;

/// A shop export shaped like the real one: name at column 21, district at
/// the second-to-last column, coordinates under Korean headers.
fn shop_csv(rows: &[(&str, &str, Option<(f64, f64)>)]) -> String {
    let mut headers: Vec<String> = (0..SHOP_WIDTH).map(|i| format!("col{i}")).collect();
    headers[5] = "위도".to_string();
    headers[6] = "경도".to_string();
    headers[21] = "상호명".to_string();
    headers[22] = "행정동명".to_string();
    let mut out = headers.join(",");
    out.push('\n');
    for (district, name, coords) in rows {
        let mut fields = vec![String::new(); SHOP_WIDTH];
        if let Some((lat, lon)) = coords {
            fields[5] = lat.to_string();
            fields[6] = lon.to_string();
        }
        fields[21] = name.to_string();
        fields[22] = district.to_string();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn worker_csv(rows: &[(&str, &str)]) -> Vec<u8> {
    let mut text = String::from("기간,자치구,동,사업체수,종사자수\n");
    for (district, count) in rows {
        text.push_str(&format!("2023,중구,{district},10,\"{count}\"\n"));
    }
    let (bytes, _, had_errors) = EUC_KR.encode(&text);
    assert!(!had_errors);
    bytes.into_owned()
}

struct Fixture {
    _dir: TempDir,
    shops: PathBuf,
    workers: PathBuf,
    out: PathBuf,
}

fn fixture(shops: &[(&str, &str, Option<(f64, f64)>)], workers: &[(&str, &str)]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let shops_path = dir.path().join("cafe_data_merge.csv");
    let workers_path = dir.path().join("seoul_work_data_updated.csv");
    fs::write(&shops_path, shop_csv(shops)).unwrap();
    fs::write(&workers_path, worker_csv(workers)).unwrap();
    Fixture {
        out: dir.path().join("reports"),
        shops: shops_path,
        workers: workers_path,
        _dir: dir,
    }
}

fn config_for(f: &Fixture, brands: Vec<BrandPattern>) -> Config {
    let mut config = Config::default();
    config.data.shops_path = f.shops.clone();
    config.data.workers_path = f.workers.clone();
    config.report.out_dir = f.out.clone();
    config.brands = brands;
    config
}

fn english_brands() -> Vec<BrandPattern> {
    vec![
        BrandPattern::new("Mega Coffee", "mega"),
        BrandPattern::new("Paik", "paik"),
    ]
}

#[test]
fn end_to_end_example() {
    let f = fixture(
        &[
            ("Dong A", "Mega Coffee", Some((37.56, 126.97))),
            ("Dong A", "Generic Cafe", None),
            ("Dong B", "Starbucks", Some((37.57, 126.98))),
        ],
        &[("Dong A", "1000"), ("Dong B", "500"), ("합계", "1500")],
    );
    let config = config_for(&f, english_brands());
    let raw = load_raw_sources(&f.shops, &f.workers, "cp949").unwrap();

    let workers = clean_worker_records(&raw.workers, &config.data.aggregate_markers);
    assert_eq!(workers.len(), 2);
    assert!(workers.iter().all(|w| w.district_name != TOTAL_LABEL));

    let prepared = prepare(&raw, &config).unwrap();
    assert_eq!(
        prepared.summary,
        vec![
            DistrictSummary {
                district_name: "Dong A".into(),
                worker_count: 1000.0,
                shop_count: 2,
                site_score: 500.0,
            },
            DistrictSummary {
                district_name: "Dong B".into(),
                worker_count: 500.0,
                shop_count: 1,
                site_score: 500.0,
            },
        ]
    );
    assert_eq!(prepared.shops[0].budget_brand.as_deref(), Some("Mega Coffee"));
    assert_eq!(prepared.shops[0].coordinates(), Some((37.56, 126.97)));
    assert_eq!(prepared.shops[1].budget_brand, None);
}

#[test]
fn summary_holds_join_and_ratio_properties() {
    let shops: Vec<ShopRecord> = ["A", "A", "A", "B", "C", "C"]
        .iter()
        .map(|d| ShopRecord::new(*d, "cafe"))
        .collect();
    let f = fixture(&[], &[("A", "300"), ("B", "7"), ("D", "40"), ("소계", "347")]);
    let raw = load_raw_sources(&f.shops, &f.workers, "cp949").unwrap();
    let workers = clean_worker_records(&raw.workers, &Config::default().data.aggregate_markers);

    let summary = compute_district_summary(&shops, &workers);
    let names: Vec<&str> = summary.iter().map(|d| d.district_name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    for d in &summary {
        assert!(d.shop_count >= 1);
        assert_eq!(d.site_score, d.worker_count / d.shop_count as f64);
    }

    let kept = filter_by_site_score_range(&summary, 7.0, 7.0);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].district_name, "B");
    assert!(filter_by_site_score_range(&summary, 100.0, 1.0).is_empty());
}

#[test]
fn retagging_changes_nothing() {
    let matcher = BrandMatcher::new(&Config::default().brands).unwrap();
    let shops = vec![
        ShopRecord::new("사직동", "메가MGC커피 사직점"),
        ShopRecord::new("사직동", "메가커피 광화문점"),
        ShopRecord::new("사직동", "더벤티 종로점"),
        ShopRecord::new("사직동", "매머드익스프레스"),
        ShopRecord::new("사직동", "카페 사직"),
    ];
    let once = tag_budget_brand(shops, &matcher);
    let twice = tag_budget_brand(once.clone(), &matcher);
    assert_eq!(once, twice);
    let brands: Vec<Option<&str>> = once.iter().map(|s| s.budget_brand.as_deref()).collect();
    assert_eq!(
        brands,
        vec![
            None,
            Some("메가커피"),
            Some("더벤티"),
            Some("매머드커피"),
            None
        ]
    );
}

#[test]
fn missing_source_is_a_data_load_error_and_writes_nothing() {
    let f = fixture(&[("Dong A", "Mega", None)], &[("Dong A", "10")]);
    let mut config = config_for(&f, english_brands());
    config.data.workers_path = Path::new(&f.workers).with_file_name("missing.csv");

    let mut session = Session::new(config);
    let err = session.generate().unwrap_err();
    assert!(err.is_data_load());
    assert!(!f.out.exists());

    let err = load_raw_sources(Path::new("nowhere/shops.csv"), &f.workers, "cp949").unwrap_err();
    assert!(err.is_data_load());
}

#[test]
fn session_recomputes_from_cache_with_new_filters() {
    let f = fixture(
        &[
            ("Dong A", "Mega Coffee", Some((37.5, 127.0))),
            ("Dong A", "Paik Dabang", Some((37.5, 127.0))),
            ("Dong B", "Mega Coffee", None),
            ("Dong C", "Corner Cafe", None),
        ],
        &[("Dong A", "1,000"), ("Dong B", "900"), ("Dong C", "-")],
    );
    let mut session = Session::with_cache(config_for(&f, english_brands()), SourceCache::new());

    let report = session.load().unwrap();
    assert_eq!(report.shop_rows, 4);
    assert_eq!(report.worker_records, 2);
    assert_eq!(report.districts, 2);
    assert_eq!(report.budget_brand_shops, 3);
    assert!(session.is_loaded());

    // Files are gone, but the cached load keeps serving passes.
    fs::remove_file(&f.shops).unwrap();
    session.select_brands(&["Paik".to_string()]).unwrap();
    session.set_score_range(Some((800.0, 1000.0)));
    let dash = session.generate().unwrap();
    assert_eq!(dash.crosstab.brands, vec!["Paik"]);
    assert_eq!(dash.crosstab.rows.len(), 1);
    assert_eq!(dash.site_scores.len(), 1);
    assert_eq!(dash.site_scores[0].district_name, "Dong B");

    cafe_site_report::output::render(&dash, &session.config.report).unwrap();
    for file in [
        "district_summary.csv",
        "brand_crosstab.csv",
        "summary.json",
        "map_points.csv",
    ] {
        assert!(f.out.join(file).exists(), "{file} missing");
    }

    assert!(session.select_brands(&["Nope".to_string()]).is_err());

    session.reload();
    assert!(session.generate().unwrap_err().is_data_load());
}
