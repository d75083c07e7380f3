use crate::config::ReportConfig;
use crate::error::{PipelineError, Result};
use crate::reports::Dashboard;
use crate::types::BrandCrosstab;
use crate::util::{format_int, format_number};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::{info, warn};

/// One export file, fully serialized before anything touches the disk.
#[derive(Debug, Clone)]
pub struct Export {
    pub file_name: &'static str,
    pub bytes: Vec<u8>,
}

pub fn csv_bytes<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))
}

/// Full crosstab in display order (totals row first).
pub fn crosstab_csv_bytes(crosstab: &BrandCrosstab) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(crosstab.header())?;
    for row in crosstab.sorted_by_total() {
        wtr.write_record(row.to_record())?;
    }
    wtr.into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))
}

/// Every file of one report pass, in write order.
pub fn exports(dash: &Dashboard) -> Result<Vec<Export>> {
    Ok(vec![
        Export {
            file_name: "describe.csv",
            bytes: csv_bytes(&dash.describe)?,
        },
        Export {
            file_name: "missing_values.csv",
            bytes: csv_bytes(&dash.missing_values)?,
        },
        Export {
            file_name: "shop_counts.csv",
            bytes: csv_bytes(&dash.shop_counts)?,
        },
        Export {
            file_name: "brand_share.csv",
            bytes: csv_bytes(&dash.brand_share)?,
        },
        Export {
            file_name: "brand_crosstab.csv",
            bytes: crosstab_csv_bytes(&dash.crosstab)?,
        },
        Export {
            file_name: "worker_ranking.csv",
            bytes: csv_bytes(&dash.worker_ranking)?,
        },
        Export {
            file_name: "district_summary.csv",
            bytes: csv_bytes(&dash.site_scores)?,
        },
        Export {
            file_name: "map_points.csv",
            bytes: csv_bytes(&dash.map_points)?,
        },
        Export {
            file_name: "summary.json",
            bytes: serde_json::to_vec_pretty(&dash.overview)?,
        },
    ])
}

fn staging_path(out: &Path, file_name: &str) -> PathBuf {
    out.join(format!(".{}.partial", file_name))
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        if let Err(e) = fs::remove_file(tmp) {
            warn!(path = %tmp.display(), error = %e, "could not remove staged export");
        }
    }
}

fn stage(out: &Path, exports: &[Export], staged: &mut Vec<(PathBuf, PathBuf)>) -> Result<()> {
    for export in exports {
        let target = out.join(export.file_name);
        if target.is_dir() {
            return Err(PipelineError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is a directory", target.display()),
            )));
        }
        let tmp = staging_path(out, export.file_name);
        fs::write(&tmp, &export.bytes)?;
        staged.push((tmp, target));
    }
    Ok(())
}

/// Write every export into `out` or none of them. Files are staged next to
/// their targets and renamed into place only once all of them are on disk.
pub fn write_exports(out: &Path, exports: &[Export]) -> Result<()> {
    let created = !out.exists();
    fs::create_dir_all(out)?;
    let mut staged = Vec::with_capacity(exports.len());
    if let Err(e) = stage(out, exports, &mut staged) {
        discard(&staged);
        if created {
            let _ = fs::remove_dir(out);
        }
        return Err(e);
    }
    for (i, (tmp, target)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(tmp, target) {
            discard(&staged[i..]);
            return Err(e.into());
        }
    }
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return "(no rows)\n\n".to_string();
    }
    format!("{}\n\n", Table::new(slice).with(Style::markdown()))
}

pub fn crosstab_table(crosstab: &BrandCrosstab, max_rows: usize) -> Option<String> {
    if crosstab.rows.is_empty() {
        return None;
    }
    let mut builder = Builder::default();
    builder.push_record(crosstab.header());
    for row in crosstab.sorted_by_total().into_iter().take(max_rows) {
        builder.push_record(row.to_record());
    }
    Some(builder.build().with(Style::markdown()).to_string())
}

fn section(title: &str, note: &str) -> String {
    format!("{}\n({})\n\n", title, note)
}

/// `showing 5 of 412` style note for a preview capped at `max_rows`.
fn shown_of(total: usize, max_rows: usize) -> String {
    format!(
        "showing {} of {}",
        format_int(total.min(max_rows)),
        format_int(total)
    )
}

/// Console previews of every table, as one block of text.
pub fn preview_text(dash: &Dashboard, report: &ReportConfig) -> String {
    let preview = report.preview_rows;
    let o = &dash.overview;
    let mut text = String::new();

    text.push_str("Overview\n");
    text.push_str(&format!("  Total shops:           {}\n", format_int(o.total_shops)));
    text.push_str(&format!(
        "  Analyzed districts:    {}\n",
        format_int(o.analyzed_districts)
    ));
    text.push_str(&format!(
        "  Average site score:    {}\n",
        format_number(o.avg_site_score, 2)
    ));
    text.push_str(&format!(
        "  Budget brand shops:    {}\n",
        format_int(o.budget_brand_shops)
    ));
    text.push_str(&format!(
        "  Score range:           {} ~ {} ({} districts)\n\n",
        format_number(o.score_range.0, 2),
        format_number(o.score_range.1, 2),
        format_int(o.districts_in_range)
    ));

    text.push_str(&section(
        "Descriptive Statistics",
        "workers, shops and site score per district",
    ));
    text.push_str(&preview_table_rows(&dash.describe, dash.describe.len()));

    let rows = report.missing_value_rows;
    text.push_str(&section(
        "Missing Values",
        &format!("shop columns, {}", shown_of(dash.missing_values.len(), rows)),
    ));
    text.push_str(&preview_table_rows(&dash.missing_values, rows));

    let rows = preview.min(report.top_n);
    text.push_str(&section(
        "Shops per District",
        &shown_of(dash.shop_counts.len(), rows),
    ));
    text.push_str(&preview_table_rows(&dash.shop_counts, rows));

    text.push_str(&section("Budget Brand Share", "shops per brand"));
    text.push_str(&preview_table_rows(&dash.brand_share, dash.brand_share.len()));

    // The totals row counts towards the shown rows.
    let rows = preview.min(report.top_n);
    let crosstab_rows = match dash.crosstab.rows.len() {
        0 => 0,
        n => n + 1,
    };
    text.push_str(&section(
        "District x Brand Crosstab",
        &format!(
            "selected: {}; {}",
            o.selected_brands.join(", "),
            shown_of(crosstab_rows, rows)
        ),
    ));
    match crosstab_table(&dash.crosstab, rows) {
        Some(t) => text.push_str(&format!("{}\n\n", t)),
        None => text.push_str("(no rows)\n\n"),
    }

    let rows = preview.min(report.worker_detail_rows);
    text.push_str(&section(
        "Workers per District",
        &shown_of(dash.worker_ranking.len(), rows),
    ));
    text.push_str(&preview_table_rows(&dash.worker_ranking, rows));

    let rows = preview.min(report.top_n);
    text.push_str(&section(
        "Site Score Ranking",
        &format!(
            "site score = workers / shops; {}",
            shown_of(dash.site_scores.len(), rows)
        ),
    ));
    text.push_str(&preview_table_rows(&dash.site_scores, rows));

    text.push_str(&format!(
        "(Full tables and {} map points exported to {})\n",
        format_int(dash.map_points.len()),
        report.out_dir.display()
    ));
    text
}

/// Export the full tables to `report.out_dir`, then print the previews.
/// Nothing is printed unless every file was written. Call only with a
/// fully built dashboard.
pub fn render(dash: &Dashboard, report: &ReportConfig) -> Result<()> {
    let files = exports(dash)?;
    let text = preview_text(dash, report);
    write_exports(&report.out_dir, &files)?;
    println!("{}", text);
    info!(out_dir = %report.out_dir.display(), files = files.len(), "reports written");
    Ok(())
}
