// Entry point and high-level CLI flow.
//
// - Option [1] loads both source files once and prints diagnostics.
// - Option [2] recomputes every table with the current filters, previews
//   them and exports the full tables.
// - Options [3] and [4] change the brand selection and site score range.
// - Option [5] drops the cached files so the next pass reads them again.
//
// Every action has a single error boundary: a failure prints one message and
// the session carries on.
use cafe_site_report::config::Config;
use cafe_site_report::error::PipelineError;
use cafe_site_report::session::Session;
use cafe_site_report::util::{format_int, format_number};
use cafe_site_report::{logging, output};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "cafe_site_report",
    about = "Coffee shop site scores per administrative district (workers / shops)"
)]
struct Cli {
    /// TOML config file (defaults to ./cafe_report.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Shop listing CSV (UTF-8)
    #[arg(long)]
    shops: Option<PathBuf>,
    /// Worker statistics CSV (legacy codepage)
    #[arg(long)]
    workers: Option<PathBuf>,
    /// Codepage of the worker file, e.g. cp949
    #[arg(long)]
    worker_encoding: Option<String>,
    /// Directory for exported tables
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Budget brand to include in the crosstab; repeat for several
    #[arg(long = "brand")]
    brands: Vec<String>,
    #[arg(long, requires = "max_score")]
    min_score: Option<f64>,
    #[arg(long, requires = "min_score")]
    max_score: Option<f64>,
    /// Load and generate once, without the menu
    #[arg(long)]
    batch: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(p) = &self.shops {
            config.data.shops_path = p.clone();
        }
        if let Some(p) = &self.workers {
            config.data.workers_path = p.clone();
        }
        if let Some(e) = &self.worker_encoding {
            config.data.worker_encoding = e.clone();
        }
        if let Some(p) = &self.out_dir {
            config.report.out_dir = p.clone();
        }
    }
}

fn report_error(e: &PipelineError) {
    error!(error = %e, "pass failed");
    println!("An error occurred: {}", e);
    if e.is_data_load() {
        println!("Check that the data files are in place and the worker file is cp949 encoded.");
    }
    println!();
}

/// Print `label` and read one trimmed line. `None` once input is closed.
fn prompt<R: BufRead>(input: &mut R, label: &str) -> Option<String> {
    print!("{}", label);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn handle_load(session: &mut Session) -> bool {
    match session.load() {
        Ok(report) => {
            println!(
                "Processing dataset... ({} shop rows, {} worker rows loaded)",
                format_int(report.shop_rows),
                format_int(report.worker_rows)
            );
            println!(
                "Note: {} shops have no district and are left out of district tables; {} worker districts kept after removing totals and unparseable counts.",
                format_int(report.shops_without_district),
                format_int(report.worker_records)
            );
            println!(
                "Info: {} districts joined, {} budget brand shops.\n",
                format_int(report.districts),
                format_int(report.budget_brand_shops)
            );
            true
        }
        Err(e) => {
            report_error(&e);
            false
        }
    }
}

fn handle_generate(session: &mut Session) -> bool {
    let result = session
        .generate()
        .and_then(|dash| output::render(&dash, &session.config.report));
    match result {
        Ok(()) => true,
        Err(e) => {
            report_error(&e);
            false
        }
    }
}

fn handle_select_brands<R: BufRead>(session: &mut Session, input: &mut R) -> Option<()> {
    println!("Available: {}", session.config.brand_names().join(", "));
    println!("Current:   {}", session.filters().selected_brands.join(", "));
    let line = prompt(input, "Brands (comma separated, empty for all): ")?;
    let names: Vec<String> = line
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if let Err(e) = session.select_brands(&names) {
        report_error(&e);
    }
    Some(())
}

fn handle_score_range<R: BufRead>(session: &mut Session, input: &mut R) -> Option<()> {
    let line = prompt(input, "Site score range as 'min max' (empty for full range): ")?;
    if line.is_empty() {
        session.set_score_range(None);
        return Some(());
    }
    let parts: Vec<Option<f64>> = line
        .split_whitespace()
        .map(|p| p.parse::<f64>().ok())
        .collect();
    match parts.as_slice() {
        [Some(lo), Some(hi)] => {
            session.set_score_range(Some((*lo, *hi)));
            println!(
                "Range set to {} ~ {}\n",
                format_number(*lo, 2),
                format_number(*hi, 2)
            );
        }
        _ => println!("Invalid range. Enter two numbers, e.g. 100 2500.\n"),
    }
    Some(())
}

/// Menu loop; returns when the user exits or input reaches end of file.
fn run_menu<R: BufRead>(session: &mut Session, input: &mut R) {
    loop {
        println!("Cafe Site Report:");
        println!("[1] Load the files");
        println!("[2] Generate Reports");
        println!("[3] Select Brands");
        println!("[4] Set Site Score Range");
        println!("[5] Reload Files");
        println!("[6] Exit\n");
        let Some(choice) = prompt(input, "Enter choice: ") else {
            println!("\nInput closed. Exiting the program.");
            break;
        };
        match choice.as_str() {
            "1" => {
                handle_load(session);
            }
            "2" => {
                println!();
                if !session.is_loaded() && !handle_load(session) {
                    continue;
                }
                handle_generate(session);
            }
            "3" => {
                if handle_select_brands(session, input).is_none() {
                    break;
                }
            }
            "4" => {
                if handle_score_range(session, input).is_none() {
                    break;
                }
            }
            "5" => {
                session.reload();
                println!("Cache cleared; files will be read on the next load.\n");
            }
            "6" => {
                println!("Exiting the program.");
                break;
            }
            _ => println!("Invalid choice. Please enter 1-6.\n"),
        }
    }
}

fn main() -> ExitCode {
    logging::init_logging();
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&e);
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);

    let mut session = Session::new(config);
    if let Err(e) = session.select_brands(&cli.brands) {
        report_error(&e);
        return ExitCode::FAILURE;
    }
    if let (Some(lo), Some(hi)) = (cli.min_score, cli.max_score) {
        session.set_score_range(Some((lo, hi)));
    }

    if cli.batch {
        let ok = handle_load(&mut session) && handle_generate(&mut session);
        return if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }
    run_menu(&mut session, &mut io::stdin().lock());
    ExitCode::SUCCESS
}
