//! Site-score report for coffee shops: joins shop listings with per-district
//! worker statistics and derives workers-per-shop rankings.
pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod reports;
pub mod session;
pub mod types;
pub mod util;

pub use error::{PipelineError, Result};
