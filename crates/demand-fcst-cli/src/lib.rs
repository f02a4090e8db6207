//! Command-line boundary for the demand forecasting pipeline.
//!
//! Reads a CSV export into a raw batch, runs the core pipeline, and renders
//! the report as a sheet, a text document or JSON. All computation lives in
//! `demand_fcst_core`; this crate only translates between files and the
//! core's types.

pub mod error_handling;
pub mod input;
pub mod logging;
pub mod settings;
pub mod sinks;

pub use error_handling::{exit_code, run_guarded};
pub use input::{read_batch, read_batch_from_path, CsvOptions};
pub use settings::{load_config, Overrides};
pub use sinks::{write_document, write_json, write_report, write_sheet, OutputFormat};
