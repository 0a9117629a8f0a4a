//! Command implementations
//!
//! Each module corresponds to one or more `kgraph` subcommands.

pub mod build;
pub mod extract;
pub mod query;

use serde::Serialize;

pub use build::{run as build_run, BuildArgs, BuildSummary};
pub use extract::{run as extract_run, ExtractionReport};

/// How command results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        }
    }
}

/// Pretty-print any serializable result as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
