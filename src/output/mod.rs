//! Output formatting for CLI results

pub mod json;
pub mod table;

use serde::Serialize;

use crate::client::Record;
use crate::error::Result;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Table format - one row per record (default)
    #[default]
    Table,
    /// JSON format - structured for scripts
    Json,
}

/// Print a list of records
pub fn print_records(records: &[Record], format: OutputFormat, from_cache: bool) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", json::format_json_from(records, from_cache)?),
        OutputFormat::Table => println!("{}", table::format_records(records)),
    }
    Ok(())
}

/// Print a single value; tables show it as a one-row table when it is a record
pub fn print_value<T: Serialize>(value: &T, format: OutputFormat, from_cache: bool) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", json::format_json_from(value, from_cache)?),
        OutputFormat::Table => {
            let value = serde_json::to_value(value)?;
            if value.is_object() {
                println!("{}", table::format_records(std::slice::from_ref(&value)));
            } else {
                println!("{}", value);
            }
        }
    }
    Ok(())
}
