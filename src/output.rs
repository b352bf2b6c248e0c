use std::io::{self, Write};

use serde::Serialize;

use crate::app::AcquireResult;
use crate::domain::DatasetEntry;
use crate::loader::LoadedTable;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_acquire(result: &AcquireResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_datasets(datasets: &[DatasetEntry]) -> io::Result<()> {
        Self::print_json(&datasets)
    }

    pub fn print_value(value: &serde_json::Value) -> io::Result<()> {
        Self::print_json(value)
    }

    /// Table summary plus preview rows, without dumping the whole table.
    pub fn print_table(loaded: &LoadedTable, preview_rows: usize) -> io::Result<()> {
        let preview = serde_json::json!({
            "strategy": loaded.strategy.describe(),
            "rows": loaded.table.row_count(),
            "columns": loaded.table.columns,
            "types": loaded.table.types,
            "head": loaded.table.head(preview_rows),
        });
        Self::print_json(&preview)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}
