use crate::core::types::OutputFormat;
use crate::error::Result;
use colored::*;
use comfy_table::Table;
use serde::Serialize;

/// Prints command results in the format chosen on the command line.
pub struct OutputFormatter {
    format: OutputFormat,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            quiet: false,
        }
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Render `items` without printing them.
    pub fn format<T>(&self, items: &[T]) -> Result<String>
    where
        T: TableFormat + PlainFormat + Serialize,
    {
        Ok(match self.format {
            OutputFormat::Table => table(items),
            OutputFormat::Json => serde_json::to_string_pretty(items)?,
            OutputFormat::Plain => items
                .iter()
                .map(PlainFormat::plain)
                .collect::<Vec<_>>()
                .join("\n"),
        })
    }

    pub fn render<T>(&self, items: &[T]) -> Result<()>
    where
        T: TableFormat + PlainFormat + Serialize,
    {
        if !self.quiet {
            println!("{}", self.format(items)?);
        }
        Ok(())
    }

    /// Report a failure on stderr. Never silenced.
    pub fn error(msg: &str) {
        eprintln!("{}", msg.bright_red());
    }
}

fn table<T: TableFormat>(items: &[T]) -> String {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(T::headers());
    for item in items {
        table.add_row(item.row());
    }
    table.to_string()
}

/// Trait for types that can be formatted as a table
pub trait TableFormat {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Trait for types that can be formatted as plain text
pub trait PlainFormat {
    fn plain(&self) -> String;
}

pub mod file;

pub use file::{format_size, EntryInfo, StatInfo, TransferInfo};
