//! Output formatting utilities

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::core::WarningLog;

/// Determine the effective output format based on context
pub fn effective_format(format: OutputFormat, is_list: bool) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if is_list {
                OutputFormat::Tsv
            } else {
                OutputFormat::Yaml
            }
        }
        other => other,
    }
}

/// Print a value as JSON or YAML
///
/// Returns `false` for the text formats so the caller can render its own view.
pub fn print_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).into_diagnostic()?;
            println!("{}", json);
            Ok(true)
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(value).into_diagnostic()?;
            print!("{}", yaml);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Print warnings, capped at `limit` with an "...and K more" line
pub fn print_warnings(warnings: &WarningLog, limit: usize) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!(
        "{} {} warning(s):",
        style("!").yellow(),
        style(warnings.len()).yellow()
    );
    for line in warnings.summary(limit) {
        println!("  {}", line);
    }
}
