//! Output formatters for evaluation reports

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::engine::EvaluationReport;
use crate::finding::Finding;
use std::str::FromStr;

/// Output formatter trait
pub trait OutputFormatter: Send + Sync {
    /// Format the entire evaluation report
    fn format(&self, report: &EvaluationReport) -> String;

    /// Format a single finding
    fn format_finding(&self, finding: &Finding) -> String;
}

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

impl OutputFormat {
    /// Build the formatter for this format
    pub fn formatter(self, colored: bool, show_traces: bool) -> Box<dyn OutputFormatter> {
        match self {
            OutputFormat::Text => {
                let mut formatter = TextFormatter::new();
                formatter.colored = colored;
                formatter.show_traces = show_traces;
                Box::new(formatter)
            }
            OutputFormat::Json => Box::new(JsonFormatter::new().pretty()),
        }
    }
}
