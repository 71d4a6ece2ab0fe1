//! Output formatting

use crate::config::Config;
use crate::janitor::CleanupReport;
use crate::monitor::{CheckReport, Classification, SchedulerSummary, TickReport};
use crate::output::human::format_human;
use crate::output::json::format_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Anything a subcommand prints on stdout
#[derive(Debug, Clone)]
pub enum ReportData {
    Check(CheckReport),
    Classification(Classification),
    Cleanup(CleanupReport),
    Config(Config),
    Tick(TickReport),
    Summary(SchedulerSummary),
}

pub fn format_output(data: &ReportData, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Human => format_human(data),
        OutputFormat::Json => format_json(data),
    }
}
