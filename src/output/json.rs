//! JSON output formatting

use crate::output::formatter::ReportData;
use serde_json::{json, Value};

pub fn format_json(data: &ReportData) -> String {
    let value: Value = match data {
        ReportData::Check(report) => serde_json::to_value(report).unwrap_or(json!(null)),
        ReportData::Classification(c) => serde_json::to_value(c).unwrap_or(json!(null)),
        ReportData::Cleanup(report) => serde_json::to_value(report).unwrap_or(json!(null)),
        ReportData::Config(config) => serde_json::to_value(config).unwrap_or(json!(null)),
        ReportData::Tick(report) => serde_json::to_value(report).unwrap_or(json!(null)),
        ReportData::Summary(summary) => serde_json::to_value(summary).unwrap_or(json!(null)),
    };

    // One tick per line so `run --json` output can be streamed
    if matches!(data, ReportData::Tick(_)) {
        return serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string());
    }
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
}
