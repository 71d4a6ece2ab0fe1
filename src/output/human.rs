//! Human-readable output formatting

use bytesize::ByteSize;
use chrono::Local;

use crate::config::{format_duration, Config};
use crate::janitor::CleanupReport;
use crate::monitor::{
    CheckReport, Classification, CleanupOutcome, LineClass, SchedulerSummary, TickEvent,
    TickReport, VerdictReason,
};
use crate::output::formatter::ReportData;

pub fn format_human(data: &ReportData) -> String {
    match data {
        ReportData::Check(report) => format_check(report),
        ReportData::Classification(c) => format_classification(c),
        ReportData::Cleanup(report) => format_cleanup(report),
        ReportData::Config(config) => format_config(config),
        ReportData::Tick(report) => format_tick(report),
        ReportData::Summary(summary) => format_summary(summary),
    }
}

fn format_check(report: &CheckReport) -> String {
    let mut output = String::from("Container Check\n---------------\n");
    output.push_str(&format!("Container: {}\n", report.container));
    if let Some(ref handle) = report.handle {
        output.push_str(&format!("Id:        {}\n", truncate(&handle.id, 12)));
    }
    match report.status {
        Some(status) => output.push_str(&format!("Status:    {}\n", status)),
        None => output.push_str("Status:    unknown\n"),
    }
    if let Some(window) = report.window {
        output.push_str(&format!(
            "Window:    {} .. {} ({} lines)\n",
            window.since.with_timezone(&Local).format("%H:%M:%S"),
            window.until.with_timezone(&Local).format("%H:%M:%S"),
            report.lines
        ));
    }
    if let Some(ref verdict) = report.verdict {
        output.push_str(&format!(
            "Verdict:   {} ({})\n",
            verdict.verdict,
            describe_reason(&verdict.reason)
        ));
    }
    if let Some(ref error) = report.error {
        output.push_str(&format!("Error:     {}\n", error));
    }
    output
}

fn format_classification(c: &Classification) -> String {
    let mut output = String::new();
    for line in &c.lines {
        let tag = match line.class {
            LineClass::RealWork => "WORK",
            LineClass::Idle => "IDLE",
            LineClass::Unrecognized => "????",
        };
        output.push_str(&format!("[{}] {}\n", tag, truncate(&line.line, 120)));
    }
    if !c.lines.is_empty() {
        output.push_str(&"-".repeat(40));
        output.push('\n');
    }
    output.push_str(&format!(
        "Verdict: {} ({})",
        c.verdict.verdict,
        describe_reason(&c.verdict.reason)
    ));
    output
}

fn format_cleanup(report: &CleanupReport) -> String {
    let mut output = format!(
        "Cache Cleanup{}\n-------------\nTarget:  {}\n",
        if report.dry_run { " (dry run)" } else { "" },
        report.target.display()
    );
    output.push_str(&format!(
        "{}: {} entries, {}\n",
        if report.dry_run { "Would free" } else { "Freed" },
        report.removed,
        ByteSize(report.bytes_freed)
    ));
    for detail in &report.details {
        output.push_str(&format!("  {}\n", detail));
    }
    output
}

fn format_config(config: &Config) -> String {
    let mut output = String::from("Configuration\n-------------\n");
    output.push_str(&format!("Container:      {}\n", config.container_name));
    output.push_str(&format!(
        "Threshold:      {}\n",
        format_duration(config.inactivity_threshold)
    ));
    output.push_str(&format!(
        "Poll interval:  {}\n",
        format_duration(config.poll_interval)
    ));
    output.push_str(&format!(
        "Cache target:   {}\n",
        config
            .cache_target
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    ));
    output.push_str(&format!(
        "Docker host:    {}\n",
        config.runtime.host.as_deref().unwrap_or("(local default)")
    ));
    output.push_str(&format!(
        "Call timeout:   {}\n",
        format_duration(config.runtime.timeout)
    ));
    output.push_str(&format!("Log tail:       {}\n", config.runtime.log_tail));
    output.push_str("Activity signatures:\n");
    for sig in &config.activity_signatures {
        output.push_str(&format!("  {}\n", sig));
    }
    output.push_str("Idle signatures:\n");
    for sig in &config.idle_signatures {
        output.push_str(&format!("  {}\n", sig));
    }
    output
}

fn format_tick(report: &TickReport) -> String {
    let time = report.at.with_timezone(&Local).format("%H:%M:%S");
    let what = match &report.event {
        TickEvent::Activity { verdict } => {
            format!("activity ({})", describe_reason(&verdict.reason))
        }
        TickEvent::Inactive { quiet_for_secs, .. } => {
            format!("inactive for {}s", quiet_for_secs)
        }
        TickEvent::ContainerDown => "container not running".to_string(),
        TickEvent::Stopped {
            quiet_for_secs,
            cleanup,
        } => {
            let cleanup = match cleanup {
                CleanupOutcome::Succeeded { report } => {
                    format!("freed {}", ByteSize(report.bytes_freed))
                }
                CleanupOutcome::Failed { error } => format!("cleanup failed: {}", error),
                CleanupOutcome::Skipped => "no cleanup".to_string(),
            };
            format!("stopped after {}s idle, {}", quiet_for_secs, cleanup)
        }
        TickEvent::AwaitingRestart => "waiting for restart".to_string(),
        TickEvent::RestartDetected => "restart detected".to_string(),
        TickEvent::TransientError { message } => format!("runtime error: {}", message),
        TickEvent::ContainerMissing => "container missing".to_string(),
    };
    format!("[{}] {:<20} {}", time, report.phase.to_string(), what)
}

fn format_summary(summary: &SchedulerSummary) -> String {
    format!("Monitor finished after {} ticks ({:?})", summary.ticks, summary.exit)
}

fn describe_reason(reason: &VerdictReason) -> String {
    match reason {
        VerdictReason::RealWork { line } => format!("work: {}", truncate(line, 60)),
        VerdictReason::Unrecognized { lines } => format!("{} unrecognized lines", lines),
        VerdictReason::Empty => "no output".to_string(),
        VerdictReason::IdleOnly { idle_lines } => format!("{} idle lines", idle_lines),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
