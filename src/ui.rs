use colored::{ColoredString, Colorize};
use dispatch::{DeviceOutcome, OutcomeStatus, OverallStatus, RunReport};
use std::time::Duration;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Run Reports
// ============================================================================

/// Colored marker for an outcome status
pub fn status_symbol(status: OutcomeStatus) -> ColoredString {
    match status {
        OutcomeStatus::Success | OutcomeStatus::DiffClean => "✓".green(),
        OutcomeStatus::DiffFound => "≠".yellow(),
        OutcomeStatus::Timeout => "⏱".yellow(),
        OutcomeStatus::Cancelled => "⊘".dimmed(),
        OutcomeStatus::Failed => "✗".red(),
    }
}

/// Compact duration for result lines
pub fn format_elapsed(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

/// One line per device
pub fn outcome_line(outcome: &DeviceOutcome) -> String {
    let mut line = format!(
        "{} {} {} {}",
        status_symbol(outcome.status),
        outcome.device_id.bold(),
        outcome.status.as_str().dimmed(),
        format!("({})", format_elapsed(outcome.elapsed)).dimmed()
    );
    if outcome.retry_count > 0 {
        let noun = if outcome.retry_count == 1 { "retry" } else { "retries" };
        line.push_str(&format!(" {}", format!("[{} {noun}]", outcome.retry_count).dimmed()));
    }
    if let Some(error) = &outcome.error {
        line.push_str(&format!(" - {error}"));
    }
    line
}

/// Print every outcome, then the totals
pub fn print_report(report: &RunReport, show_output: bool) {
    header(&format!("Run {} ({})", report.run_id, report.mode));
    for outcome in &report.outcomes {
        println!("  {}", outcome_line(outcome));
        for entry in &outcome.diff {
            if let Some(expected) = &entry.expected {
                println!("      {} {}", format!("{:>4} -", entry.line).red(), expected);
            }
            if let Some(actual) = &entry.actual {
                println!("      {} {}", format!("{:>4} +", entry.line).green(), actual);
            }
        }
        if show_output && !outcome.output.is_empty() {
            for line in outcome.output.lines() {
                println!("      {}", line.dimmed());
            }
            if outcome.output_truncated {
                dim("    … output truncated");
            }
        }
    }

    let counts = &report.counts;
    println!();
    let summary = format!(
        "{}/{} succeeded ({} failed, {} timeout, {} diff, {} cancelled) in {}",
        counts.succeeded(),
        counts.total,
        counts.failed,
        counts.timeout,
        counts.diff_found,
        counts.cancelled,
        format_elapsed(
            (report.finished_at - report.submitted_at)
                .to_std()
                .unwrap_or_default()
        )
    );
    match report.status {
        OverallStatus::AllSuccess => success(&summary),
        OverallStatus::PartialFailure => warn(&summary),
        OverallStatus::AllFailed => error(&summary),
    }
}
