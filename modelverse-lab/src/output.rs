//! Output formatting for the CLI

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use indicatif::{ProgressBar, ProgressStyle};
use modelverse_core::{Metrics, ResultArtifact, Task, TaskStatus};
use serde::Serialize;
use std::time::Duration;

/// Resolution of the progress bar; task progress is a fraction.
pub const PROGRESS_TICKS: u64 = 1000;

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tables and colored status lines
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("{} {}", "✓".green(), message);
        }
    }

    pub fn error(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("{} {}", "✗".red(), message);
        } else {
            eprintln!("Error: {}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("{} {}", "⚠".yellow(), message);
        }
    }

    pub fn info(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("{} {}", "ℹ".blue(), message);
        }
    }

    /// Spinner for waits of unknown length. `None` outside table output.
    pub fn spinner(&self, message: &str) -> Result<Option<ProgressBar>> {
        if self.format != OutputFormat::Table {
            return Ok(None);
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Ok(Some(pb))
    }

    /// Bar driven by task progress in `[0, 1]`, see [`progress_position`].
    pub fn progress_bar(&self, message: &str) -> Result<Option<ProgressBar>> {
        if self.format != OutputFormat::Table {
            return Ok(None);
        }
        let pb = ProgressBar::new(PROGRESS_TICKS);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {elapsed_precise} {msg}")?
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(200));
        Ok(Some(pb))
    }
}

pub fn progress_position(progress: f64) -> u64 {
    (progress.clamp(0.0, 1.0) * PROGRESS_TICKS as f64).round() as u64
}

fn styled_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn header(cells: &[&str]) -> Vec<Cell> {
    cells.iter().map(|h| Cell::new(h).fg(Color::Cyan)).collect()
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Status badge with color
pub fn status_badge(status: TaskStatus) -> String {
    let label = status.to_string();
    match status {
        TaskStatus::Running | TaskStatus::Starting => label.blue().to_string(),
        TaskStatus::Completed => label.green().to_string(),
        TaskStatus::Failed => label.red().to_string(),
        TaskStatus::Pending => label.yellow().to_string(),
        TaskStatus::Stopped => label.dimmed().to_string(),
    }
}

/// Print a key-value pair in detail format
pub fn print_field(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

pub fn print_optional_field(key: &str, value: Option<&str>) {
    if let Some(v) = value {
        print_field(key, v);
    }
}

pub fn print_section(title: &str) {
    println!("\n{}", title.bold().underline());
}

pub fn print_task(task: &Task) {
    print_section(&task.name);
    print_field("ID", &task.id.to_string());
    print_field("Status", &status_badge(task.status));
    print_field("Progress", &format_percent(task.progress));
    print_optional_field("Port", task.port.map(|p| p.to_string()).as_deref());
    print_optional_field("PID", task.pid.map(|p| p.to_string()).as_deref());
    print_optional_field("API", task.api_base.as_deref());
    print_optional_field(
        "Results",
        task.result_path.as_ref().map(|p| p.display().to_string()).as_deref(),
    );
    print_optional_field("Error", task.error_message.as_deref());
    if let Some(seconds) = task.duration_seconds() {
        print_field("Duration", &format!("{seconds}s"));
    }
}

/// Per-subject breakdown followed by the totals row.
pub fn results_table(artifact: &ResultArtifact) -> Table {
    let mut table = styled_table();
    table.set_header(header(&["Subject", "Correct", "Total", "Accuracy", "Unknown"]));

    for (subject, result) in &artifact.subject_results {
        table.add_row(vec![
            Cell::new(subject),
            Cell::new(result.correct),
            Cell::new(result.total),
            Cell::new(format_percent(result.accuracy)),
            Cell::new(result.unknown_count),
        ]);
    }
    table.add_row(vec![
        Cell::new("overall").fg(Color::Green),
        Cell::new(artifact.total_correct),
        Cell::new(artifact.total_questions),
        Cell::new(format_percent(artifact.overall_accuracy)).fg(Color::Green),
        Cell::new(format_percent(artifact.unknown_rate)),
    ]);
    table
}

pub fn metrics_table(metrics: &Metrics) -> Table {
    let mut table = styled_table();
    table.set_header(header(&["Metric", "Value"]));

    let named = [
        ("accuracy", metrics.accuracy),
        ("overall_accuracy", metrics.overall_accuracy),
        ("average_accuracy", metrics.average_accuracy),
        ("f1_score", metrics.f1_score),
        ("precision", metrics.precision),
        ("recall", metrics.recall),
        ("perplexity", metrics.perplexity),
        ("bleu", metrics.bleu),
        ("rouge", metrics.rouge),
        ("exact_match", metrics.exact_match),
    ];
    for (name, value) in named {
        if let Some(value) = value {
            table.add_row(vec![Cell::new(name), Cell::new(format!("{value:.4}"))]);
        }
    }
    for (name, value) in &metrics.custom_metrics {
        table.add_row(vec![Cell::new(name).fg(Color::DarkGrey), Cell::new(format!("{value:.4}"))]);
    }
    table
}
