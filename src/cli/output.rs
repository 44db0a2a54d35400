//! Output formatting for CLI commands.
//!
//! Every formatter returns a string; `main` decides where it goes. Text
//! output uses tables and colors, JSON output serializes the report as is.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ResolvedConfig;
use crate::engine::PullOutcome;
use crate::error::Result;
use crate::orchestrator::{
    CleanCategory, CleanReport, DoctorReport, HealthSummary, StartReport, StatusReport, StopAction, StopReport,
};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Service row of `status`.
#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Service")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Ports")]
    ports: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "Variant")]
    variant: String,
    #[tabled(rename = "URL")]
    url: String,
}

/// Service row of `start`.
#[derive(Tabled)]
struct StartRow {
    #[tabled(rename = "Service")]
    name: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "URL")]
    url: String,
}

/// Tool row of `doctor`.
#[derive(Tabled)]
struct ToolRow {
    #[tabled(rename = "Tool")]
    name: String,
    #[tabled(rename = "Required")]
    required: String,
    #[tabled(rename = "Location")]
    location: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns whether JSON is requested.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    fn json<T: Serialize>(value: &T) -> String {
        let mut output = serde_json::to_string_pretty(value).unwrap_or_default();
        output.push('\n');
        output
    }

    /// Formats the result of `start`.
    #[must_use]
    pub fn format_start(&self, report: &StartReport) -> String {
        if self.is_json() {
            return Self::json(report);
        }

        let mut output = String::new();
        for decision in &report.decisions {
            let _ = writeln!(output, "{} {decision}", "•".cyan());
        }
        for pull in &report.pulls {
            let outcome = match &pull.outcome {
                PullOutcome::Pulled => "pulled".green().to_string(),
                PullOutcome::AlreadyPresent => "present".dimmed().to_string(),
                other => other.to_string().red().to_string(),
            };
            let _ = writeln!(output, "  {} {outcome}", pull.job.image);
        }

        let rows: Vec<StartRow> = report
            .services
            .iter()
            .map(|run| StartRow {
                name: run.name.clone(),
                action: run.action.as_ref().map_or_else(|| String::from("-"), ToString::to_string),
                result: run.failure.as_ref().map_or_else(
                    || {
                        run.launch
                            .map_or_else(|| String::from("ready"), |l| l.to_string())
                            .green()
                            .to_string()
                    },
                    |failure| failure.to_string().red().to_string(),
                ),
                url: run.url.clone().unwrap_or_default(),
            })
            .collect();
        if !rows.is_empty() {
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let failed = report.failed().count();
        if failed == 0 {
            let _ = writeln!(output, "\n{} {} service(s) ready", "✓".green(), report.services.len());
        } else {
            let _ = writeln!(
                output,
                "\n{} {} ready, {} failed",
                "⚠".yellow(),
                report.succeeded().count(),
                failed.to_string().red()
            );
        }
        if report.cancelled {
            let _ = writeln!(output, "{} Interrupted", "⚠".yellow());
        }
        output
    }

    /// Formats the result of `stop`.
    #[must_use]
    pub fn format_stop(&self, report: &StopReport) -> String {
        if self.is_json() {
            return Self::json(report);
        }
        if report.aborted {
            return format!("{} Aborted; nothing was changed.\n", "⚠".yellow());
        }

        let mut output = String::new();
        for record in &report.services {
            let line = match (&record.action, &record.error) {
                (_, Some(error)) => format!("{} {}: {}", "✗".red(), record.name, error),
                (Some(StopAction::Missing), None) => {
                    format!("{} {}: {}", "-".dimmed(), record.name, StopAction::Missing)
                }
                (Some(action), None) => format!("{} {}: {action}", "✓".green(), record.name),
                (None, None) => format!("{} {}", "-".dimmed(), record.name),
            };
            let _ = writeln!(output, "{line}");
        }
        output
    }

    /// Formats the result of `status`.
    #[must_use]
    pub fn format_status(&self, report: &StatusReport) -> String {
        if self.is_json() {
            return Self::json(report);
        }

        let mut output = String::new();
        let network = if report.network_exists {
            "present".green().to_string()
        } else {
            "missing".red().to_string()
        };
        let _ = writeln!(output, "Network {}: {network}\n", report.network);

        let rows: Vec<StatusRow> = report
            .services
            .iter()
            .map(|service| {
                let mut status = match &service.health {
                    HealthSummary::Healthy => "healthy".green().to_string(),
                    HealthSummary::Unhealthy(detail) => format!("unhealthy ({detail})").red().to_string(),
                    HealthSummary::Unchecked => "running".green().to_string(),
                    HealthSummary::Down => service
                        .container_state
                        .map_or_else(|| String::from("absent"), |s| s.to_string())
                        .dimmed()
                        .to_string(),
                };
                if service.outdated {
                    let _ = write!(status, " {}", "(outdated)".yellow());
                }
                StatusRow {
                    name: service.name.clone(),
                    status,
                    ports: service
                        .ports
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                    uptime: service.uptime_secs.map(format_uptime).unwrap_or_default(),
                    variant: service.variant.clone(),
                    url: service.url.clone().unwrap_or_default(),
                }
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');
        output
    }

    /// Formats the result of `clean`.
    #[must_use]
    pub fn format_clean(&self, report: &CleanReport) -> String {
        if self.is_json() {
            return Self::json(report);
        }
        if report.plan.is_empty() {
            return format!("{} Nothing to clean.\n", "✓".green());
        }

        let mut output = String::new();
        if report.dry_run {
            output.push_str("Would remove:\n");
            for category in [
                CleanCategory::Pods,
                CleanCategory::Volumes,
                CleanCategory::Images,
                CleanCategory::Network,
                CleanCategory::Configs,
            ] {
                for item in report.plan.items(category) {
                    let _ = writeln!(output, "   {category}: {item}");
                }
            }
            return output;
        }

        for record in &report.removed {
            match &record.error {
                None => {
                    let _ = writeln!(output, "{} {} {}", "✓".green(), record.category, record.name);
                }
                Some(error) => {
                    let _ = writeln!(output, "{} {} {}: {error}", "✗".red(), record.category, record.name);
                }
            }
        }
        for category in &report.declined {
            let _ = writeln!(output, "{} kept {category}", "-".dimmed());
        }
        if let Some(backup) = &report.backup {
            let _ = writeln!(output, "Backup written to {}", backup.display());
        }
        output
    }

    /// Formats the result of `doctor`.
    #[must_use]
    pub fn format_doctor(&self, report: &DoctorReport) -> String {
        if self.is_json() {
            return Self::json(report);
        }

        let mut output = String::new();
        let _ = writeln!(
            output,
            "Config: {}",
            report
                .config_path
                .as_ref()
                .map_or_else(|| String::from("built-in defaults"), |p| p.display().to_string())
        );
        let _ = writeln!(output, "State:  {}\n", report.state_root.display());

        let rows: Vec<ToolRow> = report
            .tools
            .iter()
            .map(|tool| ToolRow {
                name: tool.name.clone(),
                required: if tool.required { "yes" } else { "no" }.to_string(),
                location: match (&tool.path, tool.required) {
                    (Some(path), _) => path.display().to_string().green().to_string(),
                    (None, true) => "missing".red().to_string(),
                    (None, false) => "missing".yellow().to_string(),
                },
            })
            .collect();
        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        match &report.engine_status {
            Ok(version) => {
                let _ = writeln!(output, "\n{} {} {version}", "✓".green(), report.engine);
            }
            Err(e) => {
                let _ = writeln!(output, "\n{} {}: {e}", "✗".red(), report.engine);
            }
        }
        if let Some(problem) = &report.secret_problem {
            let _ = writeln!(output, "{} shared secret: {problem}", "✗".red());
        }
        for decision in &report.decisions {
            let _ = writeln!(output, "{} {decision}", "•".cyan());
        }
        output
    }

    /// Formats the resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn format_config(&self, config: &ResolvedConfig) -> Result<String> {
        if self.is_json() {
            return Ok(Self::json(&config.table));
        }
        config.to_toml()
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &format!("{} {message}", "✓".green()), message)
    }

    /// Formats an error message, with an optional remediation hint.
    #[must_use]
    pub fn error(&self, message: &str, hint: Option<&str>) -> String {
        if self.is_json() {
            return Self::json(&serde_json::json!({
                "status": "error",
                "message": message,
                "hint": hint,
            }));
        }
        let mut output = format!("{} {message}\n", "✗".red());
        if let Some(hint) = hint {
            let _ = writeln!(output, "  {} {hint}", "hint:".dimmed());
        }
        output
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &format!("{} {message}", "⚠".yellow()), message)
    }

    fn message(&self, status: &str, text: &str, message: &str) -> String {
        if self.is_json() {
            Self::json(&serde_json::json!({ "status": status, "message": message }))
        } else {
            format!("{text}\n")
        }
    }
}

/// Formats an uptime like `3d 4h`, `2h 5m` or `42s`.
fn format_uptime(secs: i64) -> String {
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3_600, (secs % 3_600) / 60);
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {}s", secs % 60)
    } else {
        format!("{secs}s")
    }
}
