//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde_json::Value;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::planner::Transition;
use crate::reconciler::ReconciliationResult;
use crate::report::{ResultReporter, RunSummary};
use crate::resources::{KindSchema, Registry};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
    /// Envelope builder.
    reporter: ResultReporter,
}

/// Plan row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Changes")]
    changes: String,
}

/// Kind row for table display.
#[derive(Tabled)]
struct KindRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Updatable")]
    updatable: String,
    #[tabled(rename = "Create-only")]
    create_only: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self {
            format,
            reporter: ResultReporter::new(),
        }
    }

    /// Returns the output format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats the dry-run results of a manifest.
    #[must_use]
    pub fn format_plan(&self, results: &[ReconciliationResult], detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let envelopes: Vec<Value> = results.iter().map(|r| self.logged_envelope(r)).collect();
                serde_json::to_string_pretty(&envelopes).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(results, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(results: &[ReconciliationResult], detailed: bool) -> String {
        let pending = results.iter().filter(|r| r.changed || r.failed()).count();
        if pending == 0 {
            return format!(
                "{} No changes required - infrastructure is up to date.\n",
                "✓".green()
            );
        }

        let mut output = String::from("\nPlan\n\n");

        let rows: Vec<PlanRow> = results
            .iter()
            .enumerate()
            .map(|(i, r)| PlanRow {
                index: i + 1,
                action: Self::format_transition(r),
                kind: r.kind.to_string(),
                resource: Self::truncate(&resource_label(r), 40),
                changes: if r.changes.is_empty() {
                    String::new()
                } else {
                    r.changes.iter().map(|c| c.field).collect::<Vec<_>>().join(", ")
                },
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for result in results.iter().filter(|r| !r.changes.is_empty()) {
                let _ = writeln!(output, "\n{} {}:", result.kind, resource_label(result));
                for change in &result.changes {
                    let _ = writeln!(
                        output,
                        "   {} {}: {} -> {}",
                        "~".yellow(),
                        change.field,
                        change.old,
                        change.new
                    );
                }
            }
        }

        let count = |t: Transition| results.iter().filter(|r| r.transition == t && r.changed).count();
        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to destroy\n",
            count(Transition::Create).to_string().green(),
            count(Transition::Update).to_string().yellow(),
            count(Transition::Delete).to_string().red()
        );

        for failed in results.iter().filter(|r| r.failed()) {
            if let Some(error) = &failed.error {
                let _ = writeln!(
                    output,
                    "{} {} {}: {}",
                    "✗".red(),
                    failed.kind,
                    resource_label(failed),
                    error.message
                );
            }
        }

        output
    }

    /// Formats the result of one reconciliation.
    ///
    /// JSON output is the full envelope, secrets included when the provider
    /// generated them on creation.
    #[must_use]
    pub fn format_result(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&self.reporter.report(result)).unwrap_or_default()
            }
            OutputFormat::Text => {
                let label = format!("{} {}", result.kind, resource_label(result));
                match &result.error {
                    Some(error) => format!("{} {label}: {}", "✗".red(), error.message),
                    None if result.changed => {
                        format!("{} {label}", Self::format_transition(result))
                    }
                    None => format!("{} {label}", "ok".dimmed()),
                }
            }
        }
    }

    /// Returns the envelope of a result with secrets masked, for logs.
    #[must_use]
    pub fn logged_envelope(&self, result: &ReconciliationResult) -> Value {
        self.reporter
            .redacted(result.kind, &self.reporter.report(result))
    }

    /// Formats the totals of a run.
    #[must_use]
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if summary.success() {
                    format!("{} {summary}", "✓".green())
                } else {
                    format!("{} {summary}", "✗".red())
                };
                format!("\n{status}\n")
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.errors.is_empty(),
                    "resources": result.resources.len(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.errors.is_empty() {
                    let _ = writeln!(
                        output,
                        "{} Manifest is valid ({} resource(s))",
                        "✓".green(),
                        result.resources.len()
                    );
                } else {
                    let _ = writeln!(output, "{} Manifest is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }
                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats the registered kinds.
    #[must_use]
    pub fn format_kinds(&self, registry: &Registry) -> String {
        let schemas = registry
            .kinds()
            .filter_map(|kind| registry.handler(kind).ok())
            .map(|handler| handler.schema());

        match self.format {
            OutputFormat::Json => {
                let kinds: Vec<Value> = schemas
                    .map(|schema| {
                        serde_json::json!({
                            "kind": schema.kind,
                            "path": schema.path,
                            "fields": schema.fields.iter().map(|f| f.name).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                serde_json::to_string_pretty(&kinds).unwrap_or_default()
            }
            OutputFormat::Text => {
                let fields = |schema: &KindSchema, compared: bool| {
                    schema
                        .fields
                        .iter()
                        .filter(|f| f.is_compared() == compared)
                        .map(|f| f.name)
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let rows: Vec<KindRow> = schemas
                    .map(|schema| KindRow {
                        kind: schema.kind.to_string(),
                        path: schema.path.to_string(),
                        updatable: fields(schema, true),
                        create_only: fields(schema, false),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats an inventory document; always JSON, as inventory consumers expect.
    #[must_use]
    pub fn format_inventory(&self, inventory: &Value) -> String {
        serde_json::to_string_pretty(inventory).unwrap_or_default()
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "changed": false, "failed": true, "msg": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "✗".red()),
        }
    }

    /// Formats a transition with color.
    fn format_transition(result: &ReconciliationResult) -> String {
        let label = format!("{}{}", result.transition.symbol(), result.transition);
        match result.transition {
            Transition::Create => label.green().to_string(),
            Transition::Update => label.yellow().to_string(),
            Transition::Delete => label.red().to_string(),
            Transition::Noop => label.dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum length.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

/// Name or identifier shown for a result.
fn resource_label(result: &ReconciliationResult) -> String {
    let schema = crate::resources::schema_of(result.kind);
    let remote = result.after.as_ref().or(result.before.as_ref());

    schema
        .name_key
        .and_then(|key| {
            remote
                .and_then(|r| r.get_str(key))
                .or_else(|| result.identity.get(key).and_then(Value::as_str))
        })
        .or_else(|| remote.and_then(|r| r.id()))
        .or_else(|| result.identity.get(schema.id_key).and_then(Value::as_str))
        .map_or_else(|| String::from("(new)"), String::from)
}
