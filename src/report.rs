//! Result envelopes.
//!
//! Turns a [`ReconciliationResult`] into the mapping handed back to the
//! caller. Secrets are never part of `before` and only appear in `after`
//! for the run that created the resource, since that is the only time the
//! provider returns them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::planner::Transition;
use crate::reconciler::ReconciliationResult;
use crate::resources::{schema_of, Kind, KindSchema, RemoteResource};

/// Placeholder written over secrets in logged envelopes.
pub const REDACTED: &str = "***";

/// Builds result envelopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultReporter;

impl ResultReporter {
    /// Creates a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds the envelope of one reconciliation.
    ///
    /// `{changed, failed, msg?, error_class?, <kind>: {...}, diff: {before, after}, changes}`
    #[must_use]
    pub fn report(&self, result: &ReconciliationResult) -> Value {
        let schema = schema_of(result.kind);
        let reveal = result.transition == Transition::Create && !result.dry_run;

        let before = result.before.as_ref().map(|r| visible(schema, r, false));
        let after = result.after.as_ref().map(|r| visible(schema, r, reveal));

        let mut resource = after.clone().unwrap_or_else(|| result.identity.clone());
        let state = match (&result.after, resource.get("status").and_then(Value::as_str)) {
            (None, _) => Value::from("absent"),
            (Some(_), Some(status)) if result.kind == Kind::Server => Value::from(status),
            (Some(_), _) => Value::from("present"),
        };
        resource.insert(String::from("state"), state);

        let mut envelope = Map::new();
        envelope.insert(String::from("changed"), Value::Bool(result.changed));
        envelope.insert(String::from("failed"), Value::Bool(result.failed()));
        if let Some(error) = &result.error {
            envelope.insert(String::from("msg"), Value::from(error.message.clone()));
            envelope.insert(String::from("error_class"), Value::from(error.class));
        }
        envelope.insert(result.kind.as_str().to_string(), Value::Object(resource));
        envelope.insert(
            String::from("diff"),
            serde_json::json!({
                "before": before.map_or(Value::Null, Value::Object),
                "after": after.map_or(Value::Null, Value::Object),
            }),
        );
        envelope.insert(
            String::from("changes"),
            serde_json::to_value(&result.changes).unwrap_or(Value::Null),
        );
        Value::Object(envelope)
    }

    /// Returns a copy of an envelope fit for logs, with every secret masked.
    #[must_use]
    pub fn redacted(&self, kind: Kind, envelope: &Value) -> Value {
        let schema = schema_of(kind);
        let mut envelope = envelope.clone();
        mask(schema, envelope.get_mut(kind.as_str()));
        if let Some(diff) = envelope.get_mut("diff") {
            mask(schema, diff.get_mut("before"));
            mask(schema, diff.get_mut("after"));
        }
        envelope
    }
}

/// Returns a copy of a raw API body with the secret fields of every kind
/// masked, at any depth.
#[must_use]
pub fn redact_body(body: &Value) -> Value {
    let mut body = body.clone();
    mask_nested(&mut body);
    body
}

fn mask_nested(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                if is_secret_key(key) {
                    *item = Value::from(REDACTED);
                } else {
                    mask_nested(item);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_nested),
        _ => {}
    }
}

fn is_secret_key(key: &str) -> bool {
    Kind::ALL
        .into_iter()
        .any(|kind| schema_of(kind).is_secret(key))
}

fn visible(schema: &KindSchema, remote: &RemoteResource, reveal: bool) -> Map<String, Value> {
    let mut attributes = remote.attributes().clone();
    if !reveal {
        for key in schema.secret_fields {
            attributes.remove(*key);
        }
    }
    attributes
}

fn mask(schema: &KindSchema, value: Option<&mut Value>) {
    let Some(Value::Object(map)) = value else {
        return;
    };
    for key in schema.secret_fields {
        if let Some(secret) = map.get_mut(*key) {
            *secret = Value::from(REDACTED);
        }
    }
}

/// Totals of a multi-resource run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether the run was a dry run.
    pub dry_run: bool,
    /// Resources created.
    pub created: usize,
    /// Resources updated.
    pub updated: usize,
    /// Resources deleted.
    pub deleted: usize,
    /// Resources left unchanged.
    pub unchanged: usize,
    /// Resources that failed.
    pub failed: usize,
    /// Resources whose remote state changed, failed ones included.
    pub changed_resources: usize,
}

impl RunSummary {
    /// Starts a new summary.
    #[must_use]
    pub fn start(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            created: 0,
            updated: 0,
            deleted: 0,
            unchanged: 0,
            failed: 0,
            changed_resources: 0,
        }
    }

    /// Counts one result.
    pub fn record(&mut self, result: &ReconciliationResult) {
        if result.changed {
            self.changed_resources += 1;
        }
        if result.failed() {
            self.failed += 1;
            return;
        }
        match result.transition {
            Transition::Create => self.created += 1,
            Transition::Update => self.updated += 1,
            Transition::Delete => self.deleted += 1,
            Transition::Noop => self.unchanged += 1,
        }
    }

    /// Marks the run finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Returns true if any resource changed.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.changed_resources > 0
    }

    /// Returns true if every resource succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success() { "successful" } else { "failed" };
        let mode = if self.dry_run { " (check mode)" } else { "" };
        writeln!(f, "Run {status}{mode}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;
        writeln!(f, "  Changed: {}", self.changed_resources)?;
        write!(f, "  Failed: {}", self.failed)
    }
}
