//! Plan types for a single reconciliation.
//!
//! The reconciler decides a [`Transition`] per resource, then turns an update
//! into an ordered list of [`Step`]s that are executed one at a time.

use serde::Serialize;
use serde_json::Value;

use crate::api::HttpMethod;

/// Lifecycle transition chosen for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// The resource is created.
    Create,
    /// Specified fields are updated in place.
    Update,
    /// The resource is deleted.
    Delete,
    /// Nothing to do.
    Noop,
}

impl Transition {
    /// Returns true if the transition mutates remote state.
    #[must_use]
    pub const fn is_change(self) -> bool {
        !matches!(self, Self::Noop)
    }

    /// Returns the symbol shown in plan output.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Delete => "-",
            Self::Noop => "=",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Noop => "no-op",
        };
        write!(f, "{s}")
    }
}

/// A single mutating API call.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path relative to the API base.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl Mutation {
    /// `POST` to a collection or action endpoint.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body,
        }
    }

    /// `PATCH` of a single resource.
    #[must_use]
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Patch,
            path: path.into(),
            body: Some(body),
        }
    }

    /// `DELETE` of a single resource.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Delete,
            path: path.into(),
            body: None,
        }
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// One step of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Issue an API call.
    Call(Mutation),
    /// Wait until the resource reports a status.
    AwaitStatus(&'static str),
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call(mutation) => write!(f, "{mutation}"),
            Self::AwaitStatus(status) => write!(f, "wait for status '{status}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transition_serializes_lowercase() {
        let value = serde_json::to_value(Transition::Create).expect("serialize");
        assert_eq!(value, json!("create"));
        assert!(!Transition::Noop.is_change());
        assert!(Transition::Delete.is_change());
    }

    #[test]
    fn test_step_display() {
        let step = Step::Call(Mutation::patch("volumes/abc", json!({"size_gb": 100})));
        assert_eq!(step.to_string(), "PATCH volumes/abc");
        assert_eq!(
            Step::AwaitStatus("stopped").to_string(),
            "wait for status 'stopped'"
        );
    }
}
