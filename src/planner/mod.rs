//! Planning module for reconciliation.
//!
//! This module compares desired and remote state and describes the
//! transitions and API calls needed to converge them.

mod diff;
mod plan;

pub use diff::{values_equal, Change, ChangeSet, DiffEngine};
pub use plan::{Mutation, Step, Transition};
