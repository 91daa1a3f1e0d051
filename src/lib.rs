// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # cloudscale reconcile
//!
//! A declarative, idempotent reconciliation client for the cloudscale.ch
//! public cloud API.
//!
//! ## Overview
//!
//! Each resource is described by its desired state. One invocation brings the
//! remote resource in line with it and reports what changed:
//!
//! - Servers, server groups, volumes, networks and subnets
//! - Floating IPs and Objects users
//! - Load balancers with their pools and listeners
//!
//! ## Architecture
//!
//! Reconciliation is a straight pipeline per resource:
//!
//! 1. **Resolve**: find zero or one remote resource by UUID or by name
//! 2. **Diff**: compare only the fields the desired state specifies
//! 3. **Apply**: create, update, delete or do nothing, then re-fetch
//! 4. **Report**: build the result envelope, secrets handled once
//!
//! Running the same desired state twice yields `changed=true` then
//! `changed=false`. Dry runs compute the same transitions without issuing
//! any mutating call.
//!
//! ## Modules
//!
//! - [`api`]: cloudscale.ch HTTP client and transport trait
//! - [`resources`]: per-kind schemas, desired state and the kind registry
//! - [`resolver`]: remote resource lookup
//! - [`planner`]: change sets and update steps
//! - [`reconciler`]: the per-resource state machine
//! - [`report`]: result envelopes and run summaries
//! - [`inventory`]: dynamic inventory export
//! - [`config`]: manifest parsing and validation
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! resources:
//!   - kind: server
//!     name: web1
//!     flavor: flex-4-2
//!     image: debian-12
//!     zone: lpg1
//!     ssh_keys:
//!       - ssh-ed25519 AAAA... admin
//!   - kind: floating_ip
//!     ip_version: 4
//!     server: web1
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod inventory;
pub mod planner;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod resources;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::{ApiTransport, CloudscaleClient, HttpMethod};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, Manifest};
pub use error::{CloudscaleError, Result};
pub use inventory::{Inventory, InventoryOptions};
pub use planner::{ChangeSet, DiffEngine, Transition};
pub use reconciler::{ReconcileOptions, ReconciliationResult, Reconciler};
pub use report::{ResultReporter, RunSummary};
pub use resolver::Resolver;
pub use resources::{DesiredState, Kind, Registry, RemoteResource, ResourceSpec};
