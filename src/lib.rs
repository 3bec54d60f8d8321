// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
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

//! # slb_reconcile
//!
//! Declarative reconciliation, orphan sweeping and scenario verification for
//! network load balancers.
//!
//! ## Overview
//!
//! - Converge a load balancer to a declared state, creating it or updating
//!   only the fields that differ, and refusing changes to immutable fields
//! - Sweep load balancers left behind by test runs, deleting only records
//!   proven to be owned
//! - Verify the lifecycle with scripted scenarios that check live attributes
//!   after every step and always tear down
//!
//! ## Architecture
//!
//! 1. **Declared State**: typed fields that are unset, set, or removed
//! 2. **Live State**: read from the control plane through [`slb::SlbApi`]
//! 3. **Reconciler**: diffs the two and issues the minimal mutation
//!
//! ## Modules
//!
//! - [`slb`]: control-plane trait, HTTP client, in-process backend, pagination
//! - [`planner`]: declared state and diff computation
//! - [`reconciler`]: create/read/update/delete with confirmation
//! - [`retry`]: bounded retries with per-call timeouts and cancellation
//! - [`lease`]: in-process exclusion between the harness and the sweeper
//! - [`sweep`]: ownership classification and the sweep engine
//! - [`harness`]: scenario runner and attribute checks
//! - [`config`]: configuration parsing and validation
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! name: tf-testAccSlb
//! address_type: intranet
//! vswitch_id: vsw-0123
//! delete_protection: on
//! tags:
//!   env: test
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod harness;
pub mod lease;
pub mod planner;
pub mod reconciler;
pub mod retry;
pub mod slb;
pub mod sweep;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{AppConfig, ConfigParser, ConfigValidator};
pub use error::{Result, SlbError};
pub use harness::{ScenarioResult, ScenarioRunner, StepSpec};
pub use lease::LeaseTable;
pub use planner::{DeclaredState, Diff, Field};
pub use reconciler::{ApplyOutcome, Reconciler};
pub use retry::RetryPolicy;
pub use slb::{ClusterLookup, LoadBalancer, MemorySlb, NetworkOracle, SlbApi, SlbClient};
pub use sweep::{SweepEngine, SweepReport, SweeperRegistry};
