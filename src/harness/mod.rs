//! Verification harness.
//!
//! Drives a load balancer through a scripted sequence of declarations and
//! checks the live attributes after every step.

mod attributes;
mod expect;
mod scenario;

pub use attributes::{differences, flatten, AttributeMap};
pub use expect::{compare, ExpectedAttributeMap, ExpectedValue, Mismatch};
pub use scenario::{
    ScenarioFile, ScenarioResult, ScenarioRunner, StepErrorKind, StepSpec, TeardownOutcome,
    DEFAULT_TEARDOWN_ATTEMPTS, RAND_PLACEHOLDER,
};
