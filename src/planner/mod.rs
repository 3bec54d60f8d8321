//! Planning module for reconciliation.
//!
//! This module holds the declared (desired) state model and the diff
//! between a declaration and the live record.

mod declared;
mod diff;

pub use declared::{DeclaredState, Field, MAX_NAME_LEN};
pub use diff::{Diff, FieldChange, Mutability};
