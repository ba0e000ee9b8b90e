//! The subroutine set
//!
//! Execution order is declared in [`crate::subroutine::subroutines`];
//! each module here is one independently testable unit.

pub mod credentials;
pub mod deployment;
pub mod features;
pub mod pipeline;
pub mod readiness;
pub mod workspace;
