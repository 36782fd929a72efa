//! Policy-checked generation of Angular components.
//!
//! A session asks a hosted model for a component, checks it against a fixed
//! design system, and feeds violations back for correction until the code is
//! approved or the retry budget runs out.
//!
//! - **[`core`]**: deterministic types, rule checks and loop transitions. No I/O.
//! - **[`io`]**: policy loading, prompt templates, completion backends, config
//!   and session artifacts.
//! - **[`agents`]**: generator, corrector and two-stage validator.
//! - **[`session`]**: the control loop tying the agents together.

pub mod agents;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::ForgeError;
pub use session::{RefineRequest, SessionRunner};
