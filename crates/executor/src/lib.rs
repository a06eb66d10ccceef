//! Code execution for codeloop.
//!
//! Generated code runs in a child interpreter process with a hard
//! wall-clock ceiling. This bounds resources; it is not an isolation
//! boundary.

pub mod subprocess;

pub use subprocess::SubprocessRunner;
