//! Command line front end of the `unifiedlog` crate.

pub mod artifact;
pub mod error;
pub mod print;
