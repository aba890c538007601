//! Public library modules for the CLI crate
pub mod compare;
pub mod report;
