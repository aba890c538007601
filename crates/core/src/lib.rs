//! Core library: fingerprint codec and matching, reconciliation, task execution
//! and the ratings DB.

pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod library;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod prdb;
pub mod processors;
pub mod reconcile;
pub mod scanner;
pub mod store;
pub mod sync;

pub use error::{PrdbError, Result};
pub use fingerprint::Fingerprint;
pub use models::{Record, Song, Stats};
