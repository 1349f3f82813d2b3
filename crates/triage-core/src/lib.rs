pub mod action;
pub mod channel;
pub mod config;
pub mod error;
pub mod execution;
pub mod index;
pub mod io;
pub mod operation;
pub mod paths;
pub mod readiness;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod search;
pub mod throttle;
pub mod validation;
pub mod values;

pub use error::{Result, TriageError};
