pub mod backup;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod run;
pub mod slack;
pub mod storage;

#[cfg(test)]
mod testing;

pub use error::{ArchiverError, ErrorClass, Result};
