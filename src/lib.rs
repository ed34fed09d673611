pub mod catalog;
pub mod config;
pub mod error;
pub mod operation;
pub mod pure;
pub mod query;
pub mod snapshot;
pub mod value;
