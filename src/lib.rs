pub mod adapter;
pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod schema;
pub mod sql;
pub mod types;

pub use error::{Error, Result};
