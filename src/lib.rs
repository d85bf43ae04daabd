pub mod catalog;
pub mod config;
pub mod db;
pub mod dsl;
pub mod enhance;
pub mod error;
pub mod pipeline;

pub use error::{Error, Result};
pub use pipeline::{Pipeline, Translation};
