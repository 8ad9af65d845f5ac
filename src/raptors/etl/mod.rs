pub mod config;
pub mod controllers;
pub mod error;
pub mod frame;
pub mod io;
pub mod model;
pub mod query;
pub mod readers;

pub use error::{EtlError, Result};
