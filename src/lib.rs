//! Core library for the raptors sales-data command line application.
//!
//! Spreadsheets and MongoDB collections are loaded into a [`Frame`], cleaned
//! and joined against lookup tables, then written back. IO adapters live
//! under [`raptors::etl::io`], the cell and frame types inside
//! [`raptors::etl::model`] and [`raptors::etl::frame`], the domain readers in
//! [`raptors::etl::readers`], and the command orchestration under
//! [`raptors::etl::controllers`].
//!
//! [`Frame`]: raptors::etl::frame::Frame

pub mod raptors;

pub use raptors::etl::{
    EtlError, Result, config, controllers, error, frame, io, model, query, readers,
};
