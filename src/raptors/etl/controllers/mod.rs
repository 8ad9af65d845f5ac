//! Commands of the `raptors` binary. Each takes a [`DocumentStore`] so the
//! same flow runs against MongoDB or the in-memory store.
//!
//! [`DocumentStore`]: crate::raptors::etl::io::store::DocumentStore

pub mod backup;
pub mod cleandump;
pub mod generate;
pub mod sync;

pub use backup::{Backup, BackupOptions};
pub use cleandump::{
    CleanBookingOptions, CleanReport, CleanSfdcOptions, clean_booking_dump, clean_sfdc_dump,
};
pub use generate::{BookingReport, GenerateOptions, generate, write_report};
pub use sync::{SyncOptions, SyncReport, sync};
