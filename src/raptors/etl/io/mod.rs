pub mod collection_write;
pub mod excel_read;
pub mod excel_write;
pub mod memory;
pub mod store;
