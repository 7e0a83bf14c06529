pub mod format;
pub mod fs;

pub use format::{format_bytes, format_transfer, percent_of};
