pub mod changelog;
pub mod error;
pub mod helpers;
pub mod state;
pub mod update;

pub use error::{Error, Result};
