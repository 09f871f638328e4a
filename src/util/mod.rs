//! Shared utility helpers.

pub(crate) mod config;
pub mod error;
pub(crate) mod timer;

pub use error::{ErrorKind, ErrorModule, OfficialEyeError, Result as OfficialEyeResult};
