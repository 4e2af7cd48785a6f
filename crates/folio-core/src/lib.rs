//! Folio Core — errors, configuration, and the clock seam shared by the
//! consent crates.

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DataPaths, FolioConfig};
pub use error::{Error, Result};
