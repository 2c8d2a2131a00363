//! Image Reaper Core - Foundational Types
//!
//! Image records, retention classes, retention configuration and the error
//! type shared by the runtime and the CLI.

pub mod config;
pub mod error;
pub mod image;

// Re-export commonly used types
pub use config::RetentionConfig;
pub use error::{ReaperError, Result};
pub use image::{ClassCounts, ClassifiedImage, Classification, ImageRecord};

/// Image Reaper version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
