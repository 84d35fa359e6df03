pub mod config;
pub mod html;
pub mod types;

pub use config::{Config, DelayWindow, FeedConfig, FeedMeta, PlatformConfig, PublishBackend, PublishConfig};
pub use types::*;
