pub mod crawler;
pub mod error;
pub mod filter;
mod json;
pub mod normalize;
pub mod paginator;
pub mod services;
pub mod source;
pub mod store;

pub use crawler::Crawler;
pub use error::{ArchiveError, Result};
pub use filter::FilterChain;
pub use normalize::Normalizer;
pub use paginator::{CrawlOutcome, PageBudget, Paginator, StopReason};
pub use services::{normalizer_for, source_for};
pub use source::{http_client, PageSource, RawPage};
pub use store::Store;
