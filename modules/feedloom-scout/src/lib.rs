pub mod error;
pub mod ingest;
pub mod publish;
pub mod scheduler;
pub mod sync;

pub use error::{Result, ScoutError};
pub use ingest::{Ingested, Ingestor, Mirrored};
pub use publish::{build_publisher, DirectoryPublisher, Published, Publisher, S3Publisher};
pub use scheduler::{CycleReport, PlatformReport, Scheduler, Timing};
pub use sync::{FeedPublication, SyncOutcome};
