//! `roster-ingest` — School-enrollment roster ingestion.
//!
//! Pure pipeline crate: validates an uploaded spreadsheet, maps it to
//! canonical rows, resolves free-text site names against a registry and hands
//! the result to an injected store. No CLI or database code.

pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod observer;
pub mod persist;
pub mod pipeline;
pub mod preview;
pub mod resolver;
pub mod rules;
pub mod sheet;
pub mod similarity;
pub mod stats;
pub mod transform;
pub mod validate;

pub use config::IngestConfig;
pub use error::{ErrorKind, IngestError, RowProcessingError};
pub use model::{
    CanonicalSite, CleanedRow, EnrollmentRecord, IngestionResult, MatchTier, PipelineState,
    SiteMatch, SourceFormat,
};
pub use observer::{EventLog, IngestObserver, LogObserver, NullObserver, PipelineEvent};
pub use persist::{EnrollmentStore, MemoryStore, PersistenceGateway, PersistenceOutcome, StoreError};
pub use pipeline::IngestionOrchestrator;
pub use resolver::{SiteNameResolver, SiteRegistry, StaticRegistry};
pub use validate::{SpreadsheetValidator, UploadedFile, ValidationOutcome};
