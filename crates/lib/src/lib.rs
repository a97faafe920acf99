//! # docscribe
//!
//! Core of a retrieval-and-enrichment pipeline for rich documents: the shared data
//! model, bounded concurrency primitives, recognition providers, the enrichment
//! pipeline that describes embedded images, and the reassembler that folds those
//! descriptions back into the document text.
//!
//! Platform clients live in plugin crates (such as `docscribe-feishu`) and implement
//! [`DocumentSource`].

pub mod enrich;
pub mod errors;
pub mod pool;
pub mod prompts;
pub mod providers;
pub mod rate_limit;
pub mod reassemble;
pub mod retry;
pub mod source;
pub mod types;

pub use enrich::{EnrichmentConfig, Enricher};
pub use errors::{RecognitionError, RetrievalError};
pub use reassemble::{neutralize_placeholders, reassemble};
pub use retry::{Attempt, RetryFailure, RetryPolicy};
pub use source::DocumentSource;
pub use types::{
    AssembledContent, AssetInfo, ContentSource, DescriptionSource, DocumentKind,
    DocumentReference, EnrichedDocument, RetrievalStage,
};
