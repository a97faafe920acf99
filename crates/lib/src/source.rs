use crate::{errors::RetrievalError, types::EnrichedDocument};
use async_trait::async_trait;

/// A remote document platform that can produce enriched documents.
///
/// Each platform plugin crate implements this trait, so front ends can treat all
/// platforms the same way.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Retrieves the document behind `reference` (usually a URL), linearizes it and
    /// describes its embedded images.
    ///
    /// Only fatal conditions (bad reference, failed authentication, no content at
    /// all) are returned as errors. Asset-level failures degrade the affected assets
    /// and still yield a complete document.
    async fn retrieve(&self, reference: &str) -> Result<EnrichedDocument, RetrievalError>;
}
