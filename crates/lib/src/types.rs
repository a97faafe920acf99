//! # Core Data Model
//!
//! Types shared by every document source: the parsed document reference, the
//! per-image asset record that flows through the download and enrichment phases,
//! and the final enriched document handed to downstream consumers.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// The shape of document a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Old-style document with only a raw-text API.
    Legacy,
    /// Block-structured document.
    Modern,
    /// A node that must be resolved to a concrete object first.
    IndirectionNode,
}

/// A parsed, immutable pointer to a document on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference {
    pub id: String,
    pub kind: DocumentKind,
}

impl DocumentReference {
    pub fn new(id: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Where an asset's final description came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionSource {
    Vision,
    Ocr,
    Placeholder,
}

/// An embedded image, identified by `(token, position)`.
///
/// Created by the block assembler, filled with bytes by the download phase and
/// with a description by the enrichment phase. Each phase hands the asset to exactly
/// one task, which owns it until it is returned.
#[derive(Debug, Clone, Serialize)]
pub struct AssetInfo {
    pub token: String,
    pub block_id: String,
    pub position: usize,
    #[serde(rename = "size_bytes", serialize_with = "serialize_size")]
    pub raw_bytes: Option<Vec<u8>>,
    /// Why the download failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_error: Option<String>,
    description: Option<String>,
    description_source: Option<DescriptionSource>,
}

impl AssetInfo {
    pub fn new(token: impl Into<String>, block_id: impl Into<String>, position: usize) -> Self {
        Self {
            token: token.into(),
            block_id: block_id.into(),
            position,
            raw_bytes: None,
            download_error: None,
            description: None,
            description_source: None,
        }
    }

    /// The placeholder inserted into the assembled text for this asset.
    pub fn placeholder(&self) -> String {
        placeholder_for(self.position)
    }

    /// Size of the downloaded bytes, if any.
    pub fn size_bytes(&self) -> Option<usize> {
        self.raw_bytes.as_ref().map(Vec::len)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn description_source(&self) -> Option<DescriptionSource> {
        self.description_source
    }

    /// Assigns the description. The first assignment wins; later calls are ignored
    /// and return `false`.
    pub fn assign_description(
        &mut self,
        description: impl Into<String>,
        source: DescriptionSource,
    ) -> bool {
        if self.description.is_some() {
            return false;
        }
        self.description = Some(description.into());
        self.description_source = Some(source);
        true
    }
}

fn serialize_size<S: Serializer>(
    bytes: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    bytes.as_ref().map(Vec::len).serialize(serializer)
}

/// Builds the placeholder for the asset at `position`.
///
/// Braces delimit the index so `IMG#1` can never match inside `IMG#10`.
pub fn placeholder_for(position: usize) -> String {
    format!("{{{{IMG#{position}}}}}")
}

/// How the document text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// Linearized from the block list, with asset extraction.
    Blocks,
    /// Block listing failed; raw full text without assets.
    RawFallback,
    /// Legacy document raw text.
    LegacyRaw,
}

/// Text and asset inventory produced by a content assembler, before enrichment.
#[derive(Debug, Clone)]
pub struct AssembledContent {
    pub text: String,
    pub assets: Vec<AssetInfo>,
    pub source: ContentSource,
}

/// The final pipeline output.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedDocument {
    pub document_id: String,
    pub kind: DocumentKind,
    pub content_source: ContentSource,
    /// Assembled text with placeholders still in place.
    #[serde(skip)]
    pub assembled_text: String,
    /// Final text; contains no unresolved placeholders.
    pub ordered_text: String,
    pub assets: Vec<AssetInfo>,
}

/// Document-level retrieval stages, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStage {
    UrlParsed,
    TokenAcquired,
    ReferenceResolved,
    BlocksFetched,
    RawFetched,
    AssetsDownloaded,
    AssetsDescribed,
    Reassembled,
}

impl fmt::Display for RetrievalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetrievalStage::UrlParsed => "URL_PARSED",
            RetrievalStage::TokenAcquired => "TOKEN_ACQUIRED",
            RetrievalStage::ReferenceResolved => "REFERENCE_RESOLVED",
            RetrievalStage::BlocksFetched => "BLOCKS_FETCHED",
            RetrievalStage::RawFetched => "RAW_FETCHED",
            RetrievalStage::AssetsDownloaded => "ASSETS_DOWNLOADED",
            RetrievalStage::AssetsDescribed => "ASSETS_DESCRIBED",
            RetrievalStage::Reassembled => "REASSEMBLED",
        };
        f.write_str(name)
    }
}
