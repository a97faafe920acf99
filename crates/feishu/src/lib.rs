//! # `docscribe-feishu`: Feishu / Lark Document Source
//!
//! Retrieves Feishu documents as a self-contained plugin for the `docscribe`
//! pipeline. It implements the [`DocumentSource`] trait from the core library.
//!
//! A retrieval walks these stages in order, stopping at the first fatal error:
//! parse the URL, acquire an access token, resolve wiki nodes, list and linearize
//! blocks, download images, describe images, reassemble the text.

pub mod api;
pub mod blocks;
pub mod config;
pub mod credentials;
pub mod download;
pub mod errors;
pub mod locator;
pub mod ocr;

pub use api::FeishuApi;
pub use blocks::BlockContentAssembler;
pub use config::FeishuConfig;
pub use credentials::CredentialStore;
pub use download::AssetDownloader;
pub use errors::FeishuError;
pub use locator::{parse_reference, DocumentLocator};
pub use ocr::FeishuOcr;

use async_trait::async_trait;
use docscribe::{
    providers::ai::{TextRecognizer, VisionProvider},
    reassemble, ContentSource, DocumentKind, DocumentReference, DocumentSource, EnrichedDocument,
    EnrichmentConfig, Enricher, RetrievalError, RetrievalStage,
};
use std::sync::Arc;
use tracing::{info, instrument};

fn stage(stage: RetrievalStage, document: &str) {
    info!(stage = %stage, document, "Entered stage {stage}");
}

/// The [`DocumentSource`] implementation for Feishu.
#[derive(Debug, Clone)]
pub struct FeishuDocumentSource {
    credentials: Arc<CredentialStore>,
    locator: DocumentLocator,
    assembler: BlockContentAssembler,
    downloader: AssetDownloader,
    ocr: Arc<FeishuOcr>,
    enricher: Enricher,
}

impl FeishuDocumentSource {
    /// Creates a source with default enrichment settings and OCR as the only
    /// recognition backend.
    pub fn new(config: FeishuConfig) -> Result<Self, FeishuError> {
        let api = FeishuApi::new(&config)?;
        let mut store = CredentialStore::new(api.clone(), config.token_safety_margin);
        if let (Some(app_id), Some(app_secret)) = (&config.app_id, &config.app_secret) {
            store = store.with_credential(app_id, app_secret);
        }
        let credentials = Arc::new(store);
        let ocr = Arc::new(
            FeishuOcr::new(api.clone(), credentials.clone()).with_retry(config.ocr_retry),
        );
        let enricher = Enricher::new(EnrichmentConfig::default())
            .with_ocr(ocr.clone() as Arc<dyn TextRecognizer>);

        Ok(Self {
            locator: DocumentLocator::new(api.clone()),
            assembler: BlockContentAssembler::new(api.clone(), config.page_size),
            downloader: AssetDownloader::new(api, config.download_workers, config.download_retry),
            credentials,
            ocr,
            enricher,
        })
    }

    /// Replaces the enrichment settings. OCR stays wired in; a vision provider added
    /// earlier is dropped.
    pub fn with_enrichment(mut self, config: EnrichmentConfig) -> Self {
        self.enricher =
            Enricher::new(config).with_ocr(self.ocr.clone() as Arc<dyn TextRecognizer>);
        self
    }

    /// Adds a vision provider ahead of OCR in the fallback chain.
    pub fn with_vision(mut self, vision: Box<dyn VisionProvider>) -> Self {
        self.enricher = self.enricher.with_vision(vision);
        self
    }

    /// Uses a custom enricher as is.
    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// The platform OCR recognizer, for callers building their own enricher.
    pub fn ocr(&self) -> Arc<dyn TextRecognizer> {
        self.ocr.clone()
    }

    /// Parses `reference` and resolves wiki nodes, without fetching any content.
    pub async fn resolve(&self, reference: &str) -> Result<DocumentReference, RetrievalError> {
        let parsed = parse_reference(reference)?;
        if parsed.kind != DocumentKind::IndirectionNode {
            return Ok(parsed);
        }
        let access_token = self.credentials.get_token().await?;
        Ok(self.locator.resolve(&access_token, parsed).await?)
    }
}

#[async_trait]
impl DocumentSource for FeishuDocumentSource {
    #[instrument(skip(self))]
    async fn retrieve(&self, reference: &str) -> Result<EnrichedDocument, RetrievalError> {
        let parsed = parse_reference(reference)?;
        stage(RetrievalStage::UrlParsed, &parsed.id);

        let access_token = self.credentials.get_token().await?;
        stage(RetrievalStage::TokenAcquired, &parsed.id);

        let resolved = if parsed.kind == DocumentKind::IndirectionNode {
            let resolved = self.locator.resolve(&access_token, parsed).await?;
            stage(RetrievalStage::ReferenceResolved, &resolved.id);
            resolved
        } else {
            parsed
        };

        let assembled = self.assembler.assemble(&access_token, &resolved).await?;
        match assembled.source {
            ContentSource::Blocks => stage(RetrievalStage::BlocksFetched, &resolved.id),
            ContentSource::RawFallback | ContentSource::LegacyRaw => {
                stage(RetrievalStage::RawFetched, &resolved.id)
            }
        }

        let assets = if assembled.assets.is_empty() {
            Vec::new()
        } else {
            let downloaded = self
                .downloader
                .download_all(&access_token, &resolved.id, assembled.assets)
                .await;
            stage(RetrievalStage::AssetsDownloaded, &resolved.id);
            let described = self.enricher.enrich(downloaded).await;
            stage(RetrievalStage::AssetsDescribed, &resolved.id);
            described
        };

        let ordered_text = reassemble(&assembled.text, &assets);
        stage(RetrievalStage::Reassembled, &resolved.id);

        Ok(EnrichedDocument {
            document_id: resolved.id,
            kind: resolved.kind,
            content_source: assembled.source,
            assembled_text: assembled.text,
            ordered_text,
            assets,
        })
    }
}
