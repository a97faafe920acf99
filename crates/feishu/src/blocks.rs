//! # Block Content Assembler
//!
//! Lists a modern document's blocks page by page and linearizes them into text.
//! Image blocks become [`AssetInfo`] records and leave a placeholder at their spot
//! in the text, numbered in document order from zero.
//!
//! When listing fails at any page, the assembler falls back to the raw-content
//! endpoint, which yields text but no assets.

use crate::{api::FeishuApi, errors::FeishuError};
use docscribe::{
    neutralize_placeholders, types::placeholder_for, AssembledContent, AssetInfo, ContentSource,
    DocumentKind, DocumentReference,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

const IMAGE_BLOCK: i64 = 27;

/// One entry of the block listing. Type-specific payloads stay untyped since the
/// field name depends on the block type.
#[derive(Deserialize, Debug, Clone)]
pub struct Block {
    #[serde(default)]
    pub block_id: String,
    #[serde(default)]
    pub block_type: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Deserialize, Debug)]
struct BlockPage {
    #[serde(default)]
    items: Vec<Block>,
    #[serde(default)]
    has_more: bool,
    page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawContent {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Debug, Default)]
struct TextBody {
    elements: Option<Vec<TextElement>>,
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TextElement {
    text_run: Option<TextRun>,
    mention_user: Option<Value>,
    mention_doc: Option<MentionDoc>,
    equation: Option<TextRun>,
}

#[derive(Deserialize, Debug)]
struct TextRun {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Debug)]
struct MentionDoc {
    title: Option<String>,
}

impl TextElement {
    fn render(&self) -> Option<String> {
        if let Some(run) = &self.text_run {
            return Some(run.content.clone());
        }
        if self.mention_user.is_some() {
            return Some("@user".to_string());
        }
        if let Some(doc) = &self.mention_doc {
            return doc.title.as_ref().map(|title| format!("[{title}]"));
        }
        self.equation.as_ref().map(|eq| eq.content.clone())
    }
}

impl Block {
    /// Text held under `field`, from its elements or its plain `content`.
    ///
    /// Author text that looks like an image placeholder is neutralized.
    fn text_of(&self, field: &str) -> Option<String> {
        let body: TextBody = serde_json::from_value(self.fields.get(field)?.clone()).ok()?;
        let text = match body.elements {
            Some(elements) => elements.iter().filter_map(TextElement::render).collect(),
            None => body.content?,
        };
        Some(neutralize_placeholders(&text))
    }

    fn image_token(&self) -> Option<&str> {
        self.fields
            .get("image")?
            .get("token")?
            .as_str()
            .filter(|token| !token.is_empty())
    }
}

/// Renders blocks into text with image placeholders, plus the asset inventory.
pub fn render_blocks(blocks: &[Block]) -> (String, Vec<AssetInfo>) {
    let mut text = String::new();
    let mut assets = Vec::new();

    for block in blocks {
        let line = match block.block_type {
            2 => block.text_of("text"),
            level @ 3..=11 => {
                let level = (level - 2) as usize;
                block
                    .text_of(&format!("heading{level}"))
                    .filter(|t| !t.is_empty())
                    .map(|t| format!("{} {t}", "#".repeat(level)))
            }
            12 => bullet(block.text_of("bullet")),
            13 => bullet(block.text_of("ordered")),
            14 => block.text_of("code"),
            15 => block
                .text_of("quote")
                .filter(|t| !t.is_empty())
                .map(|t| format!("> {t}")),
            IMAGE_BLOCK => match block.image_token() {
                Some(token) => {
                    let position = assets.len();
                    assets.push(AssetInfo::new(token, block.block_id.clone(), position));
                    Some(placeholder_for(position))
                }
                None => {
                    debug!("Image block {} carries no token; skipping", block.block_id);
                    None
                }
            },
            _ => block
                .text_of("text")
                .filter(|t| !t.is_empty())
                .or_else(|| block.text_of("paragraph")),
        };

        if let Some(line) = line.filter(|l| !l.is_empty()) {
            text.push_str(&line);
            text.push('\n');
        }
    }
    (text, assets)
}

fn bullet(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty()).map(|t| format!("• {t}"))
}

#[derive(Debug, Clone)]
pub struct BlockContentAssembler {
    api: FeishuApi,
    page_size: u32,
}

impl BlockContentAssembler {
    pub fn new(api: FeishuApi, page_size: u32) -> Self {
        Self { api, page_size }
    }

    /// Produces the text and asset inventory for a resolved document.
    pub async fn assemble(
        &self,
        access_token: &str,
        reference: &DocumentReference,
    ) -> Result<AssembledContent, FeishuError> {
        if reference.kind == DocumentKind::Legacy {
            let text = self.legacy_raw_content(access_token, &reference.id).await?;
            return Ok(AssembledContent {
                text,
                assets: Vec::new(),
                source: ContentSource::LegacyRaw,
            });
        }

        match self.list_blocks(access_token, &reference.id).await {
            Ok(blocks) => {
                let (text, assets) = render_blocks(&blocks);
                info!(
                    "Document {} linearized: {} blocks, {} images",
                    reference.id,
                    blocks.len(),
                    assets.len()
                );
                Ok(AssembledContent {
                    text,
                    assets,
                    source: ContentSource::Blocks,
                })
            }
            Err(e) => {
                warn!(
                    "Listing blocks of {} failed ({e}); falling back to raw content",
                    reference.id
                );
                let text = self
                    .raw_content(access_token, &reference.id)
                    .await
                    .map_err(|raw| FeishuError::BlockListing {
                        listing: e.to_string(),
                        raw: raw.to_string(),
                    })?;
                Ok(AssembledContent {
                    text,
                    assets: Vec::new(),
                    source: ContentSource::RawFallback,
                })
            }
        }
    }

    /// Collects every block, following `page_token` while `has_more` is set.
    pub async fn list_blocks(
        &self,
        access_token: &str,
        document_id: &str,
    ) -> Result<Vec<Block>, FeishuError> {
        let path = format!("docx/v1/documents/{document_id}/blocks");
        let mut blocks = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("page_size", self.page_size.to_string())];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }
            let page: BlockPage = self
                .api
                .send_for_data(self.api.get(access_token, &path).query(&query))
                .await?;
            debug!("Fetched {} blocks of {}", page.items.len(), document_id);
            blocks.extend(page.items);

            match page.page_token.filter(|t| !t.is_empty()) {
                Some(next) if page.has_more => page_token = Some(next),
                _ => break,
            }
        }
        Ok(blocks)
    }

    pub async fn raw_content(
        &self,
        access_token: &str,
        document_id: &str,
    ) -> Result<String, FeishuError> {
        let path = format!("docx/v1/documents/{document_id}/raw_content");
        let raw: RawContent = self
            .api
            .send_for_data(self.api.get(access_token, &path))
            .await?;
        Ok(neutralize_placeholders(&raw.content))
    }

    pub async fn legacy_raw_content(
        &self,
        access_token: &str,
        document_id: &str,
    ) -> Result<String, FeishuError> {
        let path = format!("doc/v2/{document_id}/raw_content");
        let raw: RawContent = self
            .api
            .send_for_data(self.api.get(access_token, &path))
            .await?;
        Ok(neutralize_placeholders(&raw.content))
    }
}
