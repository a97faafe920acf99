//! # Content Reassembly
//!
//! Replaces every asset placeholder in assembled text with a delimited block holding
//! the asset's description. The output never contains a placeholder, and running
//! the function again on the same input gives the same output.

use crate::types::AssetInfo;
use std::collections::HashMap;

const PLACEHOLDER_OPEN: &str = "{{IMG#";
const PLACEHOLDER_CLOSE: &str = "}}";
const NEUTRALIZED_OPEN: &str = "{{IMG #";

/// Rewrites anything in `text` that would read as an asset placeholder.
///
/// Applied to document text and to descriptions, so only placeholders emitted for
/// real image blocks are ever substituted.
pub fn neutralize_placeholders(text: &str) -> String {
    text.replace(PLACEHOLDER_OPEN, NEUTRALIZED_OPEN)
}

/// Substitutes placeholders in `text` with the descriptions of `assets`.
pub fn reassemble(text: &str, assets: &[AssetInfo]) -> String {
    let by_position: HashMap<usize, &AssetInfo> =
        assets.iter().map(|asset| (asset.position, asset)).collect();

    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        let after = &rest[start + PLACEHOLDER_OPEN.len()..];
        let digits = after.bytes().take_while(|b| b.is_ascii_digit()).count();

        let position = if digits > 0 && after[digits..].starts_with(PLACEHOLDER_CLOSE) {
            after[..digits].parse::<usize>().ok()
        } else {
            None
        };

        match position {
            Some(position) => {
                output.push_str(&rest[..start]);
                let description = by_position
                    .get(&position)
                    .and_then(|asset| asset.description());
                output.push_str(&render_asset_block(position, description));
                rest = &after[digits + PLACEHOLDER_CLOSE.len()..];
            }
            None => {
                output.push_str(&rest[..start + PLACEHOLDER_OPEN.len()]);
                rest = after;
            }
        }
    }
    output.push_str(rest);
    output
}

/// Renders the block that replaces the placeholder at `position` (numbered from 1).
fn render_asset_block(position: usize, description: Option<&str>) -> String {
    let number = position + 1;
    match description {
        Some(text) if !text.trim().is_empty() => {
            let text = neutralize_placeholders(text);
            format!("\n\n--- Image {number} ---\n{text}\n--- End of image {number} ---\n\n")
        }
        _ => format!("\n\n[Image {number}]: (description pending)\n\n"),
    }
}
