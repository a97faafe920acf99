//! Parses Feishu and Lark document URLs and resolves wiki nodes to the documents
//! they point at.

use crate::{api::FeishuApi, errors::FeishuError};
use docscribe::{DocumentKind, DocumentReference};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

const PLATFORM_HOSTS: [&str; 2] = ["feishu.cn", "larksuite.com"];
const WIKI_NODE_PATH: &str = "wiki/v2/spaces/get_node";

#[derive(Deserialize, Debug)]
struct WikiNodeData {
    node: WikiNode,
}

#[derive(Deserialize, Debug)]
struct WikiNode {
    obj_token: Option<String>,
    obj_type: Option<String>,
}

/// Parses a document URL into a [`DocumentReference`].
///
/// Accepted shapes are `/docx/<id>`, `/docs/<id>` and `/wiki/<token>` on any
/// `feishu.cn` or `larksuite.com` host. Query strings and fragments are ignored.
pub fn parse_reference(reference: &str) -> Result<DocumentReference, FeishuError> {
    let invalid = || FeishuError::InvalidReference(reference.to_string());
    let url = Url::parse(reference.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    let host = url.host_str().ok_or_else(invalid)?;
    if !PLATFORM_HOSTS
        .iter()
        .any(|known| host == *known || host.ends_with(&format!(".{known}")))
    {
        return Err(invalid());
    }

    let mut segments = url.path_segments().ok_or_else(invalid)?;
    let kind = match segments.next() {
        Some("docx") => DocumentKind::Modern,
        Some("docs") => DocumentKind::Legacy,
        Some("wiki") => DocumentKind::IndirectionNode,
        _ => return Err(invalid()),
    };
    let id = segments.next().filter(|id| is_token(id)).ok_or_else(invalid)?;
    Ok(DocumentReference::new(id, kind))
}

fn is_token(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Maps a wiki node's object type onto a concrete document kind.
fn kind_for_object_type(obj_type: Option<&str>) -> Result<DocumentKind, FeishuError> {
    match obj_type {
        None | Some("docx") => Ok(DocumentKind::Modern),
        Some("doc") => Ok(DocumentKind::Legacy),
        Some(other) => Err(FeishuError::UnsupportedObjectType(other.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct DocumentLocator {
    api: FeishuApi,
}

impl DocumentLocator {
    pub fn new(api: FeishuApi) -> Self {
        Self { api }
    }

    /// Resolves an indirection node to the document it points at.
    ///
    /// Non-node references are returned unchanged. When the node lookup itself
    /// fails, the node token is used as a modern document id.
    pub async fn resolve(
        &self,
        access_token: &str,
        reference: DocumentReference,
    ) -> Result<DocumentReference, FeishuError> {
        if reference.kind != DocumentKind::IndirectionNode {
            return Ok(reference);
        }

        let lookup = self
            .api
            .send_for_data::<WikiNodeData>(
                self.api
                    .get(access_token, WIKI_NODE_PATH)
                    .query(&[("token", reference.id.as_str())]),
            )
            .await;

        let node = match lookup {
            Ok(data) => data.node,
            Err(e) => {
                warn!(
                    "Wiki node lookup for {} failed ({e}); treating it as a docx id",
                    reference.id
                );
                return Ok(DocumentReference::new(reference.id, DocumentKind::Modern));
            }
        };

        let kind = kind_for_object_type(node.obj_type.as_deref())?;
        let id = node
            .obj_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| reference.id.clone());
        info!("Wiki node {} resolved to {:?} document {}", reference.id, kind, id);
        Ok(DocumentReference::new(id, kind))
    }
}
