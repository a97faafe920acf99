//! # Feishu Retrieval Tests
//!
//! Drives `FeishuDocumentSource::retrieve` end to end against a mock Feishu API.

use docscribe::enrich::missing_bytes_placeholder;
use docscribe::{
    ContentSource, DescriptionSource, DocumentKind, DocumentSource, EnrichmentConfig,
    RetrievalError, RetryPolicy,
};
use docscribe_feishu::{FeishuConfig, FeishuDocumentSource};
use docscribe_test_utils::{fake_png, setup_tracing, MockReply, MockVisionProvider};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "t-test-token";

fn test_config(server: &MockServer) -> FeishuConfig {
    FeishuConfig {
        download_retry: RetryPolicy::new(3, Duration::from_millis(10)),
        ocr_retry: RetryPolicy::new(3, Duration::from_millis(10)),
        ..FeishuConfig::default()
    }
    .with_base_url(server.uri())
    .with_credentials("cli_test_app", "test-secret")
}

fn source_for(server: &MockServer) -> FeishuDocumentSource {
    FeishuDocumentSource::new(test_config(server))
        .unwrap()
        .with_enrichment(EnrichmentConfig {
            cooldown: Duration::from_millis(10),
            ..Default::default()
        })
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/v3/tenant_access_token/internal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "tenant_access_token": TOKEN,
            "expire": 7200
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_blocks(server: &MockServer, document_id: &str, items: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/docx/v1/documents/{document_id}/blocks")))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "success",
            "data": {"items": items, "has_more": false}
        })))
        .mount(server)
        .await;
}

async fn mount_image(server: &MockServer, media_token: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/drive/v1/medias/{media_token}/download")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(fake_png()))
        .mount(server)
        .await;
}

fn text_block(id: &str, content: &str) -> Value {
    json!({"block_id": id, "block_type": 2, "text": {"elements": [{"text_run": {"content": content}}]}})
}

fn image_block(id: &str, media_token: &str) -> Value {
    json!({"block_id": id, "block_type": 27, "image": {"token": media_token}})
}

#[tokio::test]
async fn test_docx_with_images_is_linearized_and_described() {
    setup_tracing();
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_blocks(
        &server,
        "abc123",
        json!([
            {"block_id": "h", "block_type": 3, "heading1": {"elements": [{"text_run": {"content": "Login"}}]}},
            text_block("p1", "Enter your credentials"),
            image_block("i1", "tokA"),
            text_block("p2", "Then press submit"),
            image_block("i2", "tokB"),
        ]),
    )
    .await;
    mount_image(&server, "tokA").await;
    mount_image(&server, "tokB").await;

    let vision = MockVisionProvider::new(MockReply::text("A login form with two fields"));
    let source = source_for(&server).with_vision(Box::new(vision.clone()));

    let document = source
        .retrieve("https://example.feishu.cn/docx/abc123")
        .await
        .unwrap();

    assert_eq!(document.document_id, "abc123");
    assert_eq!(document.kind, DocumentKind::Modern);
    assert_eq!(document.content_source, ContentSource::Blocks);
    assert_eq!(
        document.assembled_text,
        "# Login\nEnter your credentials\n{{IMG#0}}\nThen press submit\n{{IMG#1}}\n"
    );
    assert!(!document.ordered_text.contains("{{IMG#"));
    assert!(document.ordered_text.starts_with("# Login\nEnter your credentials\n"));
    let first = document.ordered_text.find("--- Image 1 ---").unwrap();
    let middle = document.ordered_text.find("Then press submit").unwrap();
    let second = document.ordered_text.find("--- Image 2 ---").unwrap();
    assert!(first < middle && middle < second);

    assert_eq!(document.assets.len(), 2);
    for asset in &document.assets {
        assert_eq!(asset.size_bytes(), Some(fake_png().len()));
        assert_eq!(asset.description(), Some("A login form with two fields"));
        assert_eq!(asset.description_source(), Some(DescriptionSource::Vision));
    }
    assert_eq!(vision.tracker().calls(), 2);
}

#[tokio::test]
async fn test_wiki_node_resolves_to_its_docx() {
    setup_tracing();
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/wiki/v2/spaces/get_node"))
        .and(query_param("token", "wik1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"node": {"obj_token": "real1", "obj_type": "docx"}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_blocks(&server, "real1", json!([text_block("p", "from the real document")])).await;

    let document = source_for(&server)
        .retrieve("https://example.feishu.cn/wiki/wik1")
        .await
        .unwrap();

    assert_eq!(document.document_id, "real1");
    assert_eq!(document.ordered_text, "from the real document\n");
    assert!(document.assets.is_empty());
}

#[tokio::test]
async fn test_failed_wiki_lookup_uses_the_node_token() {
    setup_tracing();
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/wiki/v2/spaces/get_node"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 131005,
            "msg": "node not found"
        })))
        .mount(&server)
        .await;
    mount_blocks(&server, "wik2", json!([text_block("p", "node content")])).await;

    let document = source_for(&server)
        .retrieve("https://example.feishu.cn/wiki/wik2")
        .await
        .unwrap();

    assert_eq!(document.document_id, "wik2");
    assert_eq!(document.kind, DocumentKind::Modern);
    assert_eq!(document.ordered_text, "node content\n");
}

#[tokio::test]
async fn test_wiki_node_of_unsupported_type_is_rejected() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/wiki/v2/spaces/get_node"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"node": {"obj_token": "sht1", "obj_type": "sheet"}}
        })))
        .mount(&server)
        .await;

    let result = source_for(&server)
        .retrieve("https://example.feishu.cn/wiki/wik3")
        .await;

    assert!(matches!(
        result,
        Err(RetrievalError::UnsupportedObjectType(t)) if t == "sheet"
    ));
}

#[tokio::test]
async fn test_block_listing_failure_falls_back_to_raw_content() {
    setup_tracing();
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/docx/v1/documents/abc/blocks"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docx/v1/documents/abc/raw_content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"content": "Plain text of the whole document"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path_regex("^/drive/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let document = source_for(&server)
        .retrieve("https://example.feishu.cn/docx/abc")
        .await
        .unwrap();

    assert_eq!(document.content_source, ContentSource::RawFallback);
    assert_eq!(document.ordered_text, "Plain text of the whole document");
    assert!(document.assets.is_empty());
}

#[tokio::test]
async fn test_listing_and_raw_fallback_both_failing_is_a_block_listing_error() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/docx/v1/documents/gone/blocks"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docx/v1/documents/gone/raw_content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1770002,
            "msg": "not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = source_for(&server)
        .retrieve("https://example.feishu.cn/docx/gone")
        .await;

    match result {
        Err(RetrievalError::BlockListing(msg)) => assert!(msg.contains("not found")),
        other => panic!("expected a block listing error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_legacy_document_uses_raw_content() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/doc/v2/doccnOld/raw_content"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"content": "legacy body"}
        })))
        .mount(&server)
        .await;

    let document = source_for(&server)
        .retrieve("https://example.feishu.cn/docs/doccnOld")
        .await
        .unwrap();

    assert_eq!(document.kind, DocumentKind::Legacy);
    assert_eq!(document.content_source, ContentSource::LegacyRaw);
    assert_eq!(document.ordered_text, "legacy body");
}

#[tokio::test]
async fn test_block_listing_follows_page_tokens() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/docx/v1/documents/paged/blocks"))
        .and(query_param("page_token", "next-page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"items": [text_block("b", "second page")], "has_more": false}
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docx/v1/documents/paged/blocks"))
        .and(query_param("page_size", "500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "items": [text_block("a", "first page")],
                "has_more": true,
                "page_token": "next-page"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let document = source_for(&server)
        .retrieve("https://example.feishu.cn/docx/paged")
        .await
        .unwrap();

    assert_eq!(document.ordered_text, "first page\nsecond page\n");
}

#[tokio::test]
async fn test_rate_limited_download_degrades_only_that_image() {
    setup_tracing();
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_blocks(
        &server,
        "doc9",
        json!([image_block("i1", "tokLimited"), image_block("i2", "tokFine")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/drive/v1/medias/tokLimited/download"))
        .respond_with(ResponseTemplate::new(429).set_body_string("too many requests"))
        .expect(3)
        .mount(&server)
        .await;
    mount_image(&server, "tokFine").await;

    let vision = MockVisionProvider::new(MockReply::text("A bar chart"));
    let source = source_for(&server).with_vision(Box::new(vision.clone()));

    let document = source
        .retrieve("https://example.feishu.cn/docx/doc9")
        .await
        .unwrap();

    let limited = &document.assets[0];
    assert!(limited.raw_bytes.is_none());
    assert!(limited.download_error.is_some());
    assert_eq!(limited.description(), Some(missing_bytes_placeholder(1).as_str()));
    assert_eq!(limited.description_source(), Some(DescriptionSource::Placeholder));

    let fine = &document.assets[1];
    assert_eq!(fine.size_bytes(), Some(fake_png().len()));
    assert_eq!(fine.description(), Some("A bar chart"));
    assert_eq!(vision.tracker().calls(), 1);

    assert!(document.ordered_text.contains("--- Image 1 ---\n[Document image 1]"));
    assert!(document.ordered_text.contains("--- Image 2 ---\nA bar chart\n"));
}

#[tokio::test]
async fn test_rejected_download_is_retried_with_document_hint() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_blocks(&server, "doc7", json!([image_block("i1", "tokHinted")])).await;
    Mock::given(method("GET"))
        .and(path("/drive/v1/medias/tokHinted/download"))
        .and(query_param("extra", r#"{"obj_type":"docx","obj_token":"doc7"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(fake_png()))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v1/medias/tokHinted/download"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": 1061004,
            "msg": "forbidden"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = source_for(&server).with_vision(Box::new(MockVisionProvider::new(
        MockReply::text("An architecture diagram"),
    )));
    let document = source
        .retrieve("https://example.feishu.cn/docx/doc7")
        .await
        .unwrap();

    assert_eq!(document.assets[0].size_bytes(), Some(fake_png().len()));
    assert_eq!(document.assets[0].description(), Some("An architecture diagram"));
}

#[tokio::test]
async fn test_images_fall_back_to_platform_ocr() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_blocks(&server, "ocr1", json!([image_block("i1", "tokText")])).await;
    mount_image(&server, "tokText").await;
    Mock::given(method("POST"))
        .and(path("/optical_char_recognition/v1/image/basic_recognize"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"text_list": ["Username", "Password"]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let document = source_for(&server)
        .retrieve("https://example.feishu.cn/docx/ocr1")
        .await
        .unwrap();

    let asset = &document.assets[0];
    assert_eq!(asset.description_source(), Some(DescriptionSource::Ocr));
    assert_eq!(asset.description(), Some("Image contains text:\nUsername\nPassword"));
}

#[tokio::test]
async fn test_rate_limited_ocr_is_attempted_three_times() {
    setup_tracing();
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_blocks(&server, "busy", json!([image_block("i1", "tokBusy")])).await;
    mount_image(&server, "tokBusy").await;
    Mock::given(method("POST"))
        .and(path("/optical_char_recognition/v1/image/basic_recognize"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "code": 99991400,
            "msg": "request trigger frequency limit"
        })))
        .expect(3)
        .mount(&server)
        .await;

    let document = source_for(&server)
        .retrieve("https://example.feishu.cn/docx/busy")
        .await
        .unwrap();

    let asset = &document.assets[0];
    assert_eq!(asset.description_source(), Some(DescriptionSource::Placeholder));
    assert!(asset.description().unwrap().contains("rate limited"));
}

#[tokio::test]
async fn test_ocr_succeeds_after_a_frequency_limit() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_blocks(&server, "again", json!([image_block("i1", "tokAgain")])).await;
    mount_image(&server, "tokAgain").await;
    Mock::given(method("POST"))
        .and(path("/optical_char_recognition/v1/image/basic_recognize"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 99991400,
            "msg": "request trigger frequency limit"
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/optical_char_recognition/v1/image/basic_recognize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"text_list": ["Submit"]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let document = source_for(&server)
        .retrieve("https://example.feishu.cn/docx/again")
        .await
        .unwrap();

    assert_eq!(
        document.assets[0].description(),
        Some("Image contains text:\nSubmit")
    );
}

#[tokio::test]
async fn test_text_only_document_skips_downloads() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_blocks(&server, "plain", json!([text_block("p", "just words")])).await;
    Mock::given(path_regex("^/drive/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let document = source_for(&server)
        .retrieve("https://example.feishu.cn/docx/plain")
        .await
        .unwrap();

    assert_eq!(document.ordered_text, document.assembled_text);
    assert!(document.assets.is_empty());
}

#[tokio::test]
async fn test_literal_placeholder_text_is_left_in_place() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_blocks(
        &server,
        "literal",
        json!([
            text_block("p", "syntax is {{IMG#0}} here"),
            image_block("i1", "tokLit"),
        ]),
    )
    .await;
    mount_image(&server, "tokLit").await;

    let document = source_for(&server)
        .with_vision(Box::new(MockVisionProvider::new(MockReply::text("A chart"))))
        .retrieve("https://example.feishu.cn/docx/literal")
        .await
        .unwrap();

    assert!(document.ordered_text.starts_with("syntax is {{IMG #0}} here\n"));
    assert_eq!(document.ordered_text.matches("--- Image 1 ---").count(), 1);
    assert!(!document.ordered_text.contains("{{IMG#"));
}

#[tokio::test]
async fn test_second_retrieval_reuses_the_cached_token() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_blocks(&server, "twice", json!([text_block("p", "hello")])).await;

    let source = source_for(&server);
    for _ in 0..2 {
        source
            .retrieve("https://example.feishu.cn/docx/twice")
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_invalid_reference_makes_no_requests() {
    let server = MockServer::start().await;

    let result = source_for(&server)
        .retrieve("https://example.com/docx/abc123")
        .await;

    assert!(matches!(result, Err(RetrievalError::InvalidReference(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_credentials_fail_with_auth_error() {
    let server = MockServer::start().await;
    let config = FeishuConfig::default().with_base_url(server.uri());
    let source = FeishuDocumentSource::new(config).unwrap();

    let result = source.retrieve("https://example.feishu.cn/docx/abc123").await;

    assert!(matches!(result, Err(RetrievalError::Auth(_))));
}
