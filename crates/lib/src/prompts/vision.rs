//! # Image Description Prompts
//!
//! Instructions for vision models describing images embedded in product documents.

/// The default instruction sent with every image.
///
/// Asks for exhaustive extraction rather than a caption.
pub const IMAGE_DESCRIPTION_INSTRUCTION: &str = r#"Extract all information from this image. Identify the logic of any flow chart, transcribe every piece of visible text, and phrase the result so it helps someone write test cases. Pay close attention to constraints: for every input field, state its length, format and type restrictions (maximum length, minimum value, allowed special characters and so on)."#;

/// Substrings that mark a model reply as a refusal or failure rather than a description.
pub const UNSUPPORTED_REPLY_MARKERS: &[&str] = &[
    "模型暂不支持",
    "无法识别",
    "识别失败",
    "unsupported",
    "unable to recognize",
];

/// Whether a vision reply is a refusal or failure notice.
pub fn is_unsupported_reply(reply: &str) -> bool {
    let lowered = reply.to_lowercase();
    UNSUPPORTED_REPLY_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
