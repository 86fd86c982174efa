use anyhow::Result;
use rerender_contracts::{AspectRatio, ImagePayload, StyleMetadata};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub reference: ImagePayload,
    pub subject: ImagePayload,
    pub prompt: String,
    /// Always concrete; the controller resolves `Auto` before calling.
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone)]
pub struct EditRequest {
    pub image: ImagePayload,
    pub instruction: String,
}

/// What an image-producing call returned. `image` is the first inline image
/// found in the response, if any.
#[derive(Debug, Clone, Default)]
pub struct ServiceReply {
    pub image: Option<ImagePayload>,
    pub model: String,
    pub provider_request: Map<String, Value>,
    pub provider_response: Map<String, Value>,
    pub warnings: Vec<String>,
}

/// The external generative service, seen as three opaque calls.
pub trait StyleService: Send + Sync {
    fn name(&self) -> &str;
    fn decode(&self, image: &ImagePayload) -> Result<StyleMetadata>;
    fn generate(&self, request: &GenerateRequest) -> Result<ServiceReply>;
    fn edit(&self, request: &EditRequest) -> Result<ServiceReply>;
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
