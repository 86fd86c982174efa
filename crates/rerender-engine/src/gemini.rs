use std::thread;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use rerender_contracts::{ImagePayload, StyleMetadata};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{ResolvedModels, ServiceConfig};
use crate::intake::probe_dimensions;
use crate::prompt::DECODE_INSTRUCTION;
use crate::service::{
    map_object, truncate_text, EditRequest, GenerateRequest, ServiceReply, StyleService,
};

const DEFAULT_INLINE_MIME: &str = "image/png";

/// Collaborator backed by the Gemini `generateContent` REST endpoint.
pub struct GeminiService {
    config: ServiceConfig,
    api_key: String,
    decode_model: String,
    image_model: String,
    edit_model: String,
    http: HttpClient,
}

impl GeminiService {
    pub fn new(config: ServiceConfig, models: &ResolvedModels) -> Result<Self> {
        let Some(api_key) = config.api_key.clone() else {
            bail!("Gemini API key missing; set GEMINI_API_KEY (or GOOGLE_API_KEY / API_KEY)");
        };
        Ok(Self {
            api_key,
            decode_model: models.decode.model.name.clone(),
            image_model: models.generate.model.name.clone(),
            edit_model: models.edit.model.name.clone(),
            http: HttpClient::new(),
            config,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn decode_schema() -> Value {
        let mut properties = Map::new();
        for field in StyleMetadata::FIELD_NAMES {
            properties.insert(field.to_string(), json!({ "type": "STRING" }));
        }
        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": StyleMetadata::FIELD_NAMES,
        })
    }

    fn decode_payload(image: &ImagePayload) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    inline_part(image),
                    { "text": DECODE_INSTRUCTION },
                ],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": Self::decode_schema(),
            },
        })
    }

    fn generate_payload(request: &GenerateRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    inline_part(&request.reference),
                    inline_part(&request.subject),
                    { "text": request.prompt },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.aspect_ratio.as_str(),
                },
            },
        })
    }

    fn edit_payload(request: &EditRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    inline_part(&request.image),
                    { "text": request.instruction },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
            },
        })
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        payload: &Value,
        warnings: &mut Vec<String>,
    ) -> Result<HttpResponse> {
        let max_retries = self.config.transport_retries;
        for attempt in 0..=max_retries {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", self.api_key.as_str())])
                .timeout(self.config.request_timeout)
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw)
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= max_retries {
                        return Err(err);
                    }
                    let message = format!(
                        "Gemini transport retry {}/{} after transient request failure.",
                        attempt + 1,
                        max_retries
                    );
                    warn!(endpoint, "{message}");
                    warnings.push(message);
                    thread::sleep(self.config.retry_backoff * (attempt as u32 + 1));
                }
            }
        }

        unreachable!("Gemini transport retry loop should always return a response or error")
    }

    fn call(&self, model: &str, payload: &Value, warnings: &mut Vec<String>) -> Result<Value> {
        let endpoint = self.endpoint_for_model(model);
        let started = Instant::now();
        let response = self.post_with_transport_retries(&endpoint, payload, warnings)?;
        let parsed = response_json_or_error("Gemini", response)?;
        debug!(
            model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Gemini call finished"
        );
        Ok(parsed)
    }

    fn image_reply(
        &self,
        model: &str,
        payload: Value,
        mut warnings: Vec<String>,
    ) -> Result<ServiceReply> {
        let response_payload = self.call(model, &payload, &mut warnings)?;
        let image = first_inline_image(&response_payload)?;
        Ok(ServiceReply {
            image,
            model: model.to_string(),
            provider_request: map_object(json!({
                "endpoint": self.endpoint_for_model(model),
                "payload": payload,
            })),
            provider_response: map_object(json!({
                "candidates": response_payload
                    .get("candidates")
                    .and_then(Value::as_array)
                    .map(|rows| rows.len())
                    .unwrap_or(0),
                "finish_reason": first_candidate(&response_payload)
                    .and_then(|candidate| candidate.get("finishReason"))
                    .cloned()
                    .unwrap_or(Value::Null),
                "usage_metadata": response_payload.get("usageMetadata").cloned().unwrap_or(Value::Null),
            })),
            warnings,
        })
    }
}

impl StyleService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn decode(&self, image: &ImagePayload) -> Result<StyleMetadata> {
        let payload = Self::decode_payload(image);
        let mut warnings = Vec::new();
        let response_payload = self.call(&self.decode_model, &payload, &mut warnings)?;
        let text = first_candidate_text(&response_payload);
        if text.trim().is_empty() {
            bail!("Gemini decode returned no text");
        }
        serde_json::from_str::<StyleMetadata>(&text).with_context(|| {
            format!(
                "Gemini decode returned malformed metadata: {}",
                truncate_text(&text, 256)
            )
        })
    }

    fn generate(&self, request: &GenerateRequest) -> Result<ServiceReply> {
        self.image_reply(&self.image_model, Self::generate_payload(request), Vec::new())
    }

    fn edit(&self, request: &EditRequest) -> Result<ServiceReply> {
        self.image_reply(&self.edit_model, Self::edit_payload(request), Vec::new())
    }
}

fn inline_part(image: &ImagePayload) -> Value {
    let mime = if image.mime_type().starts_with("image/") {
        image.mime_type()
    } else {
        DEFAULT_INLINE_MIME
    };
    json!({
        "inlineData": {
            "mimeType": mime,
            "data": image.encoded(),
        }
    })
}

fn first_candidate(response_payload: &Value) -> Option<&Value> {
    response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
}

fn candidate_parts(candidate: &Value) -> Vec<Value> {
    candidate
        .get("content")
        .and_then(Value::as_object)
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn first_candidate_text(response_payload: &Value) -> String {
    first_candidate(response_payload)
        .map(candidate_parts)
        .unwrap_or_default()
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("")
}

/// First inline image in the first candidate's parts. Later candidates are
/// not consulted.
fn first_inline_image(response_payload: &Value) -> Result<Option<ImagePayload>> {
    let parts = first_candidate(response_payload)
        .map(candidate_parts)
        .unwrap_or_default();

    for part in &parts {
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .context("Gemini image base64 decode failed")?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_INLINE_MIME)
            .to_string();
        let dimensions = probe_dimensions(&bytes);
        return Ok(Some(ImagePayload::new(bytes, mime_type).with_dimensions(dimensions)));
    }

    Ok(None)
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}
