use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::i18n::ui_text;
use crate::llm::media::{gemini_supports_image_mime, normalize_image_mime_type};
use crate::types::{ImageFile, Language, ResponsePart};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const MAX_INPUT_IMAGES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("model did not return any content; the request may have been blocked by safety policies")]
    EmptyResponse,
    #[error("Gemini API error: {0}")]
    Service(String),
    #[error("generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub fn user_message(&self, language: Language) -> &'static str {
        let text = ui_text(language);
        match self {
            GenerationError::Cancelled => text.cancelled,
            GenerationError::EmptyResponse | GenerationError::Service(_) => text.error_instruction,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    model: String,
    safety_profile: String,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        safety_profile: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            safety_profile: safety_profile.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_base_url.clone(),
            config.gemini_image_model.clone(),
            config.gemini_safety_settings.clone(),
        )
    }

    /// Sends one `generateContent` request and returns the first candidate's
    /// parts in service order. `language` only affects logging and the
    /// caller's error text.
    pub async fn generate(
        &self,
        prompt: &str,
        language: Language,
        images: &[ImageFile],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResponsePart>, GenerationError> {
        if images.is_empty() || images.len() > MAX_INPUT_IMAGES {
            return Err(GenerationError::Service(format!(
                "expected 1 to {} input images, got {}",
                MAX_INPUT_IMAGES,
                images.len()
            )));
        }

        let payload = self.build_payload(prompt, images);
        let metadata = json!({ "language": language.as_str(), "images": images.len() });

        let operation = log_llm_timing(
            "gemini",
            &self.model,
            "generate_content",
            Some(metadata),
            move || async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(GenerationError::Cancelled),
                    result = self.call_api(&payload) => result,
                }
            },
        );
        let response = operation.await?;

        extract_parts(response)
    }

    fn build_payload(&self, prompt: &str, images: &[ImageFile]) -> Value {
        let mut parts = vec![json!({ "text": prompt })];
        for image in images {
            let mime_type = normalize_image_mime_type(&image.mime_type);
            if !gemini_supports_image_mime(&mime_type) {
                warn!(
                    "Sending image {} with mime {} that Gemini may reject",
                    image.name, mime_type
                );
            }
            parts.push(json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": image.data
                }
            }));
        }

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"]
            },
            "safetySettings": build_safety_settings(&self.safety_profile),
        })
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    async fn call_api(&self, payload: &Value) -> Result<GeminiResponse, GenerationError> {
        let client = get_http_client();
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(payload);
            debug!(target: "llm.gemini", model = %self.model, payload = %payload_summary);
        }

        let response = match client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, status={:?})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    err.status()
                );
                return Err(GenerationError::Service(err_text));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, self.redact(&body_summary));
            let detail = self.redact(&message.unwrap_or(body_summary));
            return Err(GenerationError::Service(format!(
                "request failed with status {}: {}",
                status, detail
            )));
        }

        let value = response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| GenerationError::Service(self.redact(&err.to_string())))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_gemini_response(&value);
            debug!(target: "llm.gemini", model = %self.model, response = %response_summary);
        }
        Ok(value)
    }
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}', using standard defaults.",
                profile
            );
            "BLOCK_MEDIUM_AND_ABOVE"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn extract_parts(response: GeminiResponse) -> Result<Vec<ResponsePart>, GenerationError> {
    let block_reason = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason);
    let candidate = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next());
    let finish_reason = candidate
        .as_ref()
        .and_then(|candidate| candidate.finish_reason.clone());
    let parts = candidate
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts)
        .unwrap_or_default();

    if parts.is_empty() {
        warn!(
            "Gemini returned no content parts (block_reason={:?}, finish_reason={:?})",
            block_reason, finish_reason
        );
        return Err(GenerationError::EmptyResponse);
    }

    let mut extracted = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            GeminiPart::Text { text } => extracted.push(ResponsePart::Text(text)),
            GeminiPart::InlineData { inline_data } => extracted.push(ResponsePart::InlineImage {
                data: inline_data.data,
                mime_type: inline_data.mime_type,
            }),
            GeminiPart::Other(value) => {
                debug!(target: "llm.gemini", part = %truncate_for_log(&value.to_string(), 200), "Skipping unsupported part");
            }
        }
    }
    Ok(extracted)
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized_contents = Vec::new();
        for content in contents {
            let role = content
                .get("role")
                .and_then(|value| value.as_str())
                .unwrap_or("user");
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| summarize_gemini_parts(parts))
                .unwrap_or_default();
            summarized_contents.push(json!({ "role": role, "parts": parts }));
        }
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut other_parts = 0usize;
    let mut text_preview = None;

    let first = response
        .candidates
        .as_deref()
        .and_then(|candidates| candidates.first());
    if let Some(parts) = first
        .and_then(|candidate| candidate.content.as_ref())
        .and_then(|content| content.parts.as_ref())
    {
        for part in parts {
            match part {
                GeminiPart::Text { text } => {
                    text_parts += 1;
                    if text_preview.is_none() && !text.trim().is_empty() {
                        text_preview = Some(truncate_for_log(text, 200));
                    }
                }
                GeminiPart::InlineData { .. } => image_parts += 1,
                GeminiPart::Other(_) => other_parts += 1,
            }
        }
    }

    json!({
        "candidates": response.candidates.as_ref().map(|candidates| candidates.len()).unwrap_or(0),
        "finishReason": first.and_then(|candidate| candidate.finish_reason.clone()),
        "textParts": text_parts,
        "imageParts": image_parts,
        "otherParts": other_parts,
        "textPreview": text_preview
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiClient {
        GeminiClient::new("secret-key", "http://127.0.0.1:9/v1beta/", "img-model", "standard")
    }

    fn image(name: &str) -> ImageFile {
        ImageFile::new("QUJD".to_string(), "image/jpg", name)
    }

    fn response(json_text: &str) -> GeminiResponse {
        serde_json::from_str(json_text).unwrap()
    }

    #[test]
    fn payload_puts_prompt_first_then_images_in_order() {
        let payload = client().build_payload("coach me", &[image("target.jpg"), image("me.png")]);
        let parts = payload.pointer("/contents/0/parts").unwrap().as_array().unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["text"], "coach me");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[2]["inlineData"]["data"], "QUJD");
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
        assert_eq!(payload["safetySettings"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(client().base_url, "http://127.0.0.1:9/v1beta");
    }

    #[test]
    fn extracts_first_candidate_parts_in_order() {
        let parsed = response(
            r#"{"candidates":[
                {"content":{"parts":[
                    {"text":"Step 1"},
                    {"inlineData":{"mimeType":"image/png","data":"AAA"}},
                    {"functionCall":{"name":"x"}},
                    {"text":"Step 2"}
                ]}},
                {"content":{"parts":[{"text":"ignored"}]}}
            ]}"#,
        );

        let parts = extract_parts(parsed).unwrap();
        assert_eq!(
            parts,
            vec![
                ResponsePart::text("Step 1"),
                ResponsePart::image("image/png", "AAA"),
                ResponsePart::text("Step 2"),
            ]
        );
    }

    #[test]
    fn blocked_prompt_is_an_empty_response() {
        let parsed = response(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert_eq!(extract_parts(parsed), Err(GenerationError::EmptyResponse));

        let no_parts = response(r#"{"candidates":[{"content":{"parts":[]},"finishReason":"IMAGE_SAFETY"}]}"#);
        assert_eq!(extract_parts(no_parts), Err(GenerationError::EmptyResponse));
    }

    #[test]
    fn error_body_prefers_service_message() {
        let (message, _) = summarize_error_body(r#"{"error":{"code":429,"message":"Quota exceeded"}}"#);
        assert_eq!(message.as_deref(), Some("Quota exceeded"));

        let (message, summary) = summarize_error_body("  ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn redacts_api_key_from_messages() {
        assert_eq!(
            client().redact("bad key secret-key in url"),
            "bad key [redacted] in url"
        );
    }

    #[test]
    fn payload_summary_omits_image_bytes() {
        let c = client();
        let payload = c.build_payload("prompt", &[image("a.jpg")]);
        let summary = summarize_gemini_payload(&payload).to_string();
        assert!(summary.contains("dataLen"));
        assert!(!summary.contains("QUJD"));
    }

    #[tokio::test]
    async fn rejects_wrong_image_counts_before_any_request() {
        let token = CancellationToken::new();
        let err = client()
            .generate("p", Language::En, &[], &token)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Service(_)));

        let three = [image("a"), image("b"), image("c")];
        let err = client()
            .generate("p", Language::En, &three, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Service(_)));
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_request() {
        let token = CancellationToken::new();
        token.cancel();
        let err = client()
            .generate("p", Language::Vi, &[image("scene.jpg")], &token)
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Cancelled);
        assert_eq!(err.user_message(Language::Vi), ui_text(Language::Vi).cancelled);
    }

    #[test]
    fn service_failures_share_the_generic_message() {
        let text = ui_text(Language::En);
        assert_eq!(
            GenerationError::Service("quota".into()).user_message(Language::En),
            text.error_instruction
        );
        assert_eq!(
            GenerationError::EmptyResponse.user_message(Language::En),
            text.error_instruction
        );
    }
}
