// Gemstream Engine — Google Gemini Provider
// Implements GenerationService over `streamGenerateContent` with SSE.
// Fragments are forwarded from a reader task as they arrive; dropping the
// returned stream stops the reader and closes the connection.
// The key travels in the `x-goog-api-key` header, never in the URL, so
// transport errors that echo the URL cannot leak it.

use crate::atoms::constants::{CONNECT_TIMEOUT, GOOGLE_BASE_URL};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{FragmentStream, GenerationService};
use crate::atoms::types::{ContentPart, GenerateRequest};
use crate::engine::config::AppConfig;
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const PROVIDER: &str = "google";

/// Finish reasons for which the service withholds the candidate's text.
const BLOCKING_FINISH_REASONS: &[&str] =
    &["SAFETY", "RECITATION", "LANGUAGE", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

// ── Struct ────────────────────────────────────────────────────────────────────

pub struct GoogleProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GoogleProvider {
    pub fn new(config: &AppConfig) -> Self {
        let base_url = config.base_url.clone().unwrap_or_else(|| GOOGLE_BASE_URL.to_string());
        GoogleProvider {
            // No overall timeout: a response streams for as long as it takes.
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url,
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    /// Single user turn, parts in request order.
    pub(crate) fn build_body(request: &GenerateRequest) -> Value {
        let parts: Vec<Value> = request
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::InlineData(att) => json!({
                    "inlineData": {
                        "mimeType": att.media_type,
                        "data": att.data,
                    }
                }),
                ContentPart::Text(text) => json!({ "text": text }),
            })
            .collect();

        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "safetySettings": request.safety_settings,
        })
    }
}

// ── SSE decoding ──────────────────────────────────────────────────────────────

/// Splits a byte stream into `data:` payloads. Gemini sends one JSON
/// document per data line; lines may straddle network chunks.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Flush a final line that had no trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buf);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let data = line.trim().strip_prefix("data:")?.trim_start();
    (!data.is_empty()).then(|| data.to_string())
}

/// Text carried by one streamed response, or why there is none.
pub(crate) fn parse_event(data: &str) -> EngineResult<Option<String>> {
    let v: Value = serde_json::from_str(data)?;

    if let Some(err) = v.get("error") {
        let code = err["code"].as_u64().unwrap_or(0);
        let message = err["message"].as_str().unwrap_or("unknown error");
        return Err(EngineError::provider(PROVIDER, format!("API error {code}: {message}")));
    }

    if let Some(reason) = v["promptFeedback"]["blockReason"].as_str() {
        warn!("[google] Prompt blocked: {}", reason);
        return Err(EngineError::Blocked(reason.to_string()));
    }

    let Some(candidate) = v["candidates"].get(0) else {
        return Ok(None);
    };

    if let Some(reason) = candidate["finishReason"].as_str() {
        if BLOCKING_FINISH_REASONS.contains(&reason) {
            let safety = candidate.get("safetyRatings").map(|r| r.to_string()).unwrap_or_default();
            warn!(
                "[google] Candidate blocked: finishReason={} safety={}",
                reason,
                safety.chars().take(300).collect::<String>()
            );
            return Err(EngineError::Blocked(reason.to_string()));
        }
    }

    // Thought parts (thinking models) are not user-visible text.
    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter(|p| !p["thought"].as_bool().unwrap_or(false))
                .filter_map(|p| p["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}

/// Returns `false` once the stream should stop (error sent or receiver gone).
async fn forward(tx: &mpsc::Sender<EngineResult<String>>, data: &str) -> bool {
    match parse_event(data) {
        Ok(Some(text)) => tx.send(Ok(text)).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

async fn pump_events(response: reqwest::Response, tx: mpsc::Sender<EngineResult<String>>) {
    let mut byte_stream = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    while let Some(chunk) = byte_stream.next().await {
        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => {
                warn!("[google] Stream read error: {}", e);
                let _ = tx.send(Err(e.into())).await;
                return;
            }
        };
        for data in decoder.push(&bytes) {
            if !forward(&tx, &data).await {
                debug!("[google] Stream closed early");
                return;
            }
        }
    }

    if let Some(data) = decoder.finish() {
        forward(&tx, &data).await;
    }
}

// ── GenerationService implementation ──────────────────────────────────────────

#[async_trait]
impl GenerationService for GoogleProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn stream_generate(&self, request: &GenerateRequest) -> EngineResult<FragmentStream> {
        let body = Self::build_body(request);
        info!("[google] Request model={} parts={}", request.model, request.parts.len());

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_text = response.text().await.unwrap_or_default();
            error!(
                "[google] Error {}: {}",
                status,
                body_text.chars().take(500).collect::<String>()
            );
            return Err(EngineError::provider(
                PROVIDER,
                format!(
                    "API error {}: {}",
                    status,
                    body_text.chars().take(200).collect::<String>()
                ),
            ));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(pump_events(response, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
