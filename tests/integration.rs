// End-to-end checks across flows, the Google provider and the web UI.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use gemstream::atoms::types::{ContentPart, GenerationSettings};
use gemstream::{
    run_flow, AppConfig, EngineError, EngineResult, FileSource, FlowOutcome, FormSlot,
    FragmentStream, GenerateRequest, GenerationService, GoogleProvider, OutputRegion, Submission,
    WebUiState,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

// ── Helpers ────────────────────────────────────────────────────────────

struct Scripted {
    items: Vec<Result<String, String>>,
    seen: Mutex<Vec<GenerateRequest>>,
}

impl Scripted {
    fn ok(fragments: &[&str]) -> Self {
        Self::new(fragments.iter().map(|f| Ok(f.to_string())).collect())
    }

    fn new(items: Vec<Result<String, String>>) -> Self {
        Scripted { items, seen: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl GenerationService for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_generate(&self, request: &GenerateRequest) -> EngineResult<FragmentStream> {
        self.seen.lock().push(request.clone());
        let items: Vec<EngineResult<String>> =
            self.items.iter().cloned().map(|r| r.map_err(EngineError::Other)).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

#[derive(Default)]
struct Region {
    shown: Mutex<String>,
}

impl OutputRegion for Region {
    fn replace(&self, html: String) {
        *self.shown.lock() = html;
    }
    fn append(&self, html: String) {
        self.shown.lock().push_str(&html);
    }
}

async fn submit(service: &Scripted, submission: Submission) -> (FlowOutcome, String) {
    let region = Region::default();
    let settings = GenerationSettings::default();
    let outcome = run_flow(service, &settings, &FormSlot::new(), &region, submission).await;
    let shown = region.shown.lock().clone();
    (outcome, shown)
}

fn png(declared: Option<&str>) -> FileSource {
    FileSource::Loaded {
        name: "p.png".into(),
        declared_type: declared.map(String::from),
        bytes: b"png".to_vec(),
    }
}

// ── Flows ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_scenario_renders_level_one_heading() {
    let service = Scripted::ok(&["# Hi", " there"]);
    let (outcome, shown) = submit(&service, Submission::text("Hello")).await;
    assert_eq!(outcome, FlowOutcome::Completed { fragments: 2 });
    assert_eq!(shown, "<h1>Hi there</h1>\n");
}

#[tokio::test]
async fn every_form_renders_full_concatenation() {
    let fragments = ["Some *emph", "asis* and\n\n", "- a\n- b\n"];
    let expected = gemstream::render_markdown(&fragments.concat());
    for submission in [
        Submission::text("q"),
        Submission::image(Some(png(Some("image/png"))), "q"),
        Submission::document(Some(png(None)), "q"),
    ] {
        let service = Scripted::ok(&fragments);
        let (outcome, shown) = submit(&service, submission).await;
        assert_eq!(outcome, FlowOutcome::Completed { fragments: 3 });
        assert_eq!(shown, expected);
    }
}

#[tokio::test]
async fn failure_after_two_fragments_appends_error() {
    let service = Scripted::new(vec![
        Ok("**f1**".into()),
        Ok(" f2".into()),
        Err("connection reset".into()),
    ]);
    let (outcome, shown) = submit(&service, Submission::image(Some(png(None)), "x")).await;
    assert_eq!(outcome, FlowOutcome::Failed);
    assert_eq!(shown, format!("{}<hr>connection reset", gemstream::render_markdown("**f1** f2")));
}

#[tokio::test]
async fn image_fallback_and_document_type_in_request() {
    let service = Scripted::ok(&["ok"]);
    submit(&service, Submission::image(Some(png(None)), "what")).await;
    submit(&service, Submission::document(Some(png(Some("image/png"))), "sum")).await;

    let seen = service.seen.lock();
    let types: Vec<&str> =
        seen.iter().map(|r| r.attachment().unwrap().media_type.as_str()).collect();
    assert_eq!(types, ["image/jpeg", "application/pdf"]);
    assert!(matches!(&seen[0].parts[1], ContentPart::Text(t) if t == "what"));
}

// ── Google provider against a local SSE server ─────────────────────────

/// Accept one request, hand back its raw text, and reply with `response`.
async fn fake_google(response: String) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/v1beta", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = sock.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(idx) = text.find("\r\n\r\n") {
                let len = text
                    .lines()
                    .find_map(|l| {
                        let l = l.to_ascii_lowercase();
                        let value = l.strip_prefix("content-length:")?;
                        Some(value.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if raw.len() >= idx + 4 + len {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        sock.write_all(response.as_bytes()).await.unwrap();
        sock.shutdown().await.unwrap();
        String::from_utf8_lossy(&raw).to_string()
    });
    (base, handle)
}

fn sse_response(events: &[Value]) -> String {
    let body: String = events.iter().map(|e| format!("data: {}\r\n\r\n", e)).collect();
    format!("HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}")
}

fn text_event(text: &str) -> Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
}

fn provider_with_key(base: String, key: &str) -> GoogleProvider {
    GoogleProvider::new(&AppConfig {
        api_key: key.into(),
        base_url: Some(base),
        ..AppConfig::default()
    })
}

fn provider(base: String) -> GoogleProvider {
    provider_with_key(base, "test-key")
}

#[tokio::test]
async fn google_streams_fragments_in_order() {
    let reply = sse_response(&[text_event("# Hi"), text_event(" there")]);
    let (base, server) = fake_google(reply).await;
    let service = provider(base);
    let settings = GenerationSettings::default();
    let req = GenerateRequest::single_turn(
        &settings,
        Some(gemstream::Attachment { media_type: "image/jpeg".into(), data: "cG5n".into() }),
        "Hello",
    );

    let stream = service.stream_generate(&req).await.unwrap();
    let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(fragments, ["# Hi", " there"]);

    let raw = server.await.unwrap();
    let first_line = raw.lines().next().unwrap();
    let want = "POST /v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse ";
    assert!(first_line.starts_with(want), "{first_line}");
    assert!(!first_line.contains("test-key"));
    assert!(raw.to_ascii_lowercase().contains("x-goog-api-key: test-key\r\n"));
    let body: Value = serde_json::from_str(raw.split("\r\n\r\n").nth(1).unwrap()).unwrap();
    assert_eq!(body["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
    assert_eq!(body["contents"][0]["parts"][1]["text"], "Hello");
    assert_eq!(body["safetySettings"][0]["threshold"], "BLOCK_ONLY_HIGH");
}

#[tokio::test]
async fn google_http_error_is_reported() {
    let reply = concat!(
        "HTTP/1.1 400 Bad Request\r\nContent-Type: application/json\r\n",
        "Content-Length: 17\r\nConnection: close\r\n\r\n{\"error\":\"nope\"}\n",
    );
    let (base, _server) = fake_google(reply.to_string()).await;
    let req = GenerateRequest::single_turn(&GenerationSettings::default(), None, "hi");
    let err = match provider(base).stream_generate(&req).await {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert!(err.to_string().starts_with("Provider error: google: API error 400"), "{err}");
}

#[tokio::test]
async fn google_block_mid_stream_keeps_earlier_output() {
    let blocked = json!({"candidates": [{"finishReason": "SAFETY"}]});
    let (base, _server) = fake_google(sse_response(&[text_event("partial"), blocked])).await;
    let service = provider(base);
    let region = Region::default();
    let settings = GenerationSettings::default();
    let slot = FormSlot::new();
    let outcome = run_flow(&service, &settings, &slot, &region, Submission::text("x")).await;
    assert_eq!(outcome, FlowOutcome::Failed);
    assert_eq!(*region.shown.lock(), "<p>partial</p>\n<hr>Response was blocked due to SAFETY");
}

#[tokio::test]
async fn connection_error_does_not_reveal_api_key() {
    // Nothing listens on port 1.
    let service = provider_with_key("http://127.0.0.1:1/v1beta".into(), "SECRET-KEY-123");
    let region = Region::default();
    let settings = GenerationSettings::default();
    let slot = FormSlot::new();
    let outcome = run_flow(&service, &settings, &slot, &region, Submission::text("x")).await;
    assert_eq!(outcome, FlowOutcome::Failed);
    let shown = region.shown.lock().clone();
    assert!(shown.starts_with("Generating...<hr>Network error"), "{shown}");
    assert!(!shown.contains("SECRET-KEY-123"), "{shown}");
    assert!(!shown.contains("key="), "{shown}");
}

// ── Web UI ─────────────────────────────────────────────────────────────

async fn start_ui<G: GenerationService + 'static>(service: Arc<G>) -> std::net::SocketAddr {
    start_ui_with(WebUiState::new(service, GenerationSettings::default(), "Test Page")).await
}

async fn start_ui_with(state: WebUiState) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(gemstream::serve_listener(listener, Arc::new(state)));
    addr
}

/// Replies `prompt` back after a per-prompt delay.
struct Echo {
    slow_prompt: &'static str,
}

#[async_trait]
impl GenerationService for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn stream_generate(&self, request: &GenerateRequest) -> EngineResult<FragmentStream> {
        let prompt = match request.parts.last() {
            Some(ContentPart::Text(t)) => t.clone(),
            _ => String::new(),
        };
        let delay = if prompt == self.slow_prompt { 300 } else { 0 };
        Ok(Box::pin(futures::stream::once(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, EngineError>(prompt)
        })))
    }
}

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// One fragment, then a stream that never ends; records when it is dropped.
struct Endless {
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl GenerationService for Endless {
    fn name(&self) -> &str {
        "endless"
    }

    async fn stream_generate(&self, _request: &GenerateRequest) -> EngineResult<FragmentStream> {
        let guard = DropFlag(self.dropped.clone());
        let stream = futures::stream::once(async { Ok::<_, EngineError>("first".to_string()) })
            .chain(futures::stream::pending())
            .map(move |item| {
                let _held = &guard;
                item
            });
        Ok(Box::pin(stream))
    }
}

/// Collect `output` frames for `form` until one equals `want`.
async fn wait_for_output<S>(ws: &mut S, form: &str, want: &str) -> Vec<Value>
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut frames = Vec::new();
    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => panic!("timed out; frames so far: {frames:?}"),
            msg = ws.next() => {
                let Some(Ok(Message::Text(text))) = msg else { continue };
                let frame: Value = serde_json::from_str(&text).unwrap();
                if frame["type"] == "output" && frame["form"] == form {
                    let done = frame["html"] == want;
                    frames.push(frame);
                    if done {
                        return frames;
                    }
                }
            }
        }
    }
}

#[tokio::test]
async fn page_is_served() {
    let addr = start_ui(Arc::new(Scripted::ok(&[]))).await;
    let mut sock = TcpStream::connect(addr).await.unwrap();
    sock.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
    let mut out = String::new();
    sock.read_to_string(&mut out).await.unwrap();
    assert!(out.starts_with("HTTP/1.1 200 OK"));
    assert!(out.contains("<title>Test Page</title>"));
    assert!(out.contains("id=\"textContent\""));
}

#[tokio::test]
async fn websocket_text_submission_streams_rendered_output() {
    let service = Arc::new(Scripted::ok(&["# Hi", " there"]));
    let addr = start_ui(service.clone()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let submit = json!({"type": "submit", "form": "text", "prompt": "Hello"});
    ws.send(Message::Text(submit.to_string())).await.unwrap();

    let frames = wait_for_output(&mut ws, "text", "<h1>Hi there</h1>\n").await;
    assert_eq!(frames[0]["html"], "Generating...");
    assert_eq!(frames[0]["mode"], "replace");
    assert_eq!(service.seen.lock()[0].parts, vec![ContentPart::Text("Hello".into())]);
}

#[tokio::test]
async fn websocket_image_upload_uses_fallback_type() {
    let service = Arc::new(Scripted::ok(&["a cat"]));
    let addr = start_ui(service.clone()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let meta = json!({
        "type": "submit", "form": "image", "prompt": "what",
        "file": {"name": "cat", "media_type": "", "read_error": null},
    });
    ws.send(Message::Text(meta.to_string())).await.unwrap();
    ws.send(Message::Binary(b"png".to_vec())).await.unwrap();

    wait_for_output(&mut ws, "image", "<p>a cat</p>\n").await;
    let seen = service.seen.lock();
    let att = seen[0].attachment().unwrap();
    assert_eq!(att.media_type, "image/jpeg");
    assert_eq!(att.data, "cG5n");
}

#[tokio::test]
async fn websocket_read_error_is_appended() {
    let service = Arc::new(Scripted::ok(&["never"]));
    let addr = start_ui(service.clone()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let meta = json!({
        "type": "submit", "form": "document", "prompt": "sum",
        "file": {
            "name": "a.pdf",
            "media_type": "application/pdf",
            "read_error": "NotReadableError",
        },
    });
    ws.send(Message::Text(meta.to_string())).await.unwrap();

    let want = "<hr>Could not read a.pdf: NotReadableError";
    let frames = wait_for_output(&mut ws, "document", want).await;
    assert_eq!(frames.last().unwrap()["mode"], "append");
    assert!(service.seen.lock().is_empty());
}

#[tokio::test]
async fn websocket_viewport_starts_star_effect() {
    let addr = start_ui(Arc::new(Scripted::ok(&[]))).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws.send(Message::Text(json!({"type": "viewport", "width": 800, "height": 220}).to_string()))
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let v: Value = serde_json::from_str(&text).unwrap();
                if v["type"] == "star_mount" {
                    return v;
                }
            }
        }
    })
    .await
    .unwrap();
    let vars = frame["vars"].as_array().unwrap();
    assert!(vars.iter().any(|pair| pair[0] == "--star-color" && pair[1] == "#113768"));
}

#[tokio::test]
async fn websocket_later_submission_owns_the_form() {
    let addr = start_ui(Arc::new(Echo { slow_prompt: "older" })).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    for prompt in ["older", "newer"] {
        let submit = json!({"type": "submit", "form": "text", "prompt": prompt});
        ws.send(Message::Text(submit.to_string())).await.unwrap();
    }
    wait_for_output(&mut ws, "text", "<p>newer</p>\n").await;

    // The older reply lands after its delay and must not reach the page.
    let late = tokio::time::timeout(Duration::from_millis(600), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let v: Value = serde_json::from_str(&text).unwrap();
                    if v["type"] == "output" {
                        return v;
                    }
                }
                Some(_) => continue,
                None => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(late.is_err(), "unexpected output after the newer reply: {late:?}");
}

#[tokio::test]
async fn websocket_close_stops_running_flows() {
    let dropped = Arc::new(AtomicBool::new(false));
    let addr = start_ui(Arc::new(Endless { dropped: dropped.clone() })).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let submit = json!({"type": "submit", "form": "text", "prompt": "go"});
    ws.send(Message::Text(submit.to_string())).await.unwrap();
    wait_for_output(&mut ws, "text", "<p>first</p>\n").await;
    assert!(!dropped.load(Ordering::SeqCst));

    ws.close(None).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("flow stream still alive after the page closed");
}

#[tokio::test]
async fn websocket_oversized_upload_is_reported_on_its_form() {
    let service = Arc::new(Scripted::ok(&["never"]));
    let state = WebUiState::new(service.clone(), GenerationSettings::default(), "Test Page")
        .with_max_upload(1024);
    let addr = start_ui_with(state).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let meta = json!({
        "type": "submit", "form": "document", "prompt": "sum",
        "file": {"name": "big.pdf", "media_type": "application/pdf", "read_error": null},
    });
    ws.send(Message::Text(meta.to_string())).await.unwrap();
    ws.send(Message::Binary(vec![0u8; 1500])).await.unwrap();

    let want = "<hr>Could not read big.pdf: file is 1500 bytes, over the 1024 byte upload limit";
    let frames = wait_for_output(&mut ws, "document", want).await;
    assert_eq!(frames[0]["html"], "Generating...");
    assert!(service.seen.lock().is_empty());
}

#[tokio::test]
async fn websocket_accepts_uploads_above_default_frame_limit() {
    // Larger than tungstenite's 16 MiB default frame size.
    let bytes = vec![7u8; 17 * 1024 * 1024];
    let service = Arc::new(Scripted::ok(&["read it"]));
    let addr = start_ui(service.clone()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let meta = json!({
        "type": "submit", "form": "document", "prompt": "sum",
        "file": {"name": "big.pdf", "media_type": "application/pdf", "read_error": null},
    });
    ws.send(Message::Text(meta.to_string())).await.unwrap();
    ws.send(Message::Binary(bytes)).await.unwrap();

    wait_for_output(&mut ws, "document", "<p>read it</p>\n").await;
    let seen = service.seen.lock();
    assert_eq!(seen[0].attachment().unwrap().media_type, "application/pdf");
}
