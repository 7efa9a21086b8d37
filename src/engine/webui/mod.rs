// Gemstream Engine — Web UI Bridge
//
// A lightweight HTTP + WebSocket server that hosts the three submission
// forms and the star effect in the browser.
//
// Architecture:
//   - Binds a TCP listener on a configurable port (default 3939)
//   - GET /     → serves the self-contained HTML page (no secrets embedded)
//   - GET /ws   → upgrades to WebSocket; one connection per open page
//   - Each submission runs as its own task; submissions and the star effect
//     live exactly as long as the connection
//
// The API key never leaves the server; the page only sees rendered HTML.

mod html;
mod page;
mod server;

use crate::atoms::constants::MAX_UPLOAD_BYTES;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::GenerationService;
use crate::atoms::types::{Dimensions, GenerationSettings};
use crate::engine::config::AppConfig;
use crate::engine::encoding::{AttachmentPolicy, FileSource};
use crate::engine::flows::{run_flow_with_ticket, FlowTicket, Submission};
use crate::engine::providers;
use crate::engine::stars::{StarEffect, StarField};
use futures::stream::StreamExt;
use futures::SinkExt;
use log::{debug, info, warn};
use page::{ClientFrame, Page, PendingUpload, ServerFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

pub use html::build_page_html;

const WRITER_DRAIN: Duration = Duration::from_secs(1);

// ── Shared State ───────────────────────────────────────────────────────

/// Everything a page connection needs, shared across connections.
pub struct WebUiState {
    pub service: Arc<dyn GenerationService>,
    pub settings: GenerationSettings,
    pub page_title: String,
    pub max_upload_bytes: usize,
}

impl WebUiState {
    pub fn new(
        service: Arc<dyn GenerationService>,
        settings: GenerationSettings,
        page_title: impl Into<String>,
    ) -> Self {
        WebUiState {
            service,
            settings,
            page_title: page_title.into(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            providers::from_config(config),
            config.generation_settings(),
            config.page_title.clone(),
        )
        .with_max_upload(config.max_upload_bytes)
    }

    pub fn with_max_upload(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Socket limits sit above the upload limit so an oversized file still
    /// arrives and is reported against its form.
    fn socket_config(&self) -> WebSocketConfig {
        let limit = self.max_upload_bytes.saturating_mul(2);
        WebSocketConfig {
            max_message_size: Some(limit),
            max_frame_size: Some(limit),
            ..Default::default()
        }
    }
}

// ── Public API ─────────────────────────────────────────────────────────

/// Validate config, bind, and serve until the task is dropped.
pub async fn serve(config: &AppConfig) -> EngineResult<()> {
    config.validate()?;
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| EngineError::Config(format!("Bind {} failed: {}", addr, e)))?;

    if config.bind_address != "127.0.0.1" && config.bind_address != "localhost" {
        warn!(
            "[webui] Binding to {} — the page is reachable from the network",
            config.bind_address
        );
    }

    serve_listener(listener, Arc::new(WebUiState::from_config(config))).await
}

/// Serve on an already-bound listener.
pub async fn serve_listener(listener: TcpListener, state: Arc<WebUiState>) -> EngineResult<()> {
    server::run_server(listener, state).await
}

// ── WebSocket Page Handler ─────────────────────────────────────────────

async fn handle_websocket<S: AsyncRead + AsyncWrite + Unpin + Send + 'static>(
    stream: S,
    peer: std::net::SocketAddr,
    state: Arc<WebUiState>,
) -> EngineResult<()> {
    let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(state.socket_config()))
        .await
        .map_err(|e| EngineError::channel("webui", e.to_string()))?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Single writer: flows and the star effect all queue frames here.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(t) => t,
                Err(e) => {
                    warn!("[webui] Frame encode failed: {}", e);
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let page = Arc::new(Page::new(out_tx));
    let (dims_tx, dims_rx) = watch::channel(Dimensions::default());
    let stars = {
        let stage = page.stage();
        tokio::spawn(async move {
            StarEffect::new(StarField::new()).run(&stage, dims_rx).await;
        })
    };

    // Flows belong to this page and end with it.
    let mut flows: JoinSet<()> = JoinSet::new();
    let mut pending: Option<PendingUpload> = None;

    loop {
        let msg = tokio::select! {
            msg = ws_receiver.next() => msg,
            Some(_) = flows.join_next(), if !flows.is_empty() => continue,
        };
        let msg = match msg {
            Some(Ok(m)) => m,
            Some(Err(WsError::Capacity(e))) => {
                warn!("[webui] Oversized frame from {}: {}", peer, e);
                if let Some(upload) = pending.take() {
                    let ticket = upload.ticket;
                    let submission = upload.into_oversized(state.max_upload_bytes);
                    // The socket is unusable past this point; report inline, then close.
                    let region = page.region(submission.form);
                    let slot = page.slot(submission.form);
                    run_flow_with_ticket(
                        state.service.as_ref(),
                        &state.settings,
                        slot,
                        ticket,
                        &region,
                        submission,
                    )
                    .await;
                }
                break;
            }
            Some(Err(e)) => {
                warn!("[webui] WebSocket error from {}: {}", peer, e);
                break;
            }
            None => break,
        };

        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Viewport { width, height }) => {
                    debug!("[webui] {} container {}x{}", peer, width, height);
                    let _ = dims_tx.send(Dimensions::new(width, height));
                }
                Ok(ClientFrame::Submit { form, prompt, file }) => {
                    // Arrival order decides which submission owns the form.
                    let ticket = page.slot(form).begin();
                    match file {
                        Some(meta)
                            if meta.read_error.is_none()
                                && AttachmentPolicy::for_form(form).is_some() =>
                        {
                            if pending.is_some() {
                                warn!("[webui] {} replaced an upload that never arrived", peer);
                            }
                            pending = Some(PendingUpload { form, prompt, meta, ticket });
                        }
                        Some(meta) => {
                            let file = meta
                                .read_error
                                .map(|reason| FileSource::Failed { name: meta.name, reason });
                            let submission = Submission { form, prompt, file };
                            launch(&mut flows, &state, &page, ticket, submission);
                        }
                        None => {
                            let submission = Submission { form, prompt, file: None };
                            launch(&mut flows, &state, &page, ticket, submission);
                        }
                    }
                }
                Err(e) => warn!("[webui] Bad frame from {}: {}", peer, e),
            },
            WsMessage::Binary(bytes) => match pending.take() {
                Some(upload) => {
                    let ticket = upload.ticket;
                    let submission = upload.into_submission(bytes, state.max_upload_bytes);
                    launch(&mut flows, &state, &page, ticket, submission);
                }
                None => warn!("[webui] Unexpected binary frame from {}", peer),
            },
            WsMessage::Close(_) => {
                info!("[webui] {} disconnected", peer);
                break;
            }
            _ => {}
        }
    }

    if !flows.is_empty() {
        debug!("[webui] {} closed with {} flows running, aborting", peer, flows.len());
    }
    flows.shutdown().await;
    stars.abort();
    drop(page);

    // Let queued frames (a final error, say) reach the page before closing.
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
    Ok(())
}

fn launch(
    flows: &mut JoinSet<()>,
    state: &Arc<WebUiState>,
    page: &Arc<Page>,
    ticket: FlowTicket,
    submission: Submission,
) {
    let state = state.clone();
    let page = page.clone();
    flows.spawn(async move {
        let form = submission.form;
        let region = page.region(form);
        run_flow_with_ticket(
            state.service.as_ref(),
            &state.settings,
            page.slot(form),
            ticket,
            &region,
            submission,
        )
        .await;
    });
}
