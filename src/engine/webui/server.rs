// Gemstream Engine — Web UI Server Core
//
// TCP listener, HTTP routing and stream utilities.

use super::html::build_page_html;
use super::{handle_websocket, WebUiState};

use crate::atoms::error::EngineResult;
use log::{debug, info, warn};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

// ── Prefixed Stream (replays buffered bytes then delegates) ────────────

pub(crate) struct PrefixedStream<S> {
    prefix: Vec<u8>,
    pos: usize,
    inner: S,
}

impl<S> PrefixedStream<S> {
    pub fn new(prefix: Vec<u8>, inner: S) -> Self {
        Self { prefix, pos: 0, inner }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrefixedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.prefix.len() {
            let remaining = &this.prefix[this.pos..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

// ── Server Core ────────────────────────────────────────────────────────

pub(crate) async fn run_server(listener: TcpListener, state: Arc<WebUiState>) -> EngineResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("[webui] Listening on http://{}", addr);
    }

    loop {
        match listener.accept().await {
            Ok((tcp_stream, peer)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(tcp_stream, peer, state).await {
                        warn!("[webui] Connection error from {}: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                warn!("[webui] Accept error: {}", e);
            }
        }
    }
}

// ── Connection Handler ─────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Route {
    WebSocket,
    Page,
    NotFound,
}

fn route(request: &str) -> Route {
    let first_line = request.lines().next().unwrap_or("");
    let mut words = first_line.split_whitespace();
    let method = words.next().unwrap_or("");
    let path = words.next().unwrap_or("");
    let path = path.split('?').next().unwrap_or("");
    let is_websocket = request.to_ascii_lowercase().contains("upgrade: websocket");

    match (method, path) {
        ("GET", "/ws") if is_websocket => Route::WebSocket,
        ("GET", "/") | ("GET", "/index.html") => Route::Page,
        _ => Route::NotFound,
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: std::net::SocketAddr,
    state: Arc<WebUiState>,
) -> EngineResult<()> {
    // Read the HTTP request (consumed — PrefixedStream replays it for WS)
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await.map_err(|e| format!("Read: {e}"))?;
    if n == 0 {
        return Ok(());
    }
    buf.truncate(n);

    let request_str = String::from_utf8_lossy(&buf).into_owned();
    match route(&request_str) {
        Route::WebSocket => {
            info!("[webui] WebSocket connection from {}", peer);
            let prefixed = PrefixedStream::new(buf, stream);
            handle_websocket(prefixed, peer, state).await
        }
        Route::Page => serve_html(stream, &state).await,
        Route::NotFound => {
            debug!("[webui] 404 for {}: {}", peer, request_str.lines().next().unwrap_or(""));
            let resp = "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 9\r\nConnection: close\r\n\r\nNot found";
            stream.write_all(resp.as_bytes()).await.map_err(|e| format!("Write 404: {e}"))?;
            Ok(())
        }
    }
}

// ── HTML Page ──────────────────────────────────────────────────────────

async fn serve_html(mut stream: TcpStream, state: &WebUiState) -> EngineResult<()> {
    let html = build_page_html(&state.page_title, state.max_upload_bytes);
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        html.len(),
        html
    );

    stream.write_all(response.as_bytes()).await.map_err(|e| format!("Write HTML: {e}"))?;
    Ok(())
}
