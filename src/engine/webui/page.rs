// Gemstream Engine — Web UI Page Session
//
// One WebSocket connection is one page: three form slots, one outbound
// frame queue shared by every flow and the star effect, and the wire
// frames exchanged with the browser.

use crate::atoms::traits::{OutputRegion, StarStage};
use crate::atoms::types::{FormKind, Star, StarId};
use crate::engine::encoding::FileSource;
use crate::engine::flows::{FlowTicket, FormSlot, Submission};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ── Wire frames ────────────────────────────────────────────────────────

/// Browser → server. A `submit` whose file has no `read_error` is followed
/// by one binary frame holding the file bytes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ClientFrame {
    Viewport {
        width: f64,
        height: f64,
    },
    Submit {
        form: FormKind,
        #[serde(default)]
        prompt: String,
        #[serde(default)]
        file: Option<FileMeta>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FileMeta {
    pub name: String,
    /// Browser-declared type; empty when the browser could not tell.
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub read_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum OutputMode {
    Replace,
    Append,
}

/// Server → browser.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ServerFrame {
    Output { form: FormKind, mode: OutputMode, html: String },
    StarMount { id: StarId, vars: Vec<(&'static str, String)> },
    StarUnmount { id: StarId },
}

// ── Upload awaiting its binary frame ───────────────────────────────────

/// A submit frame whose file bytes have not arrived yet. The ticket is
/// taken when the submit frame is received.
#[derive(Debug)]
pub(crate) struct PendingUpload {
    pub form: FormKind,
    pub prompt: String,
    pub meta: FileMeta,
    pub ticket: FlowTicket,
}

impl PendingUpload {
    /// Bytes above `limit` become a read failure instead of an attachment.
    pub fn into_submission(self, bytes: Vec<u8>, limit: usize) -> Submission {
        if bytes.len() > limit {
            let size = bytes.len();
            return self.failed(format!("file is {size} bytes, over the {limit} byte upload limit"));
        }
        let declared_type = Some(self.meta.media_type).filter(|t| !t.is_empty());
        Submission {
            form: self.form,
            prompt: self.prompt,
            file: Some(FileSource::Loaded { name: self.meta.name, declared_type, bytes }),
        }
    }

    /// The binary frame was refused by the socket before it could be read.
    pub fn into_oversized(self, limit: usize) -> Submission {
        self.failed(format!("file is over the {limit} byte upload limit"))
    }

    fn failed(self, reason: String) -> Submission {
        Submission {
            form: self.form,
            prompt: self.prompt,
            file: Some(FileSource::Failed { name: self.meta.name, reason }),
        }
    }
}

// ── Page ───────────────────────────────────────────────────────────────

pub(crate) struct Page {
    slots: [FormSlot; 3],
    outbound: mpsc::UnboundedSender<ServerFrame>,
}

impl Page {
    pub fn new(outbound: mpsc::UnboundedSender<ServerFrame>) -> Self {
        Page { slots: Default::default(), outbound }
    }

    pub fn slot(&self, form: FormKind) -> &FormSlot {
        &self.slots[form.index()]
    }

    pub fn region(&self, form: FormKind) -> WsRegion {
        WsRegion { form, outbound: self.outbound.clone() }
    }

    pub fn stage(&self) -> WsStarStage {
        WsStarStage { outbound: self.outbound.clone() }
    }
}

/// A form's output element, addressed by form name on the page.
pub(crate) struct WsRegion {
    form: FormKind,
    outbound: mpsc::UnboundedSender<ServerFrame>,
}

impl WsRegion {
    fn send(&self, mode: OutputMode, html: String) {
        // A closed queue means the page is gone; nothing left to update.
        let _ = self.outbound.send(ServerFrame::Output { form: self.form, mode, html });
    }
}

impl OutputRegion for WsRegion {
    fn replace(&self, html: String) {
        self.send(OutputMode::Replace, html);
    }

    fn append(&self, html: String) {
        self.send(OutputMode::Append, html);
    }
}

/// The page's `.sparkle` container.
pub(crate) struct WsStarStage {
    outbound: mpsc::UnboundedSender<ServerFrame>,
}

impl StarStage for WsStarStage {
    fn mount(&self, star: &Star) {
        let _ = self.outbound.send(ServerFrame::StarMount { id: star.id, vars: star.css_vars() });
    }

    fn unmount(&self, id: StarId) {
        let _ = self.outbound.send(ServerFrame::StarUnmount { id });
    }
}
