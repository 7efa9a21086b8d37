// Gemstream Engine — Submission Flows
//
// One flow per form submission:
//   loading indicator → gather input (encode file for image/document)
//   → streaming generation → re-render the whole buffer on every fragment.
// Any failure appends a separator and the error text to whatever output
// already exists.
//
// Re-entrancy: each form owns a `FormSlot`. Receiving a submission takes a
// fresh ticket; an older flow that finds its ticket stale stops writing and
// drops its stream, so only the newest submission owns the output region.
// Callers that spawn flows take the ticket before spawning, so arrival order
// decides ownership rather than task scheduling.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{GenerationService, OutputRegion};
use crate::atoms::types::{FormKind, GenerateRequest, GenerationSettings};
use crate::engine::encoding::{encode_file, AttachmentPolicy, FileSource};
use crate::engine::render::{error_html, loading_html, RenderBuffer};
use futures::StreamExt;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};

/// Input gathered from one form at submit time.
#[derive(Debug, Clone)]
pub struct Submission {
    pub form: FormKind,
    pub prompt: String,
    pub file: Option<FileSource>,
}

impl Submission {
    pub fn text(prompt: impl Into<String>) -> Self {
        Submission { form: FormKind::Text, prompt: prompt.into(), file: None }
    }

    pub fn image(file: Option<FileSource>, prompt: impl Into<String>) -> Self {
        Submission { form: FormKind::Image, prompt: prompt.into(), file }
    }

    pub fn document(file: Option<FileSource>, prompt: impl Into<String>) -> Self {
        Submission { form: FormKind::Document, prompt: prompt.into(), file }
    }
}

/// Identifies one submission on a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTicket(u64);

/// Per-form generation counter. The latest ticket owns the output region.
#[derive(Debug, Default)]
pub struct FormSlot {
    generation: AtomicU64,
}

impl FormSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new submission, superseding any earlier one.
    pub fn begin(&self) -> FlowTicket {
        FlowTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: FlowTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Stream ended normally after `fragments` fragments.
    Completed { fragments: usize },
    /// An error was appended to the output region.
    Failed,
    /// A newer submission on the same form took over the region.
    Superseded,
}

/// Run one submission to completion against `region`.
pub async fn run_flow(
    service: &dyn GenerationService,
    settings: &GenerationSettings,
    slot: &FormSlot,
    region: &dyn OutputRegion,
    submission: Submission,
) -> FlowOutcome {
    let ticket = slot.begin();
    run_flow_with_ticket(service, settings, slot, ticket, region, submission).await
}

/// Like [`run_flow`], for a ticket taken when the submission was received.
pub async fn run_flow_with_ticket(
    service: &dyn GenerationService,
    settings: &GenerationSettings,
    slot: &FormSlot,
    ticket: FlowTicket,
    region: &dyn OutputRegion,
    submission: Submission,
) -> FlowOutcome {
    let form = submission.form;
    if !slot.is_current(ticket) {
        debug!("[flow:{}] Superseded before it started", form);
        return FlowOutcome::Superseded;
    }
    region.replace(loading_html());
    info!("[flow:{}] Submission started ({} chars)", form, submission.prompt.len());

    match drive(service, settings, slot, ticket, region, submission).await {
        Ok(outcome) => {
            debug!("[flow:{}] Finished: {:?}", form, outcome);
            outcome
        }
        Err(e) if slot.is_current(ticket) => {
            warn!("[flow:{}] {}", form, e);
            region.append(error_html(&e));
            FlowOutcome::Failed
        }
        Err(e) => {
            debug!("[flow:{}] Superseded flow failed quietly: {}", form, e);
            FlowOutcome::Superseded
        }
    }
}

async fn drive(
    service: &dyn GenerationService,
    settings: &GenerationSettings,
    slot: &FormSlot,
    ticket: FlowTicket,
    region: &dyn OutputRegion,
    submission: Submission,
) -> EngineResult<FlowOutcome> {
    let Submission { form, prompt, file } = submission;

    let attachment = match AttachmentPolicy::for_form(form) {
        Some(policy) => {
            let source = file.ok_or(EngineError::MissingAttachment(form))?;
            Some(encode_file(source, policy).await?)
        }
        None => {
            if file.is_some() {
                debug!("[flow:{}] Ignoring attached file on text form", form);
            }
            None
        }
    };

    let request = GenerateRequest::single_turn(settings, attachment, prompt);
    let mut stream = service.stream_generate(&request).await?;

    let mut buffer = RenderBuffer::new();
    while let Some(fragment) = stream.next().await {
        if !slot.is_current(ticket) {
            debug!(
                "[flow:{}] Superseded after {} fragments, dropping stream",
                form,
                buffer.len()
            );
            return Ok(FlowOutcome::Superseded);
        }
        buffer.push(fragment?);
        region.replace(buffer.render());
    }

    Ok(FlowOutcome::Completed { fragments: buffer.len() })
}
