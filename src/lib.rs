// Gemstream — streams Gemini responses for text, image and PDF prompts into
// rendered markdown, behind a small local web page with a star effect.

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::traits::{FragmentStream, GenerationService, OutputRegion, StarStage};
pub use atoms::types::{
    Attachment, ContentPart, Dimensions, FormKind, GenerateRequest, GenerationSettings, Star,
    StarId,
};
pub use engine::config::AppConfig;
pub use engine::encoding::FileSource;
pub use engine::flows::{
    run_flow, run_flow_with_ticket, FlowOutcome, FlowTicket, FormSlot, Submission,
};
pub use engine::providers::GoogleProvider;
pub use engine::render::{render_markdown, RenderBuffer};
pub use engine::stars::{StarEffect, StarField};
pub use engine::webui::{serve, serve_listener, WebUiState};
