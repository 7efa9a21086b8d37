// ── Gemstream Atoms: Seam Traits ───────────────────────────────────────────
// The three boundaries the engine talks through: the generation service,
// an output display region, and the particle container.

use crate::atoms::error::EngineResult;
use crate::atoms::types::{GenerateRequest, Star, StarId};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Ordered, finite sequence of text fragments. Not restartable.
pub type FragmentStream = Pin<Box<dyn Stream<Item = EngineResult<String>> + Send>>;

/// A streaming text-generation backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &str;

    /// Start a streaming generation. Errors before the first fragment are
    /// returned here; later failures arrive as `Err` items in the stream.
    async fn stream_generate(&self, request: &GenerateRequest) -> EngineResult<FragmentStream>;
}

/// One form's output display region.
pub trait OutputRegion: Send + Sync {
    /// Replace everything shown with `html`.
    fn replace(&self, html: String);
    /// Add `html` after what is already shown.
    fn append(&self, html: String);
}

/// The page region that hosts star particles.
pub trait StarStage: Send + Sync {
    fn mount(&self, star: &Star);
    fn unmount(&self, id: StarId);
}
