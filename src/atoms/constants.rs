// ── Gemstream Atoms: Constants ─────────────────────────────────────────────
// All named constants for the crate live here.

use std::time::Duration;

// ── Generation service ─────────────────────────────────────────────────────
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Env var that overrides the API key from the config file.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

// ── Submission flows ───────────────────────────────────────────────────────
pub const LOADING_TEXT: &str = "Generating...";
/// Visible separator placed between partial output and an error description.
pub const ERROR_SEPARATOR: &str = "<hr>";
/// Used when the selected image carries no declared media type.
pub const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/jpeg";
pub const DOCUMENT_MEDIA_TYPE: &str = "application/pdf";

// ── Star effect ────────────────────────────────────────────────────────────
pub const MAX_STARS: usize = 40;
pub const STAR_INTERVAL: Duration = Duration::from_millis(16);

pub const MAX_STAR_LIFE_SECS: u64 = 2;
pub const MIN_STAR_LIFE_SECS: u64 = 1;

pub const MAX_STAR_SIZE: f64 = 60.0;
pub const MIN_STAR_SIZE: f64 = 20.0;

pub const MIN_STAR_TRAVEL_X: f64 = 100.0;
pub const MIN_STAR_TRAVEL_Y: f64 = 70.0;

pub const STAR_COLOR: &str = "#113768";

// ── Web UI ─────────────────────────────────────────────────────────────────
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3939;
pub const DEFAULT_PAGE_TITLE: &str = "Gemstream";
/// Largest file the page may upload in one binary frame.
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
