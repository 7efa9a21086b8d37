// ── Gemstream Atoms: Request Types ─────────────────────────────────────────
// Plain data shared by the flows, the providers and the web UI.

use crate::atoms::constants::DEFAULT_MODEL;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Forms ──────────────────────────────────────────────────────────────────

/// The three independent submission surfaces on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormKind {
    Image,
    #[serde(alias = "pdf")]
    Document,
    Text,
}

impl FormKind {
    pub const ALL: [FormKind; 3] = [FormKind::Image, FormKind::Document, FormKind::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Image => "image",
            FormKind::Document => "document",
            FormKind::Text => "text",
        }
    }

    /// Position of this form in per-page slot arrays.
    pub fn index(&self) -> usize {
        match self {
            FormKind::Image => 0,
            FormKind::Document => 1,
            FormKind::Text => 2,
        }
    }
}

impl fmt::Display for FormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Content parts ──────────────────────────────────────────────────────────

/// A file ready to send: base64 payload plus its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    InlineData(Attachment),
    Text(String),
}

// ── Safety settings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockLowAndAbove,
    BlockMediumAndAbove,
    #[default]
    BlockOnlyHigh,
    BlockNone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

// ── Requests ───────────────────────────────────────────────────────────────

/// Model and safety configuration applied to every submission.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub safety_settings: Vec<SafetySetting>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            model: DEFAULT_MODEL.into(),
            safety_settings: vec![SafetySetting {
                category: HarmCategory::HarmCategoryHarassment,
                threshold: HarmBlockThreshold::BlockOnlyHigh,
            }],
        }
    }
}

/// A single-turn user request. Consumed once, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerateRequest {
    /// Build the request with the attachment part (if any) ahead of the text.
    pub fn single_turn(
        settings: &GenerationSettings,
        attachment: Option<Attachment>,
        prompt: impl Into<String>,
    ) -> Self {
        let mut parts = Vec::with_capacity(2);
        if let Some(att) = attachment {
            parts.push(ContentPart::InlineData(att));
        }
        parts.push(ContentPart::Text(prompt.into()));
        GenerateRequest {
            model: settings.model.clone(),
            parts,
            safety_settings: settings.safety_settings.clone(),
        }
    }

    /// The first inline attachment, if the request carries one.
    pub fn attachment(&self) -> Option<&Attachment> {
        self.parts.iter().find_map(|p| match p {
            ContentPart::InlineData(a) => Some(a),
            ContentPart::Text(_) => None,
        })
    }
}

// ── Star particles ─────────────────────────────────────────────────────────

pub type StarId = u64;

/// Pixel size of the particle container at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Dimensions { width, height }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// One decorative particle. Geometry is fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Star {
    pub id: StarId,
    pub size: f64,
    pub x: f64,
    pub y: f64,
    pub travel_x: f64,
    pub travel_y: f64,
    pub x_end: f64,
    pub y_end: f64,
    pub life_secs: u64,
    pub color: &'static str,
}

impl Star {
    pub fn life(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.life_secs)
    }

    /// CSS custom properties the page stylesheet animates.
    pub fn css_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("--start-left", format!("{}px", self.x)),
            ("--start-top", format!("{}px", self.y)),
            ("--end-left", format!("{}px", self.x_end)),
            ("--end-top", format!("{}px", self.y_end)),
            ("--star-life", format!("{}s", self.life_secs)),
            ("--star-life-num", self.life_secs.to_string()),
            ("--star-size", format!("{}px", self.size)),
            ("--star-color", self.color.to_string()),
        ]
    }
}
