//! Markdown rendering for streamed responses using `pulldown-cmark`.
//!
//! Every update re-renders the whole accumulated text; there is no diffing.

use crate::atoms::constants::{ERROR_SEPARATOR, LOADING_TEXT};
use pulldown_cmark::{html, Event, Options, Parser};
use std::fmt::Display;

fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

/// Render markdown to HTML. Raw HTML in the source is shown as text.
pub fn render_markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, options()).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// HTML-escape plain text.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    html::push_html(&mut out, std::iter::once(Event::Text(text.into())));
    out
}

pub fn loading_html() -> String {
    escape_text(LOADING_TEXT)
}

/// Separator followed by the error's description, for appending.
pub fn error_html(err: &dyn Display) -> String {
    format!("{ERROR_SEPARATOR}{}", escape_text(&err.to_string()))
}

/// All fragments received so far for one in-flight submission.
#[derive(Debug, Default)]
pub struct RenderBuffer {
    fragments: Vec<String>,
}

impl RenderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    /// Number of fragments received.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Concatenation of all fragments in arrival order.
    pub fn text(&self) -> String {
        self.fragments.concat()
    }

    pub fn render(&self) -> String {
        render_markdown(&self.text())
    }
}
