// Gemstream Engine — streaming submission flows, rendering, star effect
// and the local web UI that hosts them.

pub mod config;
pub mod encoding;
pub mod flows;
pub mod providers;
pub mod render;
pub mod stars;
pub mod webui;
