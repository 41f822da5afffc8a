//! Banner rendering: consent banner markup, third-party consent
//! integration snippets and content shortcodes.

pub mod integrations;
pub mod render;
pub mod shortcodes;

pub use integrations::{consent_mode_signals, render_head_scripts};
pub use render::generate_banner_html;
pub use shortcodes::{render_shortcodes, ShortcodeContext};

/// Escape text for use in HTML content and double-quoted attributes.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
