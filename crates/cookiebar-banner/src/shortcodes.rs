//! Content shortcodes: `[cookie_settings]` and `[show_my_consent_data]`.

use std::collections::BTreeMap;
use std::fmt::Write;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use cookiebar_core::consent::ConsentData;
use cookiebar_core::{CategoryKey, ConsentRecord, CookieCategory};

use crate::html_escape;

static SHORTCODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(cookie_settings|show_my_consent_data)(\s[^\]]*)?\]").unwrap()
});
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"']+))"#).unwrap()
});

const DEFAULT_LINK_TEXT: &str = "Cookie Settings";

/// What shortcodes may draw on when expanding.
pub struct ShortcodeContext<'a> {
    pub categories: &'a BTreeMap<CategoryKey, CookieCategory>,
    /// The current visitor's latest consent record, if any.
    pub visitor_record: Option<&'a ConsentRecord>,
}

/// Expand every known shortcode in `content`. Anything else is left as is.
pub fn render_shortcodes(content: &str, ctx: &ShortcodeContext<'_>) -> String {
    SHORTCODE_RE
        .replace_all(content, |caps: &Captures<'_>| {
            let attrs = parse_attrs(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
            match &caps[1] {
                "cookie_settings" => cookie_settings_link(&attrs),
                "show_my_consent_data" => consent_data_table(ctx),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn parse_attrs(raw: &str) -> BTreeMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");
            (c[1].to_ascii_lowercase(), value.to_string())
        })
        .collect()
}

/// `[cookie_settings text=".." class=".."]`: a link that reopens the banner.
fn cookie_settings_link(attrs: &BTreeMap<String, String>) -> String {
    let text = attrs
        .get("text")
        .map(String::as_str)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_LINK_TEXT);
    let class = attrs
        .get("class")
        .map(|c| format!(" {}", html_escape(c.trim())))
        .unwrap_or_default();
    format!(
        r##"<a href="#" class="cookiebar-open-settings{class}" data-action="open-settings" role="button">{text}</a>"##,
        text = html_escape(text),
    )
}

/// `[show_my_consent_data]`: the visitor's latest stored decision.
fn consent_data_table(ctx: &ShortcodeContext<'_>) -> String {
    let Some(record) = ctx.visitor_record else {
        return r#"<p class="cookiebar-no-consent">No consent has been recorded for you yet.</p>"#
            .to_string();
    };
    let data: ConsentData = record.data().unwrap_or_default();

    let mut html = String::from(r#"<table class="cookiebar-my-consent"><tbody>"#);
    let _ = write!(
        html,
        "<tr><th>Date</th><td>{}</td></tr>",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for category in ctx.categories.values() {
        let status = if data.allows(category.key) { "Allowed" } else { "Denied" };
        let _ = write!(
            html,
            r#"<tr data-category="{}"><th>{}</th><td>{}</td></tr>"#,
            category.key,
            html_escape(&category.title),
            status
        );
    }
    if !data.consent_source.is_empty() {
        let _ = write!(
            html,
            "<tr><th>Source</th><td>{}</td></tr>",
            html_escape(&data.consent_source)
        );
    }
    html.push_str("</tbody></table>");
    html
}
