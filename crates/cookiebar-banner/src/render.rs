//! Consent banner markup.
//!
//! Output is a pure function of settings and categories. The accessibility
//! attributes on the root dialog and the restriction of `tabindex` to `0`
//! and `-1` are part of the banner's contract with front-end scripts and
//! assistive technology.

use std::collections::BTreeMap;
use std::fmt::Write;

use cookiebar_core::{CategoryKey, CookieCategory, PluginSettings};

use crate::html_escape;

pub const BANNER_ID: &str = "cookiebar-banner";
pub const TITLE_ID: &str = "cookiebar-title";
pub const DESCRIPTION_ID: &str = "cookiebar-description";
pub const SETTINGS_PANEL_ID: &str = "cookiebar-settings";

/// Render the consent banner.
pub fn generate_banner_html(
    settings: &PluginSettings,
    categories: &BTreeMap<CategoryKey, CookieCategory>,
) -> String {
    let position = settings.banner_position;
    let mut html = String::with_capacity(4096);

    let _ = write!(
        html,
        r#"<div id="{BANNER_ID}" class="cookiebar-banner cookiebar-position-{pos_class}" data-position="{pos}" role="dialog" aria-modal="false" aria-labelledby="{TITLE_ID}" aria-describedby="{DESCRIPTION_ID}" tabindex="-1" style="--cookiebar-primary: {color};" data-expiry-days="{expiry}">"#,
        pos_class = position.css_class(),
        pos = position.as_str(),
        color = html_escape(&settings.primary_color),
        expiry = settings.consent_expiry_days,
    );

    let _ = write!(
        html,
        r#"<div class="cookiebar-content"><h2 id="{TITLE_ID}" class="cookiebar-title">{title}</h2><p id="{DESCRIPTION_ID}" class="cookiebar-description">{text}"#,
        title = html_escape(&settings.banner_title),
        text = html_escape(&settings.banner_text),
    );
    html.push_str(&policy_links(settings));
    html.push_str("</p></div>");

    // Primary actions
    html.push_str(r#"<div class="cookiebar-actions">"#);
    let _ = write!(
        html,
        r#"<button type="button" class="cookiebar-button cookiebar-accept-all" data-action="accept-all" tabindex="0">{}</button>"#,
        html_escape(&settings.accept_all_text)
    );
    if settings.show_reject_button {
        let _ = write!(
            html,
            r#"<button type="button" class="cookiebar-button cookiebar-reject-all" data-action="reject-all" tabindex="0">{}</button>"#,
            html_escape(&settings.reject_all_text)
        );
    }
    let _ = write!(
        html,
        r#"<button type="button" class="cookiebar-button cookiebar-open-settings" data-action="open-settings" aria-expanded="false" aria-controls="{SETTINGS_PANEL_ID}" tabindex="0">{}</button>"#,
        html_escape(&settings.settings_text)
    );
    html.push_str("</div>");

    // Preferences panel
    let _ = write!(
        html,
        r#"<div id="{SETTINGS_PANEL_ID}" class="cookiebar-settings" role="group" aria-label="{}" hidden>"#,
        html_escape(&settings.settings_text)
    );
    for category in categories.values() {
        html.push_str(&render_category(category));
    }
    let _ = write!(
        html,
        r#"<button type="button" class="cookiebar-button cookiebar-save-preferences" data-action="save-preferences" tabindex="0">{}</button>"#,
        html_escape(&settings.save_preferences_text)
    );
    html.push_str("</div></div>");
    html
}

fn policy_links(settings: &PluginSettings) -> String {
    let mut links = String::new();
    for (url, label) in [
        (&settings.privacy_policy_url, "Privacy Policy"),
        (&settings.cookie_policy_url, "Cookie Policy"),
    ] {
        if !url.is_empty() {
            let _ = write!(
                links,
                r#" <a href="{}" class="cookiebar-policy-link" tabindex="0">{}</a>"#,
                html_escape(url),
                label
            );
        }
    }
    links
}

/// Required categories get a static "always active" marker; all others a
/// switch that starts off.
fn render_category(category: &CookieCategory) -> String {
    let key = category.key.as_str();
    let title = html_escape(&category.title);
    let description = html_escape(&category.description);
    let desc_id = format!("cookiebar-category-{}-description", key);

    let control = if category.required {
        r#"<span class="cookiebar-always-active">Always active</span>"#.to_string()
    } else {
        format!(
            r#"<input type="checkbox" id="cookiebar-toggle-{key}" class="cookiebar-toggle" name="cookiebar_categories[]" value="{key}" role="switch" aria-checked="false" aria-describedby="{desc_id}" tabindex="0">"#
        )
    };

    let label = if category.required {
        format!(r#"<span class="cookiebar-category-title">{title}</span>"#)
    } else {
        format!(r#"<label for="cookiebar-toggle-{key}" class="cookiebar-category-title">{title}</label>"#)
    };

    format!(
        r#"<div class="cookiebar-category" data-category="{key}" data-required="{required}"><div class="cookiebar-category-header">{label}{control}</div><p id="{desc_id}" class="cookiebar-category-description">{description}</p></div>"#,
        required = category.required,
    )
}
