//! Preview output.
//!
//! The service sanitizes on every render, but the preview runs the HTML
//! through the same allowlist again before anything is displayed.

use std::collections::{HashMap, HashSet};
use std::fmt;

use ammonia::Builder;
use quire_core::RenderResult;
use smol_str::SmolStr;
use url::Url;

use crate::theme::SCOPE_SELECTOR;

/// Stylesheet used until a render or a theme resolution provides one.
pub const DEFAULT_THEME_CSS: &str = ".editor-content{}";

pub const DEFAULT_IFRAME_HOSTS: [&str; 4] = [
    "youtube.com",
    "www.youtube.com",
    "youtu.be",
    "player.vimeo.com",
];

const ALLOWED_TAGS: &[&str] = &[
    "div", "span", "p", "br", "hr", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6", "strong",
    "em", "u", "s", "code", "ul", "ol", "li", "pre", "a", "img", "figure", "figcaption", "table",
    "thead", "tbody", "tr", "th", "td", "iframe",
];

const IFRAME_SANDBOX: &str = "allow-scripts allow-same-origin allow-popups";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizerConfig {
    /// Hosts an `<iframe src>` may point at. Compared case-insensitively.
    pub allowed_iframe_hosts: Vec<SmolStr>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            allowed_iframe_hosts: DEFAULT_IFRAME_HOSTS.into_iter().map(SmolStr::new).collect(),
        }
    }
}

/// What the host should display: sanitized body HTML plus its stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFrame {
    pub html: String,
    pub css: String,
}

impl PreviewFrame {
    /// Standalone fragment: a `<style>` element followed by the scoped container.
    pub fn to_html(&self) -> String {
        format!(
            "<style>{}</style><div class=\"{}\">{}</div>",
            self.css.replace("</", "<\\/"),
            SCOPE_SELECTOR.trim_start_matches('.'),
            self.html
        )
    }
}

/// Holds the last displayed HTML and CSS.
pub struct PreviewRenderer {
    sanitizer: Builder<'static>,
    html: String,
    css: String,
}

impl PreviewRenderer {
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            sanitizer: build_sanitizer(config),
            html: String::new(),
            css: DEFAULT_THEME_CSS.to_owned(),
        }
    }

    /// Replace the displayed content with a render result.
    pub fn apply(&mut self, result: &RenderResult) {
        self.html = self.sanitize(&result.content_html);
        self.css = result.theme_css.clone();
        for warning in &result.warnings {
            tracing::debug!(%warning, "render warning");
        }
    }

    /// Replace only the stylesheet, e.g. after a local theme edit.
    pub fn set_theme_css(&mut self, css: impl Into<String>) {
        self.css = css.into();
    }

    pub fn sanitize(&self, html: &str) -> String {
        self.sanitizer.clean(html).to_string()
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn css(&self) -> &str {
        &self.css
    }

    pub fn frame(&self) -> PreviewFrame {
        PreviewFrame {
            html: self.html.clone(),
            css: self.css.clone(),
        }
    }
}

impl Default for PreviewRenderer {
    fn default() -> Self {
        Self::new(&SanitizerConfig::default())
    }
}

impl fmt::Debug for PreviewRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewRenderer")
            .field("html", &self.html)
            .field("css", &self.css)
            .finish_non_exhaustive()
    }
}

fn build_sanitizer(config: &SanitizerConfig) -> Builder<'static> {
    let hosts = config.allowed_iframe_hosts.clone();

    let mut builder = Builder::empty();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .generic_attributes(HashSet::from(["class", "id", "title"]))
        .generic_attribute_prefixes(HashSet::from(["aria-", "data-"]))
        .tag_attributes(HashMap::from([
            ("a", HashSet::from(["href", "target"])),
            (
                "img",
                HashSet::from(["src", "alt", "width", "height", "loading"]),
            ),
            (
                "iframe",
                HashSet::from([
                    "src",
                    "width",
                    "height",
                    "allow",
                    "allowfullscreen",
                    "frameborder",
                ]),
            ),
            ("th", HashSet::from(["colspan", "rowspan"])),
            ("td", HashSet::from(["colspan", "rowspan"])),
        ]))
        .clean_content_tags(HashSet::from(["script", "style"]))
        .url_schemes(HashSet::from(["http", "https", "data"]))
        .link_rel(Some("noopener noreferrer"))
        .set_tag_attribute_value("iframe", "sandbox", IFRAME_SANDBOX)
        .set_tag_attribute_value("iframe", "referrerpolicy", "no-referrer")
        .attribute_filter(move |element, attribute, value| {
            if element == "iframe" && attribute == "src" && !iframe_src_allowed(&hosts, value) {
                tracing::debug!(src = value, "dropping iframe src outside the host allowlist");
                return None;
            }
            Some(value.into())
        });
    builder
}

fn iframe_src_allowed(hosts: &[SmolStr], src: &str) -> bool {
    let Ok(url) = Url::parse(src) else {
        return false;
    };
    url.host_str()
        .is_some_and(|host| hosts.iter().any(|allowed| allowed.eq_ignore_ascii_case(host)))
}
