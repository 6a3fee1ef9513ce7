//! Theme tokens and the scoped stylesheet built from them.
//!
//! A document stores a partial mapping of overrides. Resolution fills in the
//! defaults and emits one rule that sets a CSS custom property per token on
//! the preview container. The service computes the same stylesheet on
//! render; the client uses this to update the preview before the round trip.

use quire_core::StyleTokens;
use smol_str::SmolStr;

/// Selector of the element the preview content lives in.
pub const SCOPE_SELECTOR: &str = ".editor-content";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ThemeKey {
    FontFamily,
    FontSize,
    LineHeight,
    MaxWidth,
    TextColor,
    LinkColor,
    CodeBg,
    Radius,
    Spacing,
}

impl ThemeKey {
    /// Every key, in stylesheet order.
    pub const ALL: [ThemeKey; 9] = [
        ThemeKey::FontFamily,
        ThemeKey::FontSize,
        ThemeKey::LineHeight,
        ThemeKey::MaxWidth,
        ThemeKey::TextColor,
        ThemeKey::LinkColor,
        ThemeKey::CodeBg,
        ThemeKey::Radius,
        ThemeKey::Spacing,
    ];

    /// Key as stored in a document's style tokens.
    pub fn name(self) -> &'static str {
        match self {
            ThemeKey::FontFamily => "fontFamily",
            ThemeKey::FontSize => "fontSize",
            ThemeKey::LineHeight => "lineHeight",
            ThemeKey::MaxWidth => "maxWidth",
            ThemeKey::TextColor => "textColor",
            ThemeKey::LinkColor => "linkColor",
            ThemeKey::CodeBg => "codeBg",
            ThemeKey::Radius => "radius",
            ThemeKey::Spacing => "spacing",
        }
    }

    pub fn css_var(self) -> &'static str {
        match self {
            ThemeKey::FontFamily => "--ed-font-family",
            ThemeKey::FontSize => "--ed-font-size",
            ThemeKey::LineHeight => "--ed-line-height",
            ThemeKey::MaxWidth => "--ed-max-width",
            ThemeKey::TextColor => "--ed-text-color",
            ThemeKey::LinkColor => "--ed-link-color",
            ThemeKey::CodeBg => "--ed-code-bg",
            ThemeKey::Radius => "--ed-radius",
            ThemeKey::Spacing => "--ed-spacing",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }
}

/// A complete set of theme values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeTokens {
    pub font_family: SmolStr,
    pub font_size: SmolStr,
    pub line_height: SmolStr,
    pub max_width: SmolStr,
    pub text_color: SmolStr,
    pub link_color: SmolStr,
    pub code_bg: SmolStr,
    pub radius: SmolStr,
    pub spacing: SmolStr,
}

impl Default for ThemeTokens {
    fn default() -> Self {
        Self {
            font_family: SmolStr::new("Inter, system-ui, sans-serif"),
            font_size: SmolStr::new("16px"),
            line_height: SmolStr::new("1.7"),
            max_width: SmolStr::new("760px"),
            text_color: SmolStr::new("#111111"),
            link_color: SmolStr::new("#0b66ff"),
            code_bg: SmolStr::new("#f6f8fa"),
            radius: SmolStr::new("10px"),
            spacing: SmolStr::new("1rem"),
        }
    }
}

impl ThemeTokens {
    pub fn get(&self, key: ThemeKey) -> &SmolStr {
        match key {
            ThemeKey::FontFamily => &self.font_family,
            ThemeKey::FontSize => &self.font_size,
            ThemeKey::LineHeight => &self.line_height,
            ThemeKey::MaxWidth => &self.max_width,
            ThemeKey::TextColor => &self.text_color,
            ThemeKey::LinkColor => &self.link_color,
            ThemeKey::CodeBg => &self.code_bg,
            ThemeKey::Radius => &self.radius,
            ThemeKey::Spacing => &self.spacing,
        }
    }

    fn slot(&mut self, key: ThemeKey) -> &mut SmolStr {
        match key {
            ThemeKey::FontFamily => &mut self.font_family,
            ThemeKey::FontSize => &mut self.font_size,
            ThemeKey::LineHeight => &mut self.line_height,
            ThemeKey::MaxWidth => &mut self.max_width,
            ThemeKey::TextColor => &mut self.text_color,
            ThemeKey::LinkColor => &mut self.link_color,
            ThemeKey::CodeBg => &mut self.code_bg,
            ThemeKey::Radius => &mut self.radius,
            ThemeKey::Spacing => &mut self.spacing,
        }
    }

    pub fn set(&mut self, key: ThemeKey, value: impl Into<SmolStr>) {
        *self.slot(key) = value.into();
    }

    /// Defaults with every recognized key of `overrides` applied.
    pub fn with_overrides(overrides: &StyleTokens) -> Self {
        let mut tokens = Self::default();
        for (name, value) in overrides {
            match ThemeKey::from_name(name) {
                Some(key) => tokens.set(key, value.as_str()),
                None => tracing::trace!(%name, "ignoring unknown style token"),
            }
        }
        tokens
    }

    /// Every key with its value, suitable for storing on a document.
    pub fn to_style_tokens(&self) -> StyleTokens {
        ThemeKey::ALL
            .into_iter()
            .map(|key| (key.name().to_owned(), self.get(key).to_string()))
            .collect()
    }

    /// `.editor-content{--ed-font-family:...;--ed-font-size:...}` in key order.
    pub fn to_scoped_css(&self) -> String {
        let declarations: Vec<String> = ThemeKey::ALL
            .into_iter()
            .map(|key| format!("{}:{}", key.css_var(), css_value(self.get(key))))
            .collect();
        format!("{}{{{}}}", SCOPE_SELECTOR, declarations.join(";"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTheme {
    pub tokens: ThemeTokens,
    pub css: String,
}

/// Merge `overrides` over the defaults and build the stylesheet.
///
/// Total: unknown keys are ignored and every key ends up with a value.
pub fn resolve(overrides: &StyleTokens) -> ResolvedTheme {
    let tokens = ThemeTokens::with_overrides(overrides);
    let css = tokens.to_scoped_css();
    ResolvedTheme { tokens, css }
}

/// Strip characters that would end the declaration, the rule or the
/// surrounding `<style>` element.
fn css_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ';' | '{' | '}' | '<'))
        .collect()
}
