//! quire renderer
//!
//! Turns what the service returns into something a host can display:
//! theme tokens become a scoped stylesheet ([`theme`]) and rendered HTML is
//! sanitized once more before it reaches the preview ([`preview`]).

pub mod preview;
pub mod theme;

pub use preview::{
    DEFAULT_IFRAME_HOSTS, DEFAULT_THEME_CSS, PreviewFrame, PreviewRenderer, SanitizerConfig,
};
pub use theme::{ResolvedTheme, SCOPE_SELECTOR, ThemeKey, ThemeTokens, resolve};
