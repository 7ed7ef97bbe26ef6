//! Colors and styles.
//!
//! Colors are hex strings so the `theme:` section of the config file can
//! override any of them; [`Theme`] resolves them to ratatui styles.

use ratatui::style::{Color, Modifier, Style};
use serde::{Deserialize, Serialize};

use crate::classify::{ColorClass, LevelHint};
use crate::preview::JsonValueKind;

/// Theme configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    /// Header and banner background.
    #[serde(default = "default_header_bg")]
    pub header_bg: String,

    /// Header and banner foreground.
    #[serde(default = "default_header_fg")]
    pub header_fg: String,

    /// Function-call argument streams.
    #[serde(default = "default_args")]
    pub args: String,

    /// Output text streams.
    #[serde(default = "default_output")]
    pub output: String,

    /// Tool events.
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Errors.
    #[serde(default = "default_error")]
    pub error: String,

    /// Highlighted previews and INFO badges.
    #[serde(default = "default_notice")]
    pub notice: String,

    /// Everything else.
    #[serde(default = "default_text")]
    pub text: String,

    /// Footer and secondary text.
    #[serde(default = "default_dim")]
    pub dim: String,
}

fn default_header_bg() -> String {
    "#2d4f8b".to_string()
}
fn default_header_fg() -> String {
    "#ffffff".to_string()
}
fn default_args() -> String {
    "#7dcfff".to_string()
}
fn default_output() -> String {
    "#9ece6a".to_string()
}
fn default_tool() -> String {
    "#bb9af7".to_string()
}
fn default_error() -> String {
    "#f7768e".to_string()
}
fn default_notice() -> String {
    "#e0af68".to_string()
}
fn default_text() -> String {
    "#c0caf5".to_string()
}
fn default_dim() -> String {
    "#565f89".to_string()
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            header_bg: default_header_bg(),
            header_fg: default_header_fg(),
            args: default_args(),
            output: default_output(),
            tool: default_tool(),
            error: default_error(),
            notice: default_notice(),
            text: default_text(),
            dim: default_dim(),
        }
    }
}

impl Theme {
    /// Creates a new default theme.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Foreground color of a stream class.
    #[must_use]
    pub fn class_color(&self, class: ColorClass) -> Color {
        parse_color(match class {
            ColorClass::Args => &self.args,
            ColorClass::Output => &self.output,
            ColorClass::Tool => &self.tool,
            ColorClass::Error => &self.error,
            ColorClass::Notice => &self.notice,
            ColorClass::Default => &self.text,
        })
    }

    /// Text style of a stream class.
    #[must_use]
    pub fn class_style(&self, class: ColorClass) -> Style {
        Style::default().fg(self.class_color(class))
    }

    /// Header bar and banner style.
    #[must_use]
    pub fn header_style(&self) -> Style {
        Style::default()
            .fg(parse_color(&self.header_fg))
            .bg(parse_color(&self.header_bg))
    }

    /// Footer and hint style.
    #[must_use]
    pub fn dim_style(&self) -> Style {
        Style::default().fg(parse_color(&self.dim))
    }

    /// Badge style for a recent line. WARN and ERROR are inverted blocks.
    #[must_use]
    pub fn badge_style(&self, level: LevelHint) -> Style {
        match level {
            LevelHint::Error => Style::default()
                .fg(Color::Black)
                .bg(parse_color(&self.error))
                .add_modifier(Modifier::BOLD),
            LevelHint::Warn => Style::default()
                .fg(Color::Black)
                .bg(parse_color(&self.notice))
                .add_modifier(Modifier::BOLD),
            LevelHint::Info => Style::default().fg(parse_color(&self.notice)),
            LevelHint::Neutral => self.dim_style(),
        }
    }

    /// Style of a JSON object key.
    #[must_use]
    pub fn json_key_style(&self) -> Style {
        Style::default().fg(parse_color(&self.args))
    }

    /// Style of a JSON value; `fallback` colors punctuation.
    #[must_use]
    pub fn json_value_style(&self, kind: JsonValueKind, fallback: Style) -> Style {
        match kind {
            JsonValueKind::String => Style::default().fg(parse_color(&self.output)),
            JsonValueKind::Number => Style::default().fg(parse_color(&self.notice)),
            JsonValueKind::Literal => Style::default().fg(parse_color(&self.tool)),
            JsonValueKind::Other => fallback,
        }
    }
}

/// Parses a hex color string to a ratatui Color.
fn parse_color(hex: &str) -> Color {
    let hex = hex.trim_start_matches('#');

    if hex.len() != 6 || !hex.is_ascii() {
        return Color::White;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(255);
    let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(255);
    let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(255);

    Color::Rgb(r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#FF0000"), Color::Rgb(255, 0, 0));
        assert_eq!(parse_color("00ff00"), Color::Rgb(0, 255, 0));
        assert_eq!(parse_color("#12345"), Color::White);
        assert_eq!(parse_color("#ééé"), Color::White);
    }

    #[test]
    fn test_class_colors_are_distinct() {
        let theme = Theme::new();
        let classes = [
            ColorClass::Args,
            ColorClass::Output,
            ColorClass::Tool,
            ColorClass::Error,
            ColorClass::Notice,
            ColorClass::Default,
        ];
        for (i, a) in classes.iter().enumerate() {
            assert!(matches!(theme.class_color(*a), Color::Rgb(..)));
            for b in &classes[i + 1..] {
                assert_ne!(theme.class_color(*a), theme.class_color(*b), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_error_badge_is_inverted() {
        let theme = Theme::new();
        let style = theme.badge_style(LevelHint::Error);
        assert_eq!(style.fg, Some(Color::Black));
        assert_eq!(style.bg, Some(theme.class_color(ColorClass::Error)));
    }

    #[test]
    fn test_json_punctuation_uses_fallback() {
        let theme = Theme::new();
        let fallback = Style::default().fg(Color::Gray);
        assert_eq!(theme.json_value_style(JsonValueKind::Other, fallback), fallback);
        assert_ne!(theme.json_value_style(JsonValueKind::String, fallback), fallback);
    }

    #[test]
    fn test_partial_theme_from_yaml() {
        let theme: Theme = serde_yaml_ng::from_str("error: \"#ff0000\"\n").unwrap();
        assert_eq!(theme.class_color(ColorClass::Error), Color::Rgb(255, 0, 0));
        assert_eq!(theme.args, default_args());
    }
}
