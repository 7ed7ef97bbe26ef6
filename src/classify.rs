//! Line classification.
//!
//! A structured line carries the `SSE event:` marker followed by one JSON
//! object. Payloads whose `type` ends in `.delta` and that name an item become
//! [`ClassifiedEvent::Delta`]; other parsed payloads are kept as context, and
//! anything that does not parse degrades to plain text.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::tailer::RawLine;

/// Marker that precedes the JSON payload on structured lines.
pub const SSE_MARKER: &str = "SSE event:";

/// Suffix of event types that carry incremental text.
pub const DELTA_SUFFIX: &str = ".delta";

static SSE_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SSE event:\s*(\{.*\})\s*$").expect("valid SSE regex"));

static LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(TRACE|DEBUG|INFO|WARNING|WARN|ERROR|FATAL)\b").expect("valid level regex")
});

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ANSI regex"));

/// Display color class of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorClass {
    /// Function-call argument deltas.
    Args,
    /// Output text deltas.
    Output,
    /// Tool and function-call events.
    Tool,
    /// Anything mentioning an error.
    Error,
    /// Everything else.
    Default,
    /// Highlighted previews (code, warnings, links). Never produced by
    /// [`ColorClass::of`].
    Notice,
}

impl ColorClass {
    /// Classifies an event type. Total and order-sensitive: the specific
    /// suffix rules win over the substring rules, which win over the default.
    pub fn of(event_type: &str) -> Self {
        if event_type.ends_with("function_call_arguments.delta") {
            Self::Args
        } else if event_type.ends_with("output_text.delta") {
            Self::Output
        } else if event_type.contains(".tool") || event_type.contains(".function_call") {
            Self::Tool
        } else if event_type.to_ascii_lowercase().contains("error") {
            Self::Error
        } else {
            Self::Default
        }
    }
}

/// Severity guessed from a plain log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LevelHint {
    /// No recognizable level, or TRACE/DEBUG.
    #[default]
    Neutral,
    /// INFO.
    Info,
    /// WARN or WARNING.
    Warn,
    /// ERROR or FATAL.
    Error,
}

impl LevelHint {
    /// Finds the first level word in a line.
    pub fn from_line(line: &str) -> Self {
        match LEVEL_RE.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str()) {
            Some("ERROR" | "FATAL") => Self::Error,
            Some("WARN" | "WARNING") => Self::Warn,
            Some("INFO") => Self::Info,
            _ => Self::Neutral,
        }
    }

    /// Badge text.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Neutral => "LOG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Wire shape of a structured payload. Only `type` is required; the other
/// fields read as absent when they carry an unexpected JSON type.
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, deserialize_with = "lenient")]
    item_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    output_index: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    delta: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// A parsed structured payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Incremental text for one stream.
    Delta {
        /// Stream item id.
        item_id: String,
        /// Output slot within the item.
        output_index: u32,
        /// Full event type.
        event_type: String,
        /// Text fragment; empty when the payload had none.
        delta: String,
    },
    /// Any other recognized event.
    Other {
        /// Full event type.
        event_type: String,
    },
}

impl Payload {
    /// Parses the payload of a structured line, `None` if there is none.
    pub fn parse(line: &str) -> Option<Self> {
        let wire: WireEvent = serde_json::from_str(sse_json(line)?).ok()?;

        let item_id = wire
            .item_id
            .filter(|id| !id.is_empty())
            .or(wire.id.filter(|id| !id.is_empty()));

        match item_id {
            Some(item_id) if wire.event_type.ends_with(DELTA_SUFFIX) => Some(Self::Delta {
                item_id,
                output_index: wire.output_index.unwrap_or(0),
                event_type: wire.event_type,
                delta: wire.delta.unwrap_or_default(),
            }),
            _ => Some(Self::Other {
                event_type: wire.event_type,
            }),
        }
    }
}

/// The JSON text following the structured-event marker, if present.
pub fn sse_json(line: &str) -> Option<&str> {
    Some(SSE_JSON_RE.captures(line)?.get(1)?.as_str())
}

/// Result of classifying one raw line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedEvent {
    /// A text fragment for the stream `(item_id, output_index)`.
    Delta {
        /// Stream item id.
        item_id: String,
        /// Output slot within the item.
        output_index: u32,
        /// Full event type.
        event_type: String,
        /// Text fragment.
        text: String,
    },
    /// A structured event that is not a delta.
    NonDeltaStructured {
        /// Full event type.
        event_type: String,
        /// The original line.
        raw: String,
    },
    /// Anything else.
    PlainText {
        /// Severity guess.
        level_hint: LevelHint,
        /// The original line.
        raw: String,
    },
}

impl ClassifiedEvent {
    /// True for [`ClassifiedEvent::Delta`].
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::Delta { .. })
    }
}

/// Line classifier with its one configurable behavior.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    strip_ansi: bool,
}

impl Classifier {
    /// Creates a classifier; `strip_ansi` removes terminal escapes first.
    pub fn new(strip_ansi: bool) -> Self {
        Self { strip_ansi }
    }

    /// Classifies one line.
    pub fn classify(&self, line: &RawLine) -> ClassifiedEvent {
        let text = if self.strip_ansi {
            strip_ansi(&line.text)
        } else {
            Cow::Borrowed(line.text.as_str())
        };

        match Payload::parse(&text) {
            Some(Payload::Delta {
                item_id,
                output_index,
                event_type,
                delta,
            }) => ClassifiedEvent::Delta {
                item_id,
                output_index,
                event_type,
                text: delta,
            },
            Some(Payload::Other { event_type }) => ClassifiedEvent::NonDeltaStructured {
                event_type,
                raw: text.into_owned(),
            },
            None => ClassifiedEvent::PlainText {
                level_hint: LevelHint::from_line(&text),
                raw: text.into_owned(),
            },
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Classifies a line with the default classifier.
pub fn classify(line: &RawLine) -> ClassifiedEvent {
    Classifier::default().classify(line)
}

/// Removes ANSI CSI escape sequences.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    if text.contains('\x1b') {
        ANSI_RE.replace_all(text, "")
    } else {
        Cow::Borrowed(text)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_color_class_is_deterministic(event_type in ".{0,40}") {
            prop_assert_eq!(ColorClass::of(&event_type), ColorClass::of(&event_type));
        }

        #[test]
        fn prop_classify_never_panics(text in "\\PC{0,120}") {
            let _ = classify(&RawLine::now(text));
        }
    }
}
