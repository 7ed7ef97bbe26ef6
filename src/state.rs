//! Small cyclic state enums shared by the view model, header and config.

use serde::{Deserialize, Serialize};

/// Entry filter applied to the stream list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeFilter {
    /// Every stream.
    #[default]
    All,
    /// Function-call argument deltas.
    ArgsDelta,
    /// Output text deltas.
    OutputDelta,
    /// Any event type mentioning an error.
    Error,
}

impl TypeFilter {
    /// Header label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::ArgsDelta => "args",
            Self::OutputDelta => "out",
            Self::Error => "err",
        }
    }

    /// Cycle to the next filter.
    pub fn next(&self) -> Self {
        match self {
            Self::All => Self::ArgsDelta,
            Self::ArgsDelta => Self::OutputDelta,
            Self::OutputDelta => Self::Error,
            Self::Error => Self::All,
        }
    }

    /// Whether an entry whose last event type is `event_type` stays visible.
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::ArgsDelta => event_type.ends_with("function_call_arguments.delta"),
            Self::OutputDelta => event_type.ends_with("output_text.delta"),
            Self::Error => event_type.to_ascii_lowercase().contains("error"),
        }
    }
}

/// How list rows render stream content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    /// Raw wrapped tail of the content.
    #[default]
    Off,
    /// One synthesized summary.
    Summary,
    /// Summary followed by a raw tail excerpt.
    Hybrid,
}

impl PreviewMode {
    /// Header label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Summary => "summary",
            Self::Hybrid => "hybrid",
        }
    }

    /// Cycle off → summary → hybrid → off.
    pub fn next(&self) -> Self {
        match self {
            Self::Off => Self::Summary,
            Self::Summary => Self::Hybrid,
            Self::Hybrid => Self::Off,
        }
    }

    /// Parses the names accepted in config files and the environment.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Some(Self::Off),
            "summary" => Some(Self::Summary),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    /// True when rows show synthesized summaries.
    pub fn is_pretty(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Where the tailer positions itself when it opens a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Read the whole file from offset 0.
    FromStart,
    /// Skip existing content and follow new writes only.
    #[default]
    Tail,
}

impl StartMode {
    /// Header label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FromStart => "start",
            Self::Tail => "tail",
        }
    }

    /// The other mode.
    pub fn toggled(&self) -> Self {
        match self {
            Self::FromStart => Self::Tail,
            Self::Tail => Self::FromStart,
        }
    }

    /// Maps the `from_start` config flag.
    pub fn from_flag(from_start: bool) -> Self {
        if from_start {
            Self::FromStart
        } else {
            Self::Tail
        }
    }
}
