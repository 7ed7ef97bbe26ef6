//! # streamviz
//!
//! Real-time terminal dashboard for logs that carry streamed model events.
//!
//! An external process appends lines to a rotating log file. Some lines are
//! structured (`SSE event: {...}`) and carry small incremental text
//! fragments ("deltas") for a logical stream keyed by
//! `(item_id, output_index)`. streamviz follows the file, reassembles each
//! stream under fixed memory bounds, and renders a live, interactive view.
//!
//! ## Pipeline
//!
//! [`Tailer`] → [`Classifier`] → [`Aggregator`] → [`ViewModel`] → [`ui`]
//!
//! - [`tailer`]: incremental file follower with rotation and truncation recovery
//! - [`classify`]: structured-line detection and typed payload parsing
//! - [`aggregator`]: bounded streams, eviction, pinning and the recent-line ring
//! - [`view`]: selection, follow, filter, detail scroll and the per-tick projection
//! - [`app`]: the tick scheduler tying it together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use streamviz::{App, Config};
//!
//! let config = Config::load_or_default("streamviz.yaml");
//! App::new(config).run()?;
//! # Ok::<(), streamviz::StreamvizError>(())
//! ```

#![warn(missing_docs)]
// Allow unwrap() in tests only
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

/// Stream reassembly and retention.
pub mod aggregator;

/// Main application loop.
pub mod app;

/// Line classification and payload parsing.
pub mod classify;

/// Configuration loading.
pub mod config;

/// File-backed diagnostic logging.
pub mod debug;

/// Event-rate sampling.
pub mod eps;

/// Error types.
pub mod error;

/// Stream export.
pub mod export;

/// Keyboard handling.
pub mod input;

/// Summaries, wrapping and JSON helpers for display.
pub mod preview;

/// Fixed-capacity ring buffer.
pub mod ring_buffer;

/// Cyclic view state enums.
pub mod state;

/// Rotating file follower.
pub mod tailer;

/// Colors and styles.
pub mod theme;

/// Terminal painting.
pub mod ui;

/// Interactive view state and projection.
pub mod view;

pub use aggregator::{Aggregator, BoundedText, Entry, Ingested, Limits, StreamKey};
pub use app::App;
pub use classify::{ClassifiedEvent, Classifier, ColorClass, LevelHint, Payload};
pub use config::Config;
pub use error::{Result, StreamvizError};
pub use export::{ExportRequest, Exporter, FileExporter};
pub use state::{PreviewMode, StartMode, TypeFilter};
pub use tailer::{RawLine, Tailer};
pub use view::{Projection, ViewModel, ViewOptions, Viewport};
