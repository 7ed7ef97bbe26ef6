//! Incremental, rotation-aware file follower.
//!
//! The tailer is polled once per tick and never blocks: it reads whatever
//! complete lines were appended since the last poll and returns them. A
//! trailing line without its newline stays in the file and is read again on
//! the next poll, so the recorded offset only ever moves past whole lines.
//!
//! Rotation is detected by file identity (device + inode on unix), truncation
//! by the file shrinking below the recorded offset. Either way the tailer
//! reopens at offset 0 of the new incarnation. On a rename-style rotation the
//! old handle is drained of its remaining complete lines first.

use std::fs::{self, File, Metadata};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::state::StartMode;

/// One line of input plus the time the tailer saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Line content without the line terminator.
    pub text: String,
    /// When the poll that produced this line ran.
    pub arrived_at: SystemTime,
}

impl RawLine {
    /// Creates a line stamped with the current time.
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            arrived_at: SystemTime::now(),
        }
    }
}

/// Identity of one incarnation of the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }

    // Best effort: creation time stands in for the inode.
    #[cfg(not(unix))]
    fn of(meta: &Metadata) -> Self {
        let created = meta
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos() as u64);
        Self { dev: 0, ino: created }
    }
}

/// File identity plus the byte offset just past the last emitted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPosition {
    /// Which incarnation of the file is being read.
    pub identity: FileIdentity,
    /// Bytes consumed from that incarnation.
    pub offset: u64,
}

#[derive(Debug)]
struct OpenLog {
    file: File,
    position: LogPosition,
}

/// Non-blocking follower for a single log path.
#[derive(Debug)]
pub struct Tailer {
    path: PathBuf,
    mode: StartMode,
    max_read_bytes: usize,
    current: Option<OpenLog>,
    buf: Vec<u8>,
    /// Set while the path cannot be opened; cleared on success.
    open_error: Option<String>,
    /// The path was missing at some point, so its next incarnation is all new data.
    was_missing: bool,
    rotations: u64,
}

impl Tailer {
    /// Creates a tailer; the file is opened lazily on the first poll.
    pub fn new(path: impl Into<PathBuf>, mode: StartMode, max_read_bytes: usize) -> Self {
        Self {
            path: path.into(),
            mode,
            max_read_bytes: max_read_bytes.max(1),
            current: None,
            buf: Vec::new(),
            open_error: None,
            was_missing: false,
            rotations: 0,
        }
    }

    /// Path being followed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current start mode.
    pub fn mode(&self) -> StartMode {
        self.mode
    }

    /// Why the file is not open, if it is not.
    pub fn open_error(&self) -> Option<&str> {
        self.open_error.as_deref()
    }

    /// Rotations and truncations seen so far.
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Switches start mode and forces a fresh open on the next poll.
    pub fn set_mode(&mut self, mode: StartMode) {
        self.mode = mode;
        self.current = None;
        self.was_missing = false;
        debug!(path = %self.path.display(), mode = mode.name(), "start mode changed, reopening");
    }

    /// Reads every complete line appended since the last poll.
    pub fn poll(&mut self) -> Vec<RawLine> {
        let mut lines = Vec::new();
        let now = SystemTime::now();

        if self.current.is_none() && !self.open_initial() {
            return lines;
        }

        // A missing path means it was renamed away mid-rotation: keep draining
        // the handle we have.
        if let Ok(meta) = fs::metadata(&self.path) {
            self.check_rotation(&meta, now, &mut lines);
        }

        self.read_available(now, &mut lines);
        lines
    }

    fn open_initial(&mut self) -> bool {
        let from_start = self.was_missing || self.mode == StartMode::FromStart;
        match self.open_at(from_start) {
            Ok(log) => {
                info!(
                    path = %self.path.display(),
                    offset = log.position.offset,
                    "opened log"
                );
                self.current = Some(log);
                self.open_error = None;
                self.was_missing = false;
                true
            }
            Err(err) => {
                if self.open_error.is_none() {
                    warn!(path = %self.path.display(), error = %err, "log not available yet, retrying every tick");
                }
                self.open_error = Some(err.to_string());
                self.was_missing = true;
                false
            }
        }
    }

    fn open_at(&self, from_start: bool) -> std::io::Result<OpenLog> {
        let file = File::open(&self.path)?;
        let meta = file.metadata()?;
        let offset = if from_start { 0 } else { meta.len() };
        Ok(OpenLog {
            file,
            position: LogPosition {
                identity: FileIdentity::of(&meta),
                offset,
            },
        })
    }

    fn check_rotation(&mut self, meta: &Metadata, now: SystemTime, lines: &mut Vec<RawLine>) {
        let Some(current) = self.current.as_mut() else {
            return;
        };

        if FileIdentity::of(meta) != current.position.identity {
            // Whatever the old incarnation still holds comes first.
            self.read_available(now, lines);
            match self.open_at(true) {
                Ok(log) => {
                    info!(path = %self.path.display(), "log rotated, following new file");
                    self.current = Some(log);
                    self.rotations += 1;
                }
                Err(err) => {
                    debug!(error = %err, "rotated file vanished before reopen");
                }
            }
        } else if meta.len() < current.position.offset {
            info!(
                path = %self.path.display(),
                size = meta.len(),
                offset = current.position.offset,
                "log truncated, rewinding"
            );
            current.position.offset = 0;
            self.rotations += 1;
        }
    }

    fn read_available(&mut self, now: SystemTime, lines: &mut Vec<RawLine>) {
        let Some(current) = self.current.as_mut() else {
            return;
        };

        self.buf.clear();
        let read = current
            .file
            .seek(SeekFrom::Start(current.position.offset))
            .and_then(|_| {
                (&mut current.file)
                    .take(self.max_read_bytes as u64)
                    .read_to_end(&mut self.buf)
            });
        if let Err(err) = read {
            debug!(error = %err, "read failed, retrying next tick");
            return;
        }
        if self.buf.is_empty() {
            return;
        }

        let consumed = match self.buf.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => {
                for raw in self.buf[..last_newline].split(|&b| b == b'\n') {
                    lines.push(RawLine {
                        text: decode_line(raw),
                        arrived_at: now,
                    });
                }
                last_newline + 1
            }
            // A line longer than one read: emit it in pieces instead of stalling.
            None if self.buf.len() >= self.max_read_bytes => {
                let piece = complete_utf8_len(&self.buf);
                lines.push(RawLine {
                    text: decode_line(&self.buf[..piece]),
                    arrived_at: now,
                });
                piece
            }
            None => 0,
        };

        current.position.offset += consumed as u64;
    }
}

/// Length of `buf` without a multi-byte character cut off at its end. Never
/// zero for a non-empty buffer, so a tiny read cap still makes progress.
fn complete_utf8_len(buf: &[u8]) -> usize {
    let tail_start = buf.len().saturating_sub(3);
    for start in (tail_start..buf.len()).rev() {
        // Skip continuation bytes back to the start of the last character.
        if buf[start] & 0xC0 != 0x80 {
            return match std::str::from_utf8(&buf[start..]) {
                Err(e) if e.error_len().is_none() && start > 0 => start,
                _ => buf.len(),
            };
        }
    }
    buf.len()
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
