//! Stream aggregation.
//!
//! Delta fragments are merged into one [`Entry`] per [`StreamKey`]. Two bounds
//! keep memory flat regardless of input rate:
//!
//! - each entry's text is capped at `char_budget` characters, trimmed from the
//!   front so the newest tail survives
//! - at most `max_items` entries are kept; creating one more evicts the
//!   least-recently-updated unpinned entry. Pinned entries are never evicted
//!   while an unpinned one exists, and if every entry is pinned the new entry
//!   is admitted anyway (the cap is soft, the overshoot shows in the item count)
//!
//! Non-delta lines go to a fixed-size ring of recent log lines.

use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::SystemTime;

use tracing::debug;

use crate::classify::{ClassifiedEvent, ColorClass, LevelHint};
use crate::preview::shorten_id;
use crate::ring_buffer::RingBuffer;
use crate::state::TypeFilter;

/// Small deltas are appended into the last chunk until it reaches this size,
/// which keeps the chunk count (and per-chunk overhead) low.
const COALESCE_BYTES: usize = 1024;

/// Identity of one logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    /// Item id from the payload.
    pub item_id: String,
    /// Output slot within the item.
    pub output_index: u32,
}

impl StreamKey {
    /// Creates a key.
    pub fn new(item_id: impl Into<String>, output_index: u32) -> Self {
        Self {
            item_id: item_id.into(),
            output_index,
        }
    }

    /// `id#index` with the id shortened to `keep` characters.
    pub fn short_label(&self, keep: usize) -> String {
        format!("{}#{}", shorten_id(&self.item_id, keep), self.output_index)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.item_id, self.output_index)
    }
}

/// Text buffer holding at most `budget` characters.
#[derive(Debug, Clone)]
pub struct BoundedText {
    chunks: VecDeque<(String, usize)>,
    chars: usize,
    budget: usize,
    trimmed: u64,
}

impl BoundedText {
    /// Creates an empty buffer.
    pub fn new(budget: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            chars: 0,
            budget: budget.max(1),
            trimmed: 0,
        }
    }

    /// Appends text, dropping the oldest characters past the budget.
    pub fn push_str(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let added = text.chars().count();

        if added >= self.budget {
            let skip = added - self.budget;
            self.trimmed += (self.chars + skip) as u64;
            self.chunks.clear();
            self.chunks.push_back((char_suffix(text, skip).to_string(), self.budget));
            self.chars = self.budget;
            return;
        }

        match self.chunks.back_mut() {
            Some((last, count)) if last.len() + text.len() <= COALESCE_BYTES => {
                last.push_str(text);
                *count += added;
            }
            _ => self.chunks.push_back((text.to_string(), added)),
        }
        self.chars += added;
        self.trim_front();
    }

    fn trim_front(&mut self) {
        while self.chars > self.budget {
            let excess = self.chars - self.budget;
            let Some((front, count)) = self.chunks.front_mut() else {
                break;
            };
            if *count <= excess {
                let dropped = *count;
                self.chunks.pop_front();
                self.chars -= dropped;
                self.trimmed += dropped as u64;
            } else {
                let cut = front.char_indices().nth(excess).map_or(front.len(), |(i, _)| i);
                front.drain(..cut);
                *count -= excess;
                self.chars -= excess;
                self.trimmed += excess as u64;
            }
        }
    }

    /// Characters currently held.
    pub fn len_chars(&self) -> usize {
        self.chars
    }

    /// True when nothing is held.
    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    /// Configured character budget.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Characters discarded from the front so far.
    pub fn trimmed_chars(&self) -> u64 {
        self.trimmed
    }

    /// The whole buffer as one string.
    pub fn snapshot(&self) -> String {
        let mut out = String::with_capacity(self.chunks.iter().map(|(s, _)| s.len()).sum());
        for (chunk, _) in &self.chunks {
            out.push_str(chunk);
        }
        out
    }

    /// The last `max_chars` characters, without copying the rest.
    pub fn tail(&self, max_chars: usize) -> String {
        if max_chars >= self.chars {
            return self.snapshot();
        }
        let mut needed = max_chars;
        let mut parts = Vec::new();
        for (chunk, count) in self.chunks.iter().rev() {
            if needed == 0 {
                break;
            }
            if *count <= needed {
                parts.push(chunk.as_str());
                needed -= count;
            } else {
                parts.push(char_suffix(chunk, count - needed));
                needed = 0;
            }
        }
        parts.iter().rev().copied().collect()
    }

    /// At least the last `max_chars` characters, starting either at a line
    /// start or a whole number of `width`-character chunks into a line. Wrapping
    /// the result at `width` cuts its lines where wrapping the whole buffer would.
    pub fn wrap_aligned_tail(&self, max_chars: usize, width: usize) -> String {
        if max_chars >= self.chars {
            return self.snapshot();
        }
        let width = width.max(1);
        let cut = self.chars - max_chars;
        let line_start = self.line_start_before(cut);
        let aligned = line_start + (cut - line_start) / width * width;
        self.tail(self.chars - aligned)
    }

    /// Character index just past the last newline before `pos`, or 0.
    fn line_start_before(&self, pos: usize) -> usize {
        let mut end = self.chars;
        for (chunk, count) in self.chunks.iter().rev() {
            let start = end - count;
            if start < pos {
                let visible = pos.min(end) - start;
                let byte_end = chunk.char_indices().nth(visible).map_or(chunk.len(), |(b, _)| b);
                if let Some(nl) = chunk[..byte_end].rfind('\n') {
                    return start + chunk[..nl].chars().count() + 1;
                }
            }
            end = start;
        }
        0
    }
}

/// `text` with its first `skip` characters removed.
fn char_suffix(text: &str, skip: usize) -> &str {
    text.char_indices().nth(skip).map_or("", |(i, _)| &text[i..])
}

/// One logical stream.
#[derive(Debug, Clone)]
pub struct Entry {
    key: StreamKey,
    event_type: String,
    content: BoundedText,
    last_updated: u64,
    created_order: u64,
    pinned: bool,
    updates: u64,
}

impl Entry {
    /// Stream identity.
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Most recent event type seen for this stream.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Color class of the most recent event type.
    pub fn color_class(&self) -> ColorClass {
        ColorClass::of(&self.event_type)
    }

    /// Bounded stream text.
    pub fn content(&self) -> &BoundedText {
        &self.content
    }

    /// Logical time of the last update; unique across entries.
    pub fn last_updated(&self) -> u64 {
        self.last_updated
    }

    /// Creation sequence number.
    pub fn created_order(&self) -> u64 {
        self.created_order
    }

    /// Whether the entry is pinned.
    pub fn pinned(&self) -> bool {
        self.pinned
    }

    /// Number of deltas merged into this entry.
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

/// One line of non-delta context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentLine {
    /// Arrival time.
    pub at: SystemTime,
    /// Severity guess.
    pub level: LevelHint,
    /// Event type for structured lines.
    pub event_type: Option<String>,
    /// Line text.
    pub text: String,
}

/// Capacity settings of the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Soft cap on live entries.
    pub max_items: usize,
    /// Character budget of each entry.
    pub char_budget: usize,
    /// Size of the recent-line ring.
    pub recent_capacity: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_items: 200,
            char_budget: 32 * 1024,
            recent_capacity: 50,
        }
    }
}

/// What one ingest did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// A delta was merged.
    Delta {
        /// The stream it went to.
        key: StreamKey,
        /// Whether the stream was created by this delta.
        created: bool,
        /// Streams evicted to make room.
        evicted: Vec<StreamKey>,
    },
    /// The line went to the recent ring.
    Recent,
}

/// Owner of all entries and the recent-line ring.
#[derive(Debug)]
pub struct Aggregator {
    entries: HashMap<StreamKey, Entry>,
    recent: RingBuffer<RecentLine>,
    limits: Limits,
    clock: u64,
    created: u64,
    pinned: usize,
    event_count: u64,
    delta_count: u64,
    evictions: u64,
    trimmed: u64,
}

impl Aggregator {
    /// Creates an empty aggregator.
    pub fn new(limits: Limits) -> Self {
        Self {
            entries: HashMap::with_capacity(limits.max_items.min(4096)),
            recent: RingBuffer::new(limits.recent_capacity.max(1)),
            limits,
            clock: 0,
            created: 0,
            pinned: 0,
            event_count: 0,
            delta_count: 0,
            evictions: 0,
            trimmed: 0,
        }
    }

    /// Ingests an event that arrived now.
    pub fn ingest(&mut self, event: ClassifiedEvent) -> Ingested {
        self.ingest_at(event, SystemTime::now())
    }

    /// Ingests an event stamped with its arrival time.
    pub fn ingest_at(&mut self, event: ClassifiedEvent, at: SystemTime) -> Ingested {
        self.event_count += 1;
        match event {
            ClassifiedEvent::Delta {
                item_id,
                output_index,
                event_type,
                text,
            } => {
                self.delta_count += 1;
                self.merge_delta(StreamKey::new(item_id, output_index), event_type, &text)
            }
            ClassifiedEvent::NonDeltaStructured { event_type, raw } => {
                let level = if ColorClass::of(&event_type) == ColorClass::Error {
                    LevelHint::Error
                } else {
                    LevelHint::Info
                };
                self.recent.push(RecentLine {
                    at,
                    level,
                    event_type: Some(event_type),
                    text: raw,
                });
                Ingested::Recent
            }
            ClassifiedEvent::PlainText { level_hint, raw } => {
                self.recent.push(RecentLine {
                    at,
                    level: level_hint,
                    event_type: None,
                    text: raw,
                });
                Ingested::Recent
            }
        }
    }

    fn merge_delta(&mut self, key: StreamKey, event_type: String, text: &str) -> Ingested {
        self.clock += 1;
        let clock = self.clock;

        if let Some(entry) = self.entries.get_mut(&key) {
            let before = entry.content.trimmed_chars();
            entry.content.push_str(text);
            self.trimmed += entry.content.trimmed_chars() - before;
            entry.event_type = event_type;
            entry.last_updated = clock;
            entry.updates += 1;
            return Ingested::Delta {
                key,
                created: false,
                evicted: Vec::new(),
            };
        }

        let mut evicted = Vec::new();
        while self.entries.len() >= self.limits.max_items {
            match self.evict_lru_unpinned() {
                Some(gone) => evicted.push(gone),
                None => break,
            }
        }

        let mut content = BoundedText::new(self.limits.char_budget);
        content.push_str(text);
        self.trimmed += content.trimmed_chars();
        self.created += 1;
        self.entries.insert(
            key.clone(),
            Entry {
                key: key.clone(),
                event_type,
                content,
                last_updated: clock,
                created_order: self.created,
                pinned: false,
                updates: 1,
            },
        );

        Ingested::Delta {
            key,
            created: true,
            evicted,
        }
    }

    fn evict_lru_unpinned(&mut self) -> Option<StreamKey> {
        let victim = self
            .entries
            .values()
            .filter(|e| !e.pinned)
            .min_by_key(|e| e.last_updated)?
            .key
            .clone();
        self.entries.remove(&victim);
        self.evictions += 1;
        debug!(stream = %victim, "evicted least recently updated stream");
        Some(victim)
    }

    /// Evicts unpinned entries while more than `max_items` are live.
    pub fn evict_if_over_capacity(&mut self) -> Vec<StreamKey> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.limits.max_items {
            match self.evict_lru_unpinned() {
                Some(gone) => evicted.push(gone),
                None => break,
            }
        }
        evicted
    }

    /// Pins an entry. Returns false if the key is unknown.
    pub fn pin(&mut self, key: &StreamKey) -> bool {
        self.set_pinned(key, true)
    }

    /// Unpins an entry. Returns false if the key is unknown.
    pub fn unpin(&mut self, key: &StreamKey) -> bool {
        self.set_pinned(key, false)
    }

    /// Flips the pin state, returning the new state (`None` if unknown).
    pub fn toggle_pin(&mut self, key: &StreamKey) -> Option<bool> {
        let pinned = !self.entries.get(key)?.pinned;
        self.set_pinned(key, pinned);
        Some(pinned)
    }

    fn set_pinned(&mut self, key: &StreamKey, pinned: bool) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.pinned != pinned {
            entry.pinned = pinned;
            if pinned {
                self.pinned += 1;
            } else {
                self.pinned -= 1;
            }
        }
        true
    }

    /// Drops every entry. Counters and the recent ring are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.pinned = 0;
    }

    /// Appends a line of our own (export results and similar) to the ring.
    pub fn note(&mut self, level: LevelHint, text: impl Into<String>) {
        self.recent.push(RecentLine {
            at: SystemTime::now(),
            level,
            event_type: None,
            text: text.into(),
        });
    }

    /// Looks up an entry.
    pub fn get(&self, key: &StreamKey) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Whether the key is live.
    pub fn contains(&self, key: &StreamKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Live entries matching the filter, pinned first, each group newest first.
    pub fn ordered(&self, filter: TypeFilter) -> Vec<&Entry> {
        let mut list: Vec<&Entry> = self
            .entries
            .values()
            .filter(|e| filter.matches(&e.event_type))
            .collect();
        list.sort_unstable_by_key(|e| (!e.pinned, Reverse(e.last_updated)));
        list
    }

    /// The first entry of [`Aggregator::ordered`] without sorting.
    pub fn top(&self, filter: TypeFilter) -> Option<&Entry> {
        self.entries
            .values()
            .filter(|e| filter.matches(&e.event_type))
            .max_by_key(|e| (e.pinned, e.last_updated))
    }

    /// Recent non-delta lines.
    pub fn recent(&self) -> &RingBuffer<RecentLine> {
        &self.recent
    }

    /// Live entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pinned entry count.
    pub fn pinned_count(&self) -> usize {
        self.pinned
    }

    /// Lines ingested.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Deltas ingested.
    pub fn delta_count(&self) -> u64 {
        self.delta_count
    }

    /// Entries evicted for capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Characters trimmed from the front of any entry so far.
    pub fn trimmed_chars(&self) -> u64 {
        self.trimmed
    }

    /// Active limits.
    pub fn limits(&self) -> Limits {
        self.limits
    }
}
