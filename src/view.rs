//! Interactive view state and the per-tick projection handed to the renderer.
//!
//! The [`ViewModel`] only reads the [`Aggregator`]. Each tick the app calls
//! [`ViewModel::project`], which resolves selection and scrolling against the
//! current ordering and returns a [`Projection`] of plain data.

use std::collections::HashSet;

use crate::aggregator::{Aggregator, Entry, StreamKey};
use crate::classify::ColorClass;
use crate::preview::{self, RecentView};
use crate::state::{PreviewMode, StartMode, TypeFilter};

/// Characters of the item id kept in row labels.
const LABEL_ID_CHARS: usize = 12;

/// Detail viewport size the page step is derived from before the first
/// projection.
const DEFAULT_DETAIL_HEIGHT: usize = 20;

/// Screen space available to the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Terminal width in columns.
    pub width: usize,
    /// Rows available to the stream list.
    pub list_height: usize,
    /// Columns available to detail text.
    pub detail_width: usize,
    /// Rows available to detail text.
    pub detail_height: usize,
}

/// Values from outside the view model that appear in the header.
#[derive(Debug, Clone, PartialEq)]
pub struct TickStats {
    /// Sampled events per second.
    pub eps: f64,
    /// Whether tailer polling is paused.
    pub paused: bool,
    /// Current tailer start mode.
    pub start_mode: StartMode,
    /// Rotations and truncations the tailer has followed.
    pub rotations: u64,
    /// Set while the log cannot be opened: the path and the reason.
    pub waiting: Option<String>,
}

impl Default for TickStats {
    fn default() -> Self {
        Self {
            eps: 0.0,
            paused: false,
            start_mode: StartMode::Tail,
            rotations: 0,
            waiting: None,
        }
    }
}

/// Header line data.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// Lines ingested.
    pub event_count: u64,
    /// Deltas ingested.
    pub delta_count: u64,
    /// Events per second.
    pub eps: f64,
    /// Live entries, including filtered ones.
    pub item_count: usize,
    /// Entries evicted so far.
    pub evictions: u64,
    /// Characters trimmed from stream fronts so far.
    pub trimmed_chars: u64,
    /// Recent lines pushed out of the ring.
    pub recent_dropped: u64,
    /// Rotations and truncations followed.
    pub rotations: u64,
    /// Why the log is not being read, if it is not.
    pub waiting: Option<String>,
    /// Active filter.
    pub active_filter: TypeFilter,
    /// Whether the view follows the newest entry.
    pub follow: bool,
    /// Preview mode.
    pub preview: PreviewMode,
    /// Whether ingestion is paused.
    pub paused: bool,
    /// Tailer start mode.
    pub start_mode: StartMode,
    /// Updates that would have changed the top entry since follow was left.
    pub pending_updates: u64,
}

/// One list row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Stream identity.
    pub key: StreamKey,
    /// Short `id#index: ` prefix.
    pub label: String,
    /// Text color.
    pub color_class: ColorClass,
    /// Wrapped lines to show.
    pub wrapped_lines: Vec<String>,
    /// Whether the entry is pinned.
    pub pinned: bool,
    /// Whether the entry is selected.
    pub is_selected: bool,
    /// Whether the expanded line cap applies.
    pub expanded: bool,
}

/// Full-screen view of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPayload {
    /// Stream identity.
    pub key: StreamKey,
    /// Latest event type of the stream.
    pub event_type: String,
    /// Text color.
    pub color_class: ColorClass,
    /// Whether the entry is pinned.
    pub pinned: bool,
    /// Deltas merged into the stream.
    pub updates: u64,
    /// Creation sequence number.
    pub created_order: u64,
    /// Every wrapped line of the content.
    pub full_wrapped_lines: Vec<String>,
    /// First visible line, already clamped.
    pub scroll_offset: usize,
    /// Lines are pretty-printed JSON.
    pub json: bool,
    /// JSON wrapping is on.
    pub json_wrap: bool,
}

/// Everything the renderer draws for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Header data.
    pub header: Header,
    /// Rows starting at the list scroll position.
    pub rows: Vec<Row>,
    /// Index of the first row within the filtered ordering.
    pub list_scroll: usize,
    /// Entries matching the filter.
    pub visible_count: usize,
    /// Latest recent lines, oldest first.
    pub recent: Vec<RecentView>,
    /// Detail view, if open.
    pub detail: Option<DetailPayload>,
    /// Transient message.
    pub notice: Option<String>,
    /// Whether the help overlay is shown.
    pub show_help: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DetailState {
    key: StreamKey,
    scroll: usize,
}

/// Line caps and toggles the view model starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOptions {
    /// Lines per row.
    pub lines_per_item: usize,
    /// Lines per expanded row.
    pub lines_expanded: usize,
    /// Recent lines shown under the list.
    pub recent_lines: usize,
    /// Initial preview mode.
    pub preview: PreviewMode,
    /// Pretty-print JSON in the detail view.
    pub json_pretty: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            lines_per_item: 5,
            lines_expanded: 12,
            recent_lines: 3,
            preview: PreviewMode::Off,
            json_pretty: false,
        }
    }
}

/// Interactive state of the dashboard.
#[derive(Debug, Clone)]
pub struct ViewModel {
    selected: Option<StreamKey>,
    filter: TypeFilter,
    follow: bool,
    pending_updates: u64,
    last_top: Option<StreamKey>,
    detail: Option<DetailState>,
    detail_height: usize,
    expanded: HashSet<StreamKey>,
    list_scroll: usize,
    preview: PreviewMode,
    json_pretty: bool,
    json_wrap: bool,
    options: ViewOptions,
    notice: Option<String>,
    show_help: bool,
}

impl ViewModel {
    /// Creates a view model in follow mode.
    pub fn new(options: ViewOptions) -> Self {
        Self {
            selected: None,
            filter: TypeFilter::All,
            follow: true,
            pending_updates: 0,
            last_top: None,
            detail: None,
            detail_height: DEFAULT_DETAIL_HEIGHT,
            expanded: HashSet::new(),
            list_scroll: 0,
            preview: options.preview,
            json_pretty: options.json_pretty,
            json_wrap: true,
            options,
            notice: None,
            show_help: false,
        }
    }

    /// Selected stream.
    pub fn selected(&self) -> Option<&StreamKey> {
        self.selected.as_ref()
    }

    /// Stream shown in the detail view.
    pub fn detail_key(&self) -> Option<&StreamKey> {
        self.detail.as_ref().map(|d| &d.key)
    }

    /// Whether the detail view is open.
    pub fn in_detail(&self) -> bool {
        self.detail.is_some()
    }

    /// The stream actions apply to: the detail target, else the selection.
    pub fn target(&self) -> Option<&StreamKey> {
        self.detail_key().or(self.selected.as_ref())
    }

    /// Active filter.
    pub fn filter(&self) -> TypeFilter {
        self.filter
    }

    /// Whether the view follows the newest entry.
    pub fn follow(&self) -> bool {
        self.follow
    }

    /// Pending update count shown in the banner.
    pub fn pending_updates(&self) -> u64 {
        self.pending_updates
    }

    /// Preview mode.
    pub fn preview(&self) -> PreviewMode {
        self.preview
    }

    /// Whether the "newer updates" banner takes a line.
    pub fn banner_visible(&self) -> bool {
        !self.follow && self.pending_updates > 0
    }

    /// Whether the help overlay is shown.
    pub fn show_help(&self) -> bool {
        self.show_help
    }

    /// Current notice.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Records an ingested delta for the pending banner. While following this
    /// is a no-op because the next projection reselects the top anyway.
    pub fn on_ingest(&mut self, agg: &Aggregator, key: &StreamKey) {
        if self.follow || !self.filter.matches(agg.get(key).map_or("", Entry::event_type)) {
            return;
        }
        let top = agg.top(self.filter).map(|e| e.key().clone());
        if top != self.last_top {
            self.pending_updates += 1;
            self.last_top = top;
        }
    }

    /// Moves the selection by `delta` rows and leaves follow mode.
    pub fn move_selection(&mut self, agg: &Aggregator, delta: isize) {
        self.follow = false;
        let ordered = agg.ordered(self.filter);
        if ordered.is_empty() {
            return;
        }
        let current = self
            .selected
            .as_ref()
            .and_then(|key| ordered.iter().position(|e| e.key() == key));
        let next = match current {
            Some(idx) => idx.saturating_add_signed(delta).min(ordered.len() - 1),
            None => 0,
        };
        self.selected = Some(ordered[next].key().clone());
    }

    /// Returns to follow mode on the newest entry.
    pub fn jump_to_newest(&mut self, agg: &Aggregator) {
        self.follow = true;
        self.pending_updates = 0;
        self.list_scroll = 0;
        self.selected = agg.top(self.filter).map(|e| e.key().clone());
    }

    /// Opens the detail view on the selection.
    pub fn open_detail(&mut self) {
        if let Some(key) = self.selected.clone() {
            self.detail = Some(DetailState { key, scroll: 0 });
        }
    }

    /// Closes the detail view.
    pub fn close_detail(&mut self) {
        self.detail = None;
    }

    fn scroll_detail_with(&mut self, f: impl FnOnce(usize, usize) -> usize) {
        let page = self.detail_page();
        if let Some(detail) = &mut self.detail {
            self.follow = false;
            detail.scroll = f(detail.scroll, page);
        }
    }

    fn detail_page(&self) -> usize {
        self.detail_height.saturating_sub(2).max(1)
    }

    /// Scrolls the detail view by lines.
    pub fn scroll_detail(&mut self, delta: isize) {
        self.scroll_detail_with(|scroll, _| scroll.saturating_add_signed(delta));
    }

    /// Scrolls the detail view one page up.
    pub fn page_up(&mut self) {
        self.scroll_detail_with(|scroll, page| scroll.saturating_sub(page));
    }

    /// Scrolls the detail view one page down.
    pub fn page_down(&mut self) {
        self.scroll_detail_with(|scroll, page| scroll.saturating_add(page));
    }

    /// Jumps to the top of the detail view.
    pub fn scroll_home(&mut self) {
        self.scroll_detail_with(|_, _| 0);
    }

    /// Jumps to the end of the detail view; clamped at projection.
    pub fn scroll_end(&mut self) {
        self.scroll_detail_with(|_, _| usize::MAX);
    }

    /// Toggles the expanded line cap for the selection.
    pub fn toggle_expanded(&mut self) {
        if let Some(key) = &self.selected {
            if !self.expanded.remove(key) {
                self.expanded.insert(key.clone());
            }
        }
    }

    /// Cycles the type filter.
    pub fn cycle_filter(&mut self) {
        self.filter = self.filter.next();
    }

    /// Cycles the preview mode.
    pub fn cycle_preview(&mut self) {
        self.preview = self.preview.next();
    }

    /// Toggles JSON wrapping in the detail view.
    pub fn toggle_json_wrap(&mut self) {
        self.json_wrap = !self.json_wrap;
    }

    /// Toggles the help overlay.
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Sets the notice line.
    pub fn set_notice(&mut self, text: impl Into<String>) {
        self.notice = Some(text.into());
    }

    /// Drops the notice line.
    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Forgets per-stream state after the aggregator was cleared.
    pub fn reset(&mut self) {
        self.selected = None;
        self.detail = None;
        self.expanded.clear();
        self.list_scroll = 0;
        self.pending_updates = 0;
        self.last_top = None;
    }

    fn line_cap(&self, key: &StreamKey) -> usize {
        if self.expanded.contains(key) {
            self.options.lines_expanded
        } else {
            self.options.lines_per_item
        }
    }

    fn row_lines(&self, entry: &Entry, wrap_width: usize) -> (Vec<String>, ColorClass) {
        preview::preview_lines(
            self.preview,
            entry.event_type(),
            entry.content(),
            wrap_width,
            self.line_cap(entry.key()),
        )
    }

    /// Resolves selection, follow, scrolling and the detail target against the
    /// aggregator and builds the renderer payload.
    pub fn project(&mut self, agg: &Aggregator, viewport: Viewport, stats: TickStats) -> Projection {
        let ordered = agg.ordered(self.filter);
        let top = ordered.first().map(|e| e.key().clone());

        if self.follow {
            self.selected.clone_from(&top);
            self.list_scroll = 0;
            self.pending_updates = 0;
        } else if !self
            .selected
            .as_ref()
            .is_some_and(|key| ordered.iter().any(|e| e.key() == key))
        {
            self.selected.clone_from(&top);
        }
        self.last_top = top;

        let detail = self.project_detail(agg, viewport);
        let rows = self.project_rows(&ordered, viewport);

        let recent = agg
            .recent()
            .last_n(self.options.recent_lines)
            .into_iter()
            .map(|line| preview::recent_view(line, viewport.width.saturating_sub(1), self.preview.is_pretty()))
            .collect();

        Projection {
            header: Header {
                event_count: agg.event_count(),
                delta_count: agg.delta_count(),
                eps: stats.eps,
                item_count: agg.len(),
                evictions: agg.evictions(),
                trimmed_chars: agg.trimmed_chars(),
                recent_dropped: agg.recent().dropped(),
                rotations: stats.rotations,
                waiting: stats.waiting,
                active_filter: self.filter,
                follow: self.follow,
                preview: self.preview,
                paused: stats.paused,
                start_mode: stats.start_mode,
                pending_updates: self.pending_updates,
            },
            rows,
            list_scroll: self.list_scroll,
            visible_count: ordered.len(),
            recent,
            detail,
            notice: self.notice.clone(),
            show_help: self.show_help,
        }
    }

    fn project_rows(&mut self, ordered: &[&Entry], viewport: Viewport) -> Vec<Row> {
        if ordered.is_empty() {
            self.list_scroll = 0;
            return Vec::new();
        }

        let labels: Vec<String> = ordered
            .iter()
            .map(|e| format!("{}: ", e.key().short_label(LABEL_ID_CHARS)))
            .collect();
        let mut cache: Vec<Option<(Vec<String>, ColorClass)>> = vec![None; ordered.len()];
        let mut lines_at = |idx: usize| -> usize {
            if cache[idx].is_none() {
                let wrap = viewport.width.saturating_sub(labels[idx].chars().count() + 1).max(1);
                cache[idx] = Some(self.row_lines(ordered[idx], wrap));
            }
            cache[idx].as_ref().map_or(1, |(lines, _)| lines.len().max(1))
        };

        let selected_idx = self
            .selected
            .as_ref()
            .and_then(|key| ordered.iter().position(|e| e.key() == key))
            .unwrap_or(0);
        let area = viewport.list_height;

        let mut scroll = self.list_scroll.min(ordered.len() - 1);
        if selected_idx < scroll {
            scroll = selected_idx;
        }
        // Advance one block at a time until the selected block fits.
        while scroll < selected_idx {
            let mut used = 0;
            let mut fit_end = scroll;
            while fit_end <= selected_idx {
                let height = lines_at(fit_end);
                if used + height > area {
                    break;
                }
                used += height;
                fit_end += 1;
            }
            if selected_idx < fit_end {
                break;
            }
            scroll += 1;
        }

        let mut used = 0;
        let mut end = scroll;
        while end < ordered.len() && used < area.max(1) {
            used += lines_at(end);
            end += 1;
        }
        self.list_scroll = scroll;

        let mut rows = Vec::with_capacity(end - scroll);
        for (i, entry) in ordered.iter().enumerate().take(end).skip(scroll) {
            let (wrapped_lines, color_class) = cache[i]
                .take()
                .unwrap_or_else(|| (Vec::new(), entry.color_class()));
            let key = entry.key().clone();
            rows.push(Row {
                label: labels[i].clone(),
                color_class,
                wrapped_lines,
                pinned: entry.pinned(),
                is_selected: i == selected_idx,
                expanded: self.expanded.contains(&key),
                key,
            });
        }
        rows
    }

    fn project_detail(&mut self, agg: &Aggregator, viewport: Viewport) -> Option<DetailPayload> {
        let state = self.detail.as_ref()?;
        let Some(entry) = agg.get(&state.key) else {
            let label = state.key.short_label(LABEL_ID_CHARS);
            self.detail = None;
            self.set_notice(format!("{label} was evicted, detail view closed"));
            return None;
        };

        let width = viewport.detail_width.max(1);
        let content = entry.content().snapshot();
        let json_lines = if self.json_pretty {
            preview::pretty_json_lines(&content)
        } else {
            None
        };
        let json = json_lines.is_some();
        let lines = match json_lines {
            Some(lines) if self.json_wrap => lines
                .iter()
                .flat_map(|line| preview::wrap_json_line(line, width))
                .collect(),
            Some(lines) => lines,
            None => preview::wrap_chunks(&content, width),
        };

        self.detail_height = viewport.detail_height;
        let max_scroll = lines.len().saturating_sub(viewport.detail_height);
        let scroll = state.scroll.min(max_scroll);
        if let Some(detail) = &mut self.detail {
            detail.scroll = scroll;
        }

        Some(DetailPayload {
            key: entry.key().clone(),
            event_type: entry.event_type().to_string(),
            color_class: entry.color_class(),
            pinned: entry.pinned(),
            updates: entry.updates(),
            created_order: entry.created_order(),
            full_wrapped_lines: lines,
            scroll_offset: scroll,
            json,
            json_wrap: self.json_wrap,
        })
    }
}

impl Default for ViewModel {
    fn default() -> Self {
        Self::new(ViewOptions::default())
    }
}
