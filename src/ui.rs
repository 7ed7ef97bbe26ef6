//! Terminal painting.
//!
//! Everything here is a pure function of a [`Projection`] and a [`Theme`];
//! selection, scrolling and wrapping were already resolved by the view model.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use crate::classify::{ColorClass, LevelHint};
use crate::preview::{self, JsonLineParts, RecentView};
use crate::theme::Theme;
use crate::view::{DetailPayload, Header, Projection, Row, Viewport};

const TITLE: &str = concat!(" streamviz ", env!("CARGO_PKG_VERSION"));

const LIST_HELP: &str = " q:quit  ↑/↓:select  ↩:open  x:pin  e:export  f:filter  c:clear  p:pause  s:toggle start  T:follow  space:refresh  b:pretty-mode  m:more  ?:help ";

const HELP_LINES: &[(&str, &str)] = &[
    ("↑/↓ j/k", "move selection / scroll"),
    ("Enter", "open detail view"),
    ("x", "pin or unpin"),
    ("e", "export stream to a file"),
    ("f", "cycle filter: all, args, out, err"),
    ("c", "clear all streams"),
    ("p", "pause or resume ingestion"),
    ("s", "toggle read-from-start / tail"),
    ("T", "follow newest"),
    ("b", "cycle preview: off, summary, hybrid"),
    ("m", "expand or collapse row"),
    ("PgUp/PgDn g/G", "page / jump in detail view"),
    ("w", "toggle JSON wrap in detail view"),
    ("q Esc", "leave detail view, quit"),
];

/// Screen regions of the list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    /// Header bar.
    pub header: Rect,
    /// "Newer updates" banner; zero height when hidden.
    pub banner: Rect,
    /// Stream list.
    pub list: Rect,
    /// Recent log lines with their title.
    pub recent: Rect,
    /// Footer or notice.
    pub footer: Rect,
}

impl Screen {
    /// Splits the terminal area.
    #[must_use]
    pub fn split(area: Rect, banner_visible: bool, recent_lines: usize) -> Self {
        let recent_height = u16::try_from(recent_lines + 1).unwrap_or(u16::MAX);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(u16::from(banner_visible)),
                Constraint::Min(0),
                Constraint::Length(recent_height),
                Constraint::Length(1),
            ])
            .split(area);
        Self {
            header: chunks[0],
            banner: chunks[1],
            list: chunks[2],
            recent: chunks[3],
            footer: chunks[4],
        }
    }
}

/// Space the view model may fill for a terminal of `area`.
#[must_use]
pub fn viewport_for(area: Rect, banner_visible: bool, recent_lines: usize) -> Viewport {
    let screen = Screen::split(area, banner_visible, recent_lines);
    Viewport {
        width: usize::from(area.width),
        list_height: usize::from(screen.list.height),
        detail_width: usize::from(area.width.saturating_sub(2)).max(1),
        detail_height: usize::from(area.height.saturating_sub(2)),
    }
}

/// Paints one frame.
pub fn draw(frame: &mut Frame, projection: &Projection, theme: &Theme, recent_lines: usize) {
    let area = frame.area();
    match &projection.detail {
        Some(detail) => draw_detail(frame, area, detail, projection.notice.as_deref(), theme),
        None => draw_list(frame, area, projection, theme, recent_lines),
    }
    if projection.show_help {
        draw_help(frame, area, theme);
    }
}

fn header_line(header: &Header, width: usize) -> String {
    let mut left = TITLE.to_string();
    if header.follow {
        left.push_str(" [FOLLOWING]");
    }
    if header.paused {
        left.push_str(" [PAUSED]");
    }
    if header.waiting.is_some() {
        left.push_str(" [NO LOG]");
    }
    left.push(' ');
    let stats = format!(
        "events:{} deltas:{} eps:{:.1} items:{} evicted:{} trimmed:{} rot:{} filt:{} pretty:{} start:{} ",
        header.event_count,
        header.delta_count,
        header.eps,
        header.item_count,
        header.evictions,
        header.trimmed_chars,
        header.rotations,
        header.active_filter.name(),
        header.preview.name(),
        header.start_mode.name(),
    );
    let used = left.chars().count() + stats.chars().count();
    let gap = width.saturating_sub(used).max(1);
    format!("{left}{}{stats}", " ".repeat(gap))
}

fn draw_list(frame: &mut Frame, area: Rect, projection: &Projection, theme: &Theme, recent_lines: usize) {
    let banner_visible = !projection.header.follow && projection.header.pending_updates > 0;
    let screen = Screen::split(area, banner_visible, recent_lines);
    let width = usize::from(area.width);

    frame.render_widget(
        Paragraph::new(header_line(&projection.header, width))
            .style(theme.header_style().add_modifier(Modifier::BOLD)),
        screen.header,
    );

    if banner_visible {
        let banner = format!(
            " ({}) newer updates -> press T to follow",
            projection.header.pending_updates
        );
        frame.render_widget(
            Paragraph::new(banner).style(Style::default().add_modifier(Modifier::BOLD)),
            screen.banner,
        );
    }

    let height = usize::from(screen.list.height);
    let lines: Vec<Line> = projection
        .rows
        .iter()
        .flat_map(|row| row_lines(row, theme))
        .take(height)
        .collect();
    if let (true, Some(reason)) = (lines.is_empty(), &projection.header.waiting) {
        frame.render_widget(
            Paragraph::new(format!(" waiting for log {reason}"))
                .style(theme.badge_style(LevelHint::Warn)),
            screen.list,
        );
    } else if lines.is_empty() && projection.visible_count == 0 {
        frame.render_widget(
            Paragraph::new(" waiting for events…").style(theme.dim_style()),
            screen.list,
        );
    } else {
        frame.render_widget(Paragraph::new(lines), screen.list);
    }

    let recent_title = match projection.header.recent_dropped {
        0 => " Recent logs ".to_string(),
        dropped => format!(" Recent logs ({dropped} older dropped) "),
    };
    let mut recent = vec![Line::from(Span::styled(
        recent_title,
        Style::default().add_modifier(Modifier::UNDERLINED),
    ))];
    recent.extend(projection.recent.iter().map(|view| recent_line(view, theme)));
    frame.render_widget(Paragraph::new(recent), screen.recent);

    frame.render_widget(footer(projection.notice.as_deref(), LIST_HELP, theme), screen.footer);
}

fn row_lines<'a>(row: &'a Row, theme: &Theme) -> Vec<Line<'a>> {
    let mut label_style = Style::default().add_modifier(Modifier::BOLD);
    if row.pinned {
        label_style = label_style.fg(theme.class_color(ColorClass::Notice));
    }
    let mut text_style = theme.class_style(row.color_class);
    if row.is_selected {
        label_style = label_style.add_modifier(Modifier::REVERSED);
        text_style = text_style.add_modifier(Modifier::REVERSED);
    }

    let indent = " ".repeat(row.label.chars().count());
    if row.wrapped_lines.is_empty() {
        return vec![Line::from(Span::styled(row.label.as_str(), label_style))];
    }
    row.wrapped_lines
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let prefix = if i == 0 {
                Span::styled(row.label.as_str(), label_style)
            } else {
                Span::raw(indent.clone())
            };
            Line::from(vec![prefix, Span::styled(text.as_str(), text_style)])
        })
        .collect()
}

fn recent_line<'a>(view: &'a RecentView, theme: &Theme) -> Line<'a> {
    match view.badge {
        Some(level) => Line::from(vec![
            Span::styled(format!("[{}]", level.name()), theme.badge_style(level)),
            Span::raw(" "),
            Span::raw(view.text.as_str()),
        ]),
        None => Line::from(Span::styled(view.text.as_str(), theme.class_style(view.class))),
    }
}

fn footer<'a>(notice: Option<&'a str>, help: &'a str, theme: &Theme) -> Paragraph<'a> {
    match notice {
        Some(text) => Paragraph::new(format!(" {text} "))
            .style(theme.badge_style(LevelHint::Warn)),
        None => Paragraph::new(help).style(theme.dim_style()),
    }
}

fn draw_detail(frame: &mut Frame, area: Rect, detail: &DetailPayload, notice: Option<&str>, theme: &Theme) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let pin = if detail.pinned { " [PINNED]" } else { "" };
    let title = format!(
        " View: {} [{}]{pin}  stream #{} · {} updates ",
        detail.key, detail.event_type, detail.created_order, detail.updates
    );
    frame.render_widget(
        Paragraph::new(title).style(theme.header_style().add_modifier(Modifier::BOLD)),
        chunks[0],
    );

    let base = theme.class_style(detail.color_class);
    let height = usize::from(chunks[1].height);
    let lines: Vec<Line> = detail
        .full_wrapped_lines
        .iter()
        .skip(detail.scroll_offset)
        .take(height)
        .map(|text| {
            if detail.json {
                json_line(preview::json_line_parts(text), base, theme)
            } else {
                Line::from(Span::styled(text.as_str(), base))
            }
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), chunks[1]);

    let wrap_state = if detail.json && detail.json_wrap { "on" } else { "off" };
    let help = format!(
        " ↑/↓/PgUp/PgDn/Home/End scroll  w:wrap({wrap_state})  e:export  x:pin  q/ESC:back "
    );
    frame.render_widget(footer(notice, &help, theme), chunks[2]);
}

fn json_line<'a>(parts: JsonLineParts<'a>, base: Style, theme: &Theme) -> Line<'a> {
    let value = Span::styled(parts.value, theme.json_value_style(parts.kind, base));
    match parts.key {
        Some(key) => Line::from(vec![
            Span::styled(parts.indent, base),
            Span::styled(key, theme.json_key_style()),
            Span::styled(parts.separator, base),
            value,
        ]),
        None => Line::from(vec![Span::styled(parts.indent, base), value]),
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_help(frame: &mut Frame, area: Rect, theme: &Theme) {
    let height = u16::try_from(HELP_LINES.len() + 2).unwrap_or(u16::MAX);
    let popup = centered(area, 56, height);
    let lines: Vec<Line> = HELP_LINES
        .iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(format!("{keys:>15} "), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(*what),
            ])
        })
        .collect();
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(" Help (? to close) ")
                .borders(Borders::ALL)
                .border_style(theme.header_style()),
        ),
        popup,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Aggregator, Limits, StreamKey};
    use crate::classify::ClassifiedEvent;
    use crate::view::{TickStats, ViewModel, ViewOptions};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn delta(id: &str, event_type: &str, text: &str) -> ClassifiedEvent {
        ClassifiedEvent::Delta {
            item_id: id.to_string(),
            output_index: 0,
            event_type: event_type.to_string(),
            text: text.to_string(),
        }
    }

    fn render(agg: &Aggregator, view: &mut ViewModel, width: u16, height: u16) -> String {
        render_with(agg, view, width, height, TickStats::default())
    }

    fn render_with(agg: &Aggregator, view: &mut ViewModel, width: u16, height: u16, stats: TickStats) -> String {
        let area = Rect::new(0, 0, width, height);
        let viewport = viewport_for(area, view.banner_visible(), 3);
        let projection = view.project(agg, viewport, stats);
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal
            .draw(|frame| draw(frame, &projection, &Theme::default(), 3))
            .unwrap();
        let buffer = terminal.backend().buffer().clone();
        (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| buffer[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_screen_split_reserves_fixed_rows() {
        let screen = Screen::split(Rect::new(0, 0, 80, 24), false, 3);
        assert_eq!(screen.header.height, 1);
        assert_eq!(screen.banner.height, 0);
        assert_eq!(screen.recent.height, 4);
        assert_eq!(screen.footer.height, 1);
        assert_eq!(screen.list.height, 18);

        let with_banner = Screen::split(Rect::new(0, 0, 80, 24), true, 3);
        assert_eq!(with_banner.list.height, 17);
    }

    #[test]
    fn test_viewport_for() {
        let viewport = viewport_for(Rect::new(0, 0, 100, 30), false, 3);
        assert_eq!(viewport.width, 100);
        assert_eq!(viewport.list_height, 24);
        assert_eq!(viewport.detail_width, 98);
        assert_eq!(viewport.detail_height, 28);
    }

    #[test]
    fn test_header_line_layout() {
        let header = Header {
            event_count: 10,
            delta_count: 7,
            eps: 12.34,
            item_count: 2,
            evictions: 0,
            trimmed_chars: 40,
            recent_dropped: 0,
            rotations: 1,
            waiting: None,
            active_filter: crate::state::TypeFilter::All,
            follow: true,
            preview: crate::state::PreviewMode::Off,
            paused: true,
            start_mode: crate::state::StartMode::Tail,
            pending_updates: 0,
        };
        let line = header_line(&header, 200);
        assert!(line.starts_with(" streamviz "));
        assert!(line.contains("[FOLLOWING] [PAUSED]"));
        assert!(line.contains("events:10 deltas:7 eps:12.3 items:2"));
        assert!(line.contains("trimmed:40 rot:1"));
        assert_eq!(line.chars().count(), 200);
    }

    #[test]
    fn test_list_frame() {
        let mut agg = Aggregator::new(Limits::default());
        agg.ingest(delta("fc_1", "response.function_call_arguments.delta", "{\"cmd\":"));
        agg.ingest(delta("msg_2", "response.output_text.delta", "hello world"));
        agg.note(LevelHint::Warn, "WARN disk almost full");
        let mut view = ViewModel::new(ViewOptions::default());

        let screen = render(&agg, &mut view, 80, 16);

        assert!(screen.contains("msg_2#0: hello world"), "{screen}");
        assert!(screen.contains("fc_1#0: {\"cmd\":"), "{screen}");
        assert!(screen.contains("Recent logs"));
        assert!(screen.contains("[WARN]"));
        assert!(screen.contains("q:quit"));
    }

    #[test]
    fn test_waiting_reason_replaces_empty_list() {
        let agg = Aggregator::new(Limits::default());
        let mut view = ViewModel::new(ViewOptions::default());
        let stats = TickStats {
            waiting: Some("/tmp/missing.log: No such file or directory".to_string()),
            ..TickStats::default()
        };

        let screen = render_with(&agg, &mut view, 80, 12, stats);
        assert!(screen.contains("waiting for log /tmp/missing.log"), "{screen}");
        assert!(screen.contains("[NO LOG]"), "{screen}");
        assert!(!screen.contains("waiting for events"));
    }

    #[test]
    fn test_recent_title_counts_dropped_lines() {
        let mut agg = Aggregator::new(Limits {
            recent_capacity: 2,
            ..Limits::default()
        });
        for i in 0..5 {
            agg.note(LevelHint::Info, format!("INFO line {i}"));
        }
        let mut view = ViewModel::new(ViewOptions::default());

        let screen = render(&agg, &mut view, 80, 12);
        assert!(screen.contains("Recent logs (3 older dropped)"), "{screen}");
    }

    #[test]
    fn test_banner_when_not_following() {
        let mut agg = Aggregator::new(Limits::default());
        agg.ingest(delta("a", "response.output_text.delta", "x"));
        let mut view = ViewModel::new(ViewOptions::default());
        view.project(&agg, viewport_for(Rect::new(0, 0, 80, 16), false, 3), TickStats::default());
        view.move_selection(&agg, 1);

        agg.ingest(delta("b", "response.output_text.delta", "y"));
        view.on_ingest(&agg, &StreamKey::new("b", 0));

        let screen = render(&agg, &mut view, 80, 16);
        assert!(screen.contains("(1) newer updates -> press T to follow"), "{screen}");
    }

    #[test]
    fn test_detail_frame_with_json() {
        let mut agg = Aggregator::new(Limits::default());
        agg.ingest(delta("fc_1", "response.function_call_arguments.delta", "{\"a\":1}"));
        let mut view = ViewModel::new(ViewOptions {
            json_pretty: true,
            ..ViewOptions::default()
        });
        view.project(&agg, viewport_for(Rect::new(0, 0, 60, 12), false, 3), TickStats::default());
        view.open_detail();

        let screen = render(&agg, &mut view, 60, 12);
        assert!(screen.contains("View: fc_1#0"), "{screen}");
        assert!(screen.contains("\"a\": 1"), "{screen}");
        assert!(screen.contains("w:wrap(on)"), "{screen}");
    }

    #[test]
    fn test_notice_replaces_footer() {
        let agg = Aggregator::new(Limits::default());
        let mut view = ViewModel::new(ViewOptions::default());
        view.set_notice("exported");

        let screen = render(&agg, &mut view, 60, 10);
        assert!(screen.contains("exported"));
        assert!(!screen.contains("q:quit"));
    }

    #[test]
    fn test_help_overlay() {
        let agg = Aggregator::new(Limits::default());
        let mut view = ViewModel::new(ViewOptions::default());
        view.toggle_help();

        let screen = render(&agg, &mut view, 80, 24);
        assert!(screen.contains("Help (? to close)"));
        assert!(screen.contains("follow newest"));
    }

    #[test]
    fn test_tiny_terminal_does_not_panic() {
        let mut agg = Aggregator::new(Limits::default());
        agg.ingest(delta("a", "response.output_text.delta", "some text"));
        let mut view = ViewModel::new(ViewOptions::default());
        view.toggle_help();
        render(&agg, &mut view, 5, 2);
    }
}
