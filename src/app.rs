//! Main application loop.
//!
//! One cooperative loop drives everything. Each tick polls the tailer (unless
//! paused), classifies and ingests the new lines, applies the keys queued
//! during the previous wait, projects the view and draws it, then waits for
//! input until the tick deadline.

use std::io::{self, stdout};
use std::path::PathBuf;
use std::time::Instant;

use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::Terminal;
use tracing::{debug, info, warn};

use crate::aggregator::{Aggregator, Ingested, StreamKey};
use crate::classify::{Classifier, LevelHint};
use crate::config::Config;
use crate::eps::EpsSampler;
use crate::error::{Result, StreamvizError};
use crate::export::{ExportRequest, Exporter, FileExporter};
use crate::input::{Action, InputHandler};
use crate::tailer::Tailer;
use crate::theme::Theme;
use crate::time_scope;
use crate::ui;
use crate::view::{Projection, TickStats, ViewModel, Viewport};

/// The dashboard.
pub struct App {
    config: Config,
    theme: Theme,
    tailer: Tailer,
    classifier: Classifier,
    aggregator: Aggregator,
    view: ViewModel,
    eps: EpsSampler,
    exporter: Box<dyn Exporter>,
    input: InputHandler,
    paused: bool,
    should_quit: bool,
    /// Keys read while waiting; mapped when applied so they see the view
    /// left by the keys before them.
    pending_keys: Vec<KeyEvent>,
}

impl App {
    /// Creates an application with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let exporter = Box::new(FileExporter::new(config.export_dir.clone()));
        Self {
            theme: config.theme.clone(),
            tailer: Tailer::new(config.log_path.clone(), config.start_mode(), config.max_read_bytes),
            classifier: Classifier::new(!config.keep_ansi),
            aggregator: Aggregator::new(config.limits()),
            view: ViewModel::new(config.view_options()),
            eps: EpsSampler::new(config.eps_window(), Instant::now()),
            exporter,
            input: InputHandler::new(config.vim_keys),
            paused: false,
            should_quit: false,
            pending_keys: Vec::new(),
            config,
        }
    }

    /// Replaces the exporter.
    #[must_use]
    pub fn with_exporter(mut self, exporter: Box<dyn Exporter>) -> Self {
        self.exporter = exporter;
        self
    }

    /// Stream state.
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Interactive state.
    pub fn view(&self) -> &ViewModel {
        &self.view
    }

    /// The file follower.
    pub fn tailer(&self) -> &Tailer {
        &self.tailer
    }

    /// Whether ingestion is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the application should exit.
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Runs the application main loop.
    ///
    /// # Errors
    ///
    /// Returns an error if terminal setup or rendering fails.
    pub fn run(&mut self) -> Result<()> {
        info!(
            path = %self.config.log_path.display(),
            mode = self.tailer.mode().name(),
            "starting dashboard"
        );

        enable_raw_mode()?;
        stdout().execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout());
        let mut terminal = Terminal::new(backend)?;

        let result = self.main_loop(&mut terminal);

        disable_raw_mode()?;
        stdout().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        info!(
            events = self.aggregator.event_count(),
            evictions = self.aggregator.evictions(),
            "dashboard stopped"
        );
        result
    }

    fn main_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        let tick = self.config.tick_interval();

        loop {
            let started = Instant::now();

            self.ingest(started);
            self.apply_pending();
            if self.should_quit {
                break;
            }

            let size = terminal.size()?;
            let area = Rect::new(0, 0, size.width, size.height);
            let projection = self.project(ui::viewport_for(
                area,
                self.view.banner_visible(),
                self.config.recent_lines,
            ));
            {
                time_scope!("draw");
                terminal.draw(|frame| {
                    ui::draw(frame, &projection, &self.theme, self.config.recent_lines);
                })?;
            }

            self.wait_for_input(started + tick)?;
        }

        Ok(())
    }

    /// Queues key presses until `deadline`, never blocking past it.
    fn wait_for_input(&mut self, deadline: Instant) -> Result<()> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !event::poll(remaining)? {
                return Ok(());
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => self.queue_key(key),
                Event::Resize(..) => return Ok(()),
                _ => {}
            }
        }
    }

    /// Polls the tailer unless paused, ingests what it returned and samples
    /// the event rate. Returns the number of lines ingested.
    pub fn ingest(&mut self, now: Instant) -> usize {
        time_scope!("ingest");
        let mut count = 0;
        if !self.paused {
            for line in self.tailer.poll() {
                let event = self.classifier.classify(&line);
                if let Ingested::Delta { key, .. } = self.aggregator.ingest_at(event, line.arrived_at) {
                    self.view.on_ingest(&self.aggregator, &key);
                }
                count += 1;
            }
        }
        self.eps.sample(now, self.aggregator.event_count());
        count
    }

    /// Queues a key press for the next tick.
    pub fn queue_key(&mut self, key: KeyEvent) {
        self.pending_keys.push(key);
    }

    /// Applies queued keys in arrival order.
    pub fn apply_pending(&mut self) {
        for key in std::mem::take(&mut self.pending_keys) {
            let action = self.input.handle_key(key, self.view.in_detail());
            if action != Action::None {
                self.view.dismiss_notice();
            }
            self.handle_action(action);
            if self.should_quit {
                break;
            }
        }
    }

    /// Builds this tick's renderer payload.
    pub fn project(&mut self, viewport: Viewport) -> Projection {
        time_scope!("project");
        let stats = TickStats {
            eps: self.eps.eps(),
            paused: self.paused,
            start_mode: self.tailer.mode(),
            rotations: self.tailer.rotations(),
            waiting: self
                .tailer
                .open_error()
                .map(|err| format!("{}: {err}", self.tailer.path().display())),
        };
        self.view.project(&self.aggregator, viewport, stats)
    }

    /// Handles an input action.
    pub fn handle_action(&mut self, action: Action) {
        let in_detail = self.view.in_detail();
        match action {
            Action::Quit => self.should_quit = true,
            Action::Back => self.view.close_detail(),
            Action::Up if in_detail => self.view.scroll_detail(-1),
            Action::Down if in_detail => self.view.scroll_detail(1),
            Action::Up => self.view.move_selection(&self.aggregator, -1),
            Action::Down => self.view.move_selection(&self.aggregator, 1),
            Action::PageUp => self.view.page_up(),
            Action::PageDown => self.view.page_down(),
            Action::Home => self.view.scroll_home(),
            Action::End => self.view.scroll_end(),
            Action::OpenDetail => self.view.open_detail(),
            Action::TogglePin => {
                if let Some(key) = self.view.target().cloned() {
                    if let Some(pinned) = self.aggregator.toggle_pin(&key) {
                        debug!(stream = %key, pinned, "pin toggled");
                        if !pinned {
                            let evicted = self.aggregator.evict_if_over_capacity();
                            if !evicted.is_empty() {
                                debug!(count = evicted.len(), "over capacity after unpin");
                            }
                        }
                    }
                }
            }
            Action::Export => self.export_target(),
            Action::CycleFilter => self.view.cycle_filter(),
            Action::Clear => {
                self.aggregator.clear();
                self.view.reset();
            }
            Action::TogglePause => {
                self.paused = !self.paused;
                debug!(paused = self.paused, "ingestion toggled");
            }
            Action::ToggleStart => {
                let mode = self.tailer.mode().toggled();
                self.tailer.set_mode(mode);
            }
            Action::CyclePreview => self.view.cycle_preview(),
            Action::ToggleExpand => self.view.toggle_expanded(),
            Action::FollowNewest => self.view.jump_to_newest(&self.aggregator),
            Action::ToggleJsonWrap => self.view.toggle_json_wrap(),
            Action::Help => self.view.toggle_help(),
            Action::Refresh | Action::None => {}
        }
    }

    /// Exports one stream through the configured exporter.
    ///
    /// # Errors
    ///
    /// Returns [`StreamvizError::StreamGone`] if the stream is no longer held,
    /// or the exporter's error.
    pub fn export_stream(&self, key: &StreamKey) -> Result<PathBuf> {
        let entry = self
            .aggregator
            .get(key)
            .ok_or_else(|| StreamvizError::StreamGone(key.to_string()))?;
        self.exporter.export(&ExportRequest::from_entry(entry))
    }

    fn export_target(&mut self) {
        let Some(key) = self.view.target().cloned() else {
            return;
        };
        match self.export_stream(&key) {
            Ok(path) => {
                self.aggregator
                    .note(LevelHint::Info, format!("INFO export -> {}", path.display()));
                self.view.set_notice(format!("exported {key} -> {}", path.display()));
            }
            Err(e) => {
                warn!(stream = %key, error = %e, "export failed");
                self.aggregator
                    .note(LevelHint::Error, format!("ERROR export failed: {e}"));
                self.view.set_notice(format!("export failed: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StartMode;
    use crossterm::event::{KeyCode, KeyModifiers};
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    struct FailingExporter;

    impl Exporter for FailingExporter {
        fn export(&self, _request: &ExportRequest) -> Result<PathBuf> {
            Err(StreamvizError::ExportFailed {
                path: PathBuf::from("/readonly/out.txt"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
    }

    fn sse(item: &str, event_type: &str, delta: &str) -> String {
        format!(
            "SSE event: {{\"type\":\"{event_type}\",\"item_id\":\"{item}\",\"output_index\":0,\"delta\":\"{delta}\"}}\n"
        )
    }

    fn app_for(file: &NamedTempFile) -> App {
        App::new(Config {
            log_path: file.path().to_path_buf(),
            from_start: true,
            ..Config::default()
        })
    }

    fn viewport() -> Viewport {
        Viewport {
            width: 80,
            list_height: 20,
            detail_width: 78,
            detail_height: 22,
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::empty())
    }

    #[test]
    fn test_app_ingests_lines() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(sse("msg_1", "response.output_text.delta", "hel").as_bytes())
            .unwrap();
        file.write_all(sse("msg_1", "response.output_text.delta", "lo").as_bytes())
            .unwrap();
        file.write_all(b"INFO plain line\n").unwrap();
        file.flush().unwrap();

        let mut app = app_for(&file);
        assert_eq!(app.ingest(Instant::now()), 3);

        let entry = app.aggregator().get(&StreamKey::new("msg_1", 0)).unwrap();
        assert_eq!(entry.content().snapshot(), "hello");
        assert_eq!(app.aggregator().recent().len(), 1);
    }

    #[test]
    fn test_unpin_restores_item_cap() {
        let mut file = NamedTempFile::new().unwrap();
        let mut app = App::new(Config {
            log_path: file.path().to_path_buf(),
            from_start: true,
            max_items: 1,
            ..Config::default()
        });
        let a = StreamKey::new("A", 0);
        let b = StreamKey::new("B", 0);

        file.write_all(sse("A", "response.output_text.delta", "x").as_bytes())
            .unwrap();
        file.flush().unwrap();
        app.ingest(Instant::now());
        app.project(viewport());
        app.handle_action(Action::TogglePin);
        assert!(app.aggregator().get(&a).unwrap().pinned());

        file.write_all(sse("B", "response.output_text.delta", "y").as_bytes())
            .unwrap();
        file.flush().unwrap();
        app.ingest(Instant::now());
        app.project(viewport());
        assert_eq!(app.aggregator().len(), 2);

        // The pinned entry stays on top, so the toggle unpins A.
        app.handle_action(Action::TogglePin);

        assert_eq!(app.aggregator().len(), 1);
        assert_eq!(app.aggregator().pinned_count(), 0);
        assert!(app.aggregator().contains(&b));
        assert!(!app.aggregator().contains(&a));
        assert_eq!(app.aggregator().evictions(), 1);
    }

    #[test]
    fn test_missing_log_is_shown_as_waiting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.log");
        let mut app = App::new(Config {
            log_path: path.clone(),
            ..Config::default()
        });

        app.ingest(Instant::now());
        let waiting = app.project(viewport()).header.waiting.unwrap();
        assert!(waiting.starts_with(&path.display().to_string()));

        std::fs::write(&path, "hello\n").unwrap();
        app.ingest(Instant::now());
        assert!(app.project(viewport()).header.waiting.is_none());
    }

    #[test]
    fn test_app_handle_quit() {
        let file = NamedTempFile::new().unwrap();
        let mut app = app_for(&file);
        assert!(!app.should_quit());
        app.handle_action(Action::Quit);
        assert!(app.should_quit());
    }

    #[test]
    fn test_pause_stops_polling() {
        let mut file = NamedTempFile::new().unwrap();
        let mut app = app_for(&file);
        app.handle_action(Action::TogglePause);
        assert!(app.is_paused());

        file.write_all(b"first\n").unwrap();
        file.flush().unwrap();
        assert_eq!(app.ingest(Instant::now()), 0);

        app.handle_action(Action::TogglePause);
        assert_eq!(app.ingest(Instant::now()), 1);
    }

    #[test]
    fn test_clear_resets_view() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(sse("a", "response.output_text.delta", "x").as_bytes())
            .unwrap();
        file.flush().unwrap();
        let mut app = app_for(&file);
        app.ingest(Instant::now());
        app.project(viewport());
        assert!(app.view().selected().is_some());

        app.handle_action(Action::Clear);

        assert!(app.aggregator().is_empty());
        assert!(app.view().selected().is_none());
        assert_eq!(app.aggregator().event_count(), 1);
    }

    #[test]
    fn test_keys_are_mapped_in_order() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(sse("a", "response.output_text.delta", "x").as_bytes())
            .unwrap();
        file.flush().unwrap();
        let mut app = app_for(&file);
        app.ingest(Instant::now());
        app.project(viewport());

        // Enter opens the detail view, so the following `q` only leaves it.
        app.queue_key(key(KeyCode::Enter));
        app.queue_key(key(KeyCode::Char('q')));
        app.apply_pending();

        assert!(!app.should_quit());
        assert!(!app.view().in_detail());
    }

    #[test]
    fn test_pin_from_detail_view() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(sse("a", "response.output_text.delta", "x").as_bytes())
            .unwrap();
        file.flush().unwrap();
        let mut app = app_for(&file);
        app.ingest(Instant::now());
        app.project(viewport());
        app.handle_action(Action::OpenDetail);

        app.handle_action(Action::TogglePin);

        assert!(app.aggregator().get(&StreamKey::new("a", 0)).unwrap().pinned());
    }

    #[test]
    fn test_export_success_is_noted() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(sse("fc_1", "response.function_call_arguments.delta", "{}").as_bytes())
            .unwrap();
        file.flush().unwrap();
        let dir = tempdir().unwrap();
        let mut app = app_for(&file).with_exporter(Box::new(FileExporter::new(dir.path())));
        app.ingest(Instant::now());
        app.project(viewport());

        app.handle_action(Action::Export);

        let last = app.aggregator().recent().latest().unwrap();
        assert_eq!(last.level, LevelHint::Info);
        assert!(last.text.starts_with("INFO export -> "));
        assert!(app.view().notice().unwrap().starts_with("exported fc_1#0"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_export_failure_is_not_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(sse("a", "response.output_text.delta", "x").as_bytes())
            .unwrap();
        file.flush().unwrap();
        let mut app = app_for(&file).with_exporter(Box::new(FailingExporter));
        app.ingest(Instant::now());
        app.project(viewport());

        app.handle_action(Action::Export);

        assert!(!app.should_quit());
        let last = app.aggregator().recent().latest().unwrap();
        assert_eq!(last.level, LevelHint::Error);
        assert!(last.text.starts_with("ERROR export failed"));
        assert!(app.view().notice().unwrap().starts_with("export failed"));
    }

    #[test]
    fn test_export_unknown_stream() {
        let file = NamedTempFile::new().unwrap();
        let app = app_for(&file);

        let err = app.export_stream(&StreamKey::new("gone", 0)).unwrap_err();
        assert!(matches!(err, StreamvizError::StreamGone(ref id) if id == "gone#0"));
    }

    #[test]
    fn test_key_dismisses_notice() {
        let file = NamedTempFile::new().unwrap();
        let mut app = app_for(&file).with_exporter(Box::new(FailingExporter));
        app.view.set_notice("something happened");

        app.queue_key(key(KeyCode::Char('f')));
        app.apply_pending();

        assert!(app.view().notice().is_none());
    }

    #[test]
    fn test_toggle_start_mode() {
        let file = NamedTempFile::new().unwrap();
        let mut app = app_for(&file);
        assert_eq!(app.tailer().mode(), StartMode::FromStart);

        app.handle_action(Action::ToggleStart);
        assert_eq!(app.tailer().mode(), StartMode::Tail);
        assert_eq!(app.project(viewport()).header.start_mode, StartMode::Tail);
    }
}
