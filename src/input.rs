//! Keyboard handling.
//!
//! Keys map to [`Action`]s; the list view and the detail view read the same
//! key differently (`q` quits the list but leaves the detail view).

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Input action resulting from a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Quit the application.
    Quit,
    /// Leave the detail view.
    Back,
    /// Move selection or scroll up.
    Up,
    /// Move selection or scroll down.
    Down,
    /// Scroll one page up.
    PageUp,
    /// Scroll one page down.
    PageDown,
    /// Scroll to the first line.
    Home,
    /// Scroll to the last line.
    End,
    /// Open the detail view for the selection.
    OpenDetail,
    /// Pin or unpin the current stream.
    TogglePin,
    /// Export the current stream.
    Export,
    /// Cycle the event-type filter.
    CycleFilter,
    /// Drop every stream.
    Clear,
    /// Pause or resume ingestion.
    TogglePause,
    /// Switch between reading from start and tailing.
    ToggleStart,
    /// Redraw immediately.
    Refresh,
    /// Cycle the preview mode.
    CyclePreview,
    /// Expand or collapse the selected row.
    ToggleExpand,
    /// Follow the newest stream.
    FollowNewest,
    /// Toggle wrapping of pretty JSON.
    ToggleJsonWrap,
    /// Toggle help.
    Help,
    /// No action.
    None,
}

/// Input handler with configurable vim keys.
#[derive(Debug, Clone)]
pub struct InputHandler {
    /// Enable vim-style keys (`j`/`k`, `g`/`G`).
    pub vim_keys: bool,
}

impl InputHandler {
    /// Creates a new input handler.
    #[must_use]
    pub fn new(vim_keys: bool) -> Self {
        Self { vim_keys }
    }

    /// Maps a key to an action for the active view.
    #[must_use]
    pub fn handle_key(&self, event: KeyEvent, in_detail: bool) -> Action {
        if event.modifiers.contains(KeyModifiers::CONTROL) {
            return match event.code {
                KeyCode::Char('c') => Action::Quit,
                _ => Action::None,
            };
        }

        match event.code {
            KeyCode::Up => return Action::Up,
            KeyCode::Down => return Action::Down,
            KeyCode::Char('k') if self.vim_keys => return Action::Up,
            KeyCode::Char('j') if self.vim_keys => return Action::Down,
            KeyCode::Char('?') | KeyCode::F(1) => return Action::Help,
            _ => {}
        }

        if in_detail {
            self.detail_key(event.code)
        } else {
            Self::list_key(event.code)
        }
    }

    fn list_key(code: KeyCode) -> Action {
        match code {
            KeyCode::Char('q' | 'Q') => Action::Quit,
            KeyCode::Esc => Action::None,
            KeyCode::Enter => Action::OpenDetail,
            KeyCode::Char('x' | 'X') => Action::TogglePin,
            KeyCode::Char('e' | 'E') => Action::Export,
            KeyCode::Char('f' | 'F') => Action::CycleFilter,
            KeyCode::Char('c' | 'C') => Action::Clear,
            KeyCode::Char('p' | 'P') => Action::TogglePause,
            KeyCode::Char('s' | 'S') => Action::ToggleStart,
            KeyCode::Char(' ') | KeyCode::F(5) => Action::Refresh,
            KeyCode::Char('b' | 'B') => Action::CyclePreview,
            KeyCode::Char('m' | 'M') => Action::ToggleExpand,
            KeyCode::Char('T') => Action::FollowNewest,
            _ => Action::None,
        }
    }

    fn detail_key(&self, code: KeyCode) -> Action {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => Action::Back,
            KeyCode::PageUp => Action::PageUp,
            KeyCode::PageDown => Action::PageDown,
            KeyCode::Home => Action::Home,
            KeyCode::End => Action::End,
            KeyCode::Char('g') if self.vim_keys => Action::Home,
            KeyCode::Char('G') if self.vim_keys => Action::End,
            KeyCode::Char('w' | 'W') => Action::ToggleJsonWrap,
            KeyCode::Char('e' | 'E') => Action::Export,
            KeyCode::Char('x' | 'X') => Action::TogglePin,
            _ => Action::None,
        }
    }
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new(true)
    }
}
