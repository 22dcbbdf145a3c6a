use std::io::{self, Write};

use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use termocr_core::Intent;

mod status;
mod viewer;

pub use status::StatusLine;
pub use viewer::TerminalViewer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Intent(Intent),
    /// `intent` applied `count` times in a row.
    Repeat { intent: Intent, count: usize },
    SelectWord { delta: isize },
    Deselect,
    SearchQueryChanged { query: String },
    RecognizeAll,
    Export,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
    Baseline,
}

#[derive(Debug, Default, Clone, Copy)]
struct Slider {
    value: i32,
    range: i32,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    search_buffer: String,
    slider: Slider,
}

impl EventMapper {
    const COARSE_STEP: i32 = 5;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.mode = mode;
            if matches!(self.mode, InputMode::Search) {
                self.search_buffer.clear();
            }
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Switches to slider keys once the session reports an open baseline editor.
    /// Leaving is driven the same way, by the editor closing.
    pub fn enter_baseline(&mut self, value: i32, range: i32) {
        self.set_mode(InputMode::Baseline);
        self.slider = Slider { value, range };
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Search => self.map_event_search(event),
            InputMode::Baseline => self.map_event_baseline(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                self.push_digit(c);
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Char(' '), KeyModifiers::NONE)
            | (KeyCode::Down, KeyModifiers::NONE) => self.repeat(Intent::NextPage),
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                self.repeat(Intent::PrevPage)
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                self.goto_or(Intent::GotoPage { page: 0 })
            }
            (KeyCode::Char('G'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                self.goto_or(Intent::GotoPage { page: usize::MAX })
            }
            (KeyCode::End, _) => self.goto_or(Intent::GotoPage { page: usize::MAX }),
            (KeyCode::Enter, _) => match self.take_digits() {
                Some(raw) => UiEvent::Intent(Intent::GotoPageInput { raw }),
                None => UiEvent::None,
            },
            (KeyCode::Char('/'), KeyModifiers::NONE) => self.open_find(),
            (KeyCode::Char('f'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.open_find()
            }
            (KeyCode::Char('n'), KeyModifiers::NONE) => self.repeat(Intent::NextMatch),
            (KeyCode::Char('N'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                self.repeat(Intent::PrevMatch)
            }
            (KeyCode::Char('w'), KeyModifiers::NONE) | (KeyCode::Tab, KeyModifiers::NONE) => {
                let delta = self.take_count() as isize;
                UiEvent::SelectWord { delta }
            }
            (KeyCode::Char('b'), KeyModifiers::NONE) | (KeyCode::BackTab, _) => {
                let delta = self.take_count() as isize;
                UiEvent::SelectWord { delta: -delta }
            }
            (KeyCode::Esc, _) => {
                self.reset_count();
                UiEvent::Deselect
            }
            (KeyCode::Char('B'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                self.reset_count();
                UiEvent::Intent(Intent::ToggleBaselineEditor)
            }
            (KeyCode::Char('r'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::RecognizeAll
            }
            (KeyCode::Char('e'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Export
            }
            (KeyCode::Char('x'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Intent(Intent::Clear)
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_event_search(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::Intent(Intent::CloseFind)
            }
            // Stays in search mode so a repeated Enter walks the matches.
            (KeyCode::Enter, modifiers) => UiEvent::Intent(Intent::SubmitSearch {
                term: self.search_buffer.clone(),
                backwards: modifiers.contains(KeyModifiers::SHIFT),
            }),
            (KeyCode::Char('n'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Intent(Intent::NextMatch)
            }
            (KeyCode::Char('p'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Intent(Intent::PrevMatch)
            }
            (KeyCode::Backspace, _) => {
                self.search_buffer.pop();
                UiEvent::SearchQueryChanged {
                    query: self.search_buffer.clone(),
                }
            }
            (KeyCode::Char(c), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                self.search_buffer.push(c);
                UiEvent::SearchQueryChanged {
                    query: self.search_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn map_event_baseline(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                self.push_digit(c);
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                let steps = self.take_count() as i32;
                self.slide(steps)
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                let steps = self.take_count() as i32;
                self.slide(-steps)
            }
            (KeyCode::Char('J'), _) => self.slide(Self::COARSE_STEP),
            (KeyCode::Char('K'), _) => self.slide(-Self::COARSE_STEP),
            (KeyCode::Enter, _) => {
                self.reset_count();
                UiEvent::Intent(Intent::BaselineRelease {
                    value: self.slider.value,
                })
            }
            (KeyCode::Esc, _) | (KeyCode::Char('B'), _) => {
                self.reset_count();
                UiEvent::Intent(Intent::ToggleBaselineEditor)
            }
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn open_find(&mut self) -> UiEvent {
        self.set_mode(InputMode::Search);
        UiEvent::Intent(Intent::OpenFind)
    }

    fn slide(&mut self, delta: i32) -> UiEvent {
        let max = self.slider.range.saturating_mul(2);
        self.slider.value = self.slider.value.saturating_add(delta).clamp(0, max);
        UiEvent::Intent(Intent::BaselineSlide {
            value: self.slider.value,
        })
    }

    fn repeat(&mut self, intent: Intent) -> UiEvent {
        match self.take_count() {
            1 => UiEvent::Intent(intent),
            count => UiEvent::Repeat { intent, count },
        }
    }

    /// A typed number turns `g` and `G` into a page jump.
    fn goto_or(&mut self, fallback: Intent) -> UiEvent {
        match self.take_digits() {
            Some(raw) => UiEvent::Intent(Intent::GotoPageInput { raw }),
            None => UiEvent::Intent(fallback),
        }
    }

    fn push_digit(&mut self, c: char) {
        let Some(digit) = c.to_digit(10) else {
            return;
        };
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(digit as usize));
        self.pending_digits.push(c);
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn take_digits(&mut self) -> Option<String> {
        self.pending_count = None;
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending_digits))
        }
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if matches!(self.mode, InputMode::Search) {
            return Some(format!("/{}", self.search_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, row: u16, label: &str) -> io::Result<()> {
    crossterm::queue!(
        writer,
        crossterm::cursor::MoveTo(0, row),
        crossterm::terminal::Clear(crossterm::terminal::ClearType::CurrentLine),
        crossterm::style::Print(label)
    )?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn type_chars(mapper: &mut EventMapper, text: &str) {
        for c in text.chars() {
            mapper.map_event(key_event(KeyCode::Char(c)));
        }
    }

    #[test]
    fn event_mapper_uses_numeric_prefix_for_next_page() {
        let mut mapper = EventMapper::new();
        type_chars(&mut mapper, "12");
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Repeat {
                intent: Intent::NextPage,
                count,
            } => assert_eq!(count, 12),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('k'))),
            UiEvent::Intent(Intent::PrevPage)
        );
    }

    #[test]
    fn event_mapper_drops_prefix_on_other_command() {
        let mut mapper = EventMapper::new();
        type_chars(&mut mapper, "4");
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('e'))), UiEvent::Export);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Intent(Intent::NextPage)
        );
    }

    #[test]
    fn event_mapper_digits_with_g_jump_to_page() {
        let mut mapper = EventMapper::new();
        type_chars(&mut mapper, "07");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Intent(Intent::GotoPageInput {
                raw: "07".to_string()
            })
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Intent(Intent::GotoPage { page: 0 })
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Intent(Intent::GotoPage { page: usize::MAX })
        );
        type_chars(&mut mapper, "3");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::Intent(Intent::GotoPageInput {
                raw: "3".to_string()
            })
        );
        assert_eq!(mapper.map_event(key_event(KeyCode::Enter)), UiEvent::None);
    }

    #[test]
    fn event_mapper_slash_and_ctrl_f_open_find() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('f'),
                KeyModifiers::CONTROL
            )),
            UiEvent::Intent(Intent::OpenFind)
        );
        assert_eq!(mapper.mode(), InputMode::Search);
        assert_eq!(mapper.pending_input().as_deref(), Some("/"));

        mapper.set_mode(InputMode::Normal);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('/'))),
            UiEvent::Intent(Intent::OpenFind)
        );
    }

    #[test]
    fn event_mapper_search_mode_collects_and_resubmits() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('/')));

        match mapper.map_event(key_event(KeyCode::Char('f'))) {
            UiEvent::SearchQueryChanged { ref query } => assert_eq!(query, "f"),
            other => panic!("unexpected event: {:?}", other),
        }
        type_chars(&mut mapper, "ox");
        assert_eq!(mapper.pending_input().as_deref(), Some("/fox"));

        let submit = UiEvent::Intent(Intent::SubmitSearch {
            term: "fox".to_string(),
            backwards: false,
        });
        assert_eq!(mapper.map_event(key_event(KeyCode::Enter)), submit);
        assert_eq!(mapper.mode(), InputMode::Search);
        assert_eq!(mapper.map_event(key_event(KeyCode::Enter)), submit);
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Enter,
                KeyModifiers::SHIFT
            )),
            UiEvent::Intent(Intent::SubmitSearch {
                term: "fox".to_string(),
                backwards: true,
            })
        );

        match mapper.map_event(key_event(KeyCode::Backspace)) {
            UiEvent::SearchQueryChanged { ref query } => assert_eq!(query, "fo"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::Intent(Intent::CloseFind)
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_maps_match_navigation() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('n'))),
            UiEvent::Intent(Intent::NextMatch)
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('N'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Intent(Intent::PrevMatch)
        );
        type_chars(&mut mapper, "3");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('n'))),
            UiEvent::Repeat {
                intent: Intent::NextMatch,
                count: 3
            }
        );
    }

    #[test]
    fn event_mapper_maps_word_selection() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('w'))),
            UiEvent::SelectWord { delta: 1 }
        );
        type_chars(&mut mapper, "2");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('b'))),
            UiEvent::SelectWord { delta: -2 }
        );
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::Deselect);
    }

    #[test]
    fn event_mapper_baseline_mode_slides_within_range() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('B'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Intent(Intent::ToggleBaselineEditor)
        );
        mapper.enter_baseline(25, 25);
        assert_eq!(mapper.mode(), InputMode::Baseline);

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Intent(Intent::BaselineSlide { value: 26 })
        );
        type_chars(&mut mapper, "4");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Up)),
            UiEvent::Intent(Intent::BaselineSlide { value: 22 })
        );
        for _ in 0..10 {
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('J'),
                KeyModifiers::SHIFT,
            ));
        }
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::Intent(Intent::BaselineRelease { value: 50 })
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::Intent(Intent::ToggleBaselineEditor)
        );
    }

    #[test]
    fn event_mapper_switching_modes_clears_pending_state() {
        let mut mapper = EventMapper::new();
        type_chars(&mut mapper, "1");
        assert_eq!(mapper.pending_input().as_deref(), Some("1"));

        mapper.enter_baseline(10, 25);
        assert!(mapper.pending_input().is_none());
        mapper.set_mode(InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn status_line_is_written_on_requested_row() {
        let mut out = Vec::new();
        write_status_line(&mut out, 3, "page 1/2").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("\u{1b}[4;1H"));
        assert!(text.ends_with("page 1/2"));
    }
}
