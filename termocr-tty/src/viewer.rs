use std::io::{self, Write};
use std::sync::Arc;

use crossterm::{
    cursor, queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType},
};
use termocr_core::{Engine, LineId, RenderedWord, Viewer, WordUpdate};
use tracing::debug;

#[derive(Debug, Clone)]
struct DrawnWord {
    word: RenderedWord,
    text: String,
}

/// Draws the current page as text, one row per OCR line.
pub struct TerminalViewer {
    engine: Arc<dyn Engine>,
    current: usize,
    words: Vec<DrawnWord>,
    selection: Option<usize>,
    highlight: Option<String>,
    dirty: bool,
}

impl TerminalViewer {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            current: 0,
            words: Vec::new(),
            selection: None,
            highlight: None,
            dirty: true,
        }
    }

    /// Moves the selection cursor by `delta` words, starting at the first word.
    pub fn select_word(&mut self, delta: isize) {
        if self.words.is_empty() {
            self.selection = None;
            return;
        }
        let last = self.words.len() as isize - 1;
        let next = match self.selection {
            Some(index) => (index as isize + delta).clamp(0, last),
            None if delta < 0 => last,
            None => 0,
        };
        self.selection = Some(next as usize);
        self.dirty = true;
    }

    pub fn clear_selection(&mut self) {
        if self.selection.take().is_some() {
            self.dirty = true;
        }
    }

    pub fn selected_text(&self) -> Option<&str> {
        self.selection
            .and_then(|index| self.words.get(index))
            .map(|drawn| drawn.text.as_str())
    }

    /// Returns whether anything changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn load_words(&mut self, page: usize) {
        self.words.clear();
        self.selection = None;
        let Some(layout) = self.engine.page_layout(page) else {
            debug!(page, "no layout for page");
            return;
        };
        for line in &layout.lines {
            let top = line.baseline.1.round() as i32;
            for word in &line.words {
                self.words.push(DrawnWord {
                    word: RenderedWord {
                        id: word.id.clone(),
                        page,
                        line: line.id,
                        superscript: word.superscript,
                        top_baseline_orig: top,
                        top_baseline: top,
                        y_actual: top,
                        baseline_adj: 0,
                    },
                    text: word.text.clone(),
                });
            }
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match &self.highlight {
            Some(term) if !term.is_empty() => text.to_lowercase().contains(&term.to_lowercase()),
            _ => false,
        }
    }

    /// Writes up to `rows` lines of the page starting at `top`.
    pub fn draw<W: Write>(&self, writer: &mut W, top: u16, rows: u16) -> io::Result<()> {
        let mut row = 0u16;
        let mut line: Option<LineId> = None;
        for (index, drawn) in self.words.iter().enumerate() {
            if line != Some(drawn.word.line) {
                if row >= rows {
                    break;
                }
                line = Some(drawn.word.line);
                queue!(
                    writer,
                    cursor::MoveTo(0, top + row),
                    Clear(ClearType::CurrentLine),
                    Print(format!("{:>5} \u{2502} ", drawn.word.y_actual))
                )?;
                row += 1;
            }
            let selected = self.selection == Some(index);
            let matched = self.is_match(&drawn.text);
            if selected {
                queue!(writer, SetAttribute(Attribute::Reverse))?;
            } else if matched {
                queue!(writer, SetAttribute(Attribute::Bold))?;
            }
            if drawn.word.superscript {
                queue!(writer, Print('^'))?;
            }
            queue!(writer, Print(&drawn.text))?;
            if selected || matched {
                queue!(writer, SetAttribute(Attribute::Reset))?;
            }
            queue!(writer, Print(' '))?;
        }
        while row < rows {
            queue!(
                writer,
                cursor::MoveTo(0, top + row),
                Clear(ClearType::CurrentLine)
            )?;
            row += 1;
        }
        writer.flush()
    }
}

impl Viewer for TerminalViewer {
    fn current_page(&self) -> usize {
        self.current
    }

    fn display_page(&mut self, page: usize) {
        self.current = page;
        self.load_words(page);
        self.dirty = true;
    }

    fn render_overlay(&mut self, page: usize) {
        // Only the current page is on screen.
        if page == self.current {
            self.load_words(page);
            self.dirty = true;
        }
    }

    fn redraw_text_layer(&mut self) {
        self.dirty = true;
    }

    fn selected_words(&self) -> Vec<RenderedWord> {
        self.selection
            .and_then(|index| self.words.get(index))
            .map(|drawn| vec![drawn.word.clone()])
            .unwrap_or_default()
    }

    fn rendered_words(&self) -> Vec<RenderedWord> {
        self.words.iter().map(|drawn| drawn.word.clone()).collect()
    }

    fn update_word(&mut self, update: &WordUpdate) {
        let Some(drawn) = self.words.iter_mut().find(|drawn| drawn.word.id == update.id) else {
            return;
        };
        drawn.word.top_baseline = update.top_baseline;
        if let Some(y) = update.y_actual {
            drawn.word.y_actual = y;
        }
        if let Some(adj) = update.baseline_adj {
            drawn.word.baseline_adj = adj;
        }
        self.dirty = true;
    }

    fn set_search_highlight(&mut self, term: Option<&str>) {
        self.highlight = term.map(str::to_string);
        self.dirty = true;
    }

    fn clear(&mut self) {
        self.current = 0;
        self.words.clear();
        self.selection = None;
        self.highlight = None;
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use termocr_core::{ImportSource, ProgressReporter, SessionConfig, SessionController};
    use termocr_text::TextEngine;

    async fn engine_with(contents: &str) -> Arc<dyn Engine> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.txt");
        fs::write(&path, contents).unwrap();
        let engine = TextEngine::new();
        engine
            .import(vec![ImportSource::from_path(&path)], ProgressReporter::detached())
            .await
            .unwrap();
        Arc::new(engine)
    }

    #[tokio::test]
    async fn display_page_builds_words_from_layout() {
        let engine = engine_with("one two\nthree\x0cfour").await;
        let mut viewer = TerminalViewer::new(engine);
        viewer.display_page(0);

        let words = viewer.rendered_words();
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].line, words[1].line);
        assert_ne!(words[1].line, words[2].line);
        assert!(words.iter().all(|w| w.top_baseline == w.top_baseline_orig));

        viewer.display_page(1);
        assert_eq!(viewer.current_page(), 1);
        assert_eq!(viewer.rendered_words().len(), 1);
    }

    #[tokio::test]
    async fn selection_cursor_clamps_and_resets_on_redisplay() {
        let engine = engine_with("a b c").await;
        let mut viewer = TerminalViewer::new(engine);
        viewer.display_page(0);
        assert!(viewer.selected_words().is_empty());

        viewer.select_word(-1);
        assert_eq!(viewer.selected_text(), Some("c"));
        viewer.select_word(-5);
        assert_eq!(viewer.selected_text(), Some("a"));
        viewer.select_word(1);
        assert_eq!(viewer.selected_words().len(), 1);
        assert_eq!(viewer.selected_text(), Some("b"));

        viewer.display_page(0);
        assert_eq!(viewer.selected_text(), None);
    }

    #[tokio::test]
    async fn overlay_refresh_ignores_offscreen_pages() {
        let engine = engine_with("a\x0cb").await;
        let mut viewer = TerminalViewer::new(engine);
        viewer.display_page(0);
        viewer.select_word(1);
        viewer.take_dirty();

        viewer.render_overlay(1);
        assert!(!viewer.take_dirty());
        assert_eq!(viewer.selected_text(), Some("a"));
    }

    #[tokio::test]
    async fn draw_marks_selection_and_matches() {
        let engine = engine_with("the fox ran").await;
        let mut viewer = TerminalViewer::new(engine);
        viewer.display_page(0);
        viewer.set_search_highlight(Some("FOX"));
        viewer.select_word(1);

        let mut out = Vec::new();
        viewer.draw(&mut out, 0, 2).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\u{1b}[7mthe"));
        assert!(text.contains("\u{1b}[1mfox"));
        assert!(text.contains("ran"));
    }

    #[tokio::test]
    async fn baseline_commit_flows_through_terminal_viewer() {
        let engine = engine_with("E = mc ^2\nnext line").await;
        let original = engine.page_layout(0).unwrap().lines[0].baseline.1;
        let mut viewer = TerminalViewer::new(Arc::clone(&engine));
        viewer.display_page(0);
        viewer.select_word(1);
        let mut controller =
            SessionController::new(Arc::clone(&engine), viewer, SessionConfig::default());

        controller.open_baseline_editor().unwrap();
        controller
            .apply(termocr_core::Intent::BaselineSlide { value: 28 })
            .unwrap();
        let superscript = controller
            .viewer()
            .rendered_words()
            .into_iter()
            .find(|w| w.superscript)
            .unwrap();
        assert_eq!(superscript.y_actual, superscript.top_baseline_orig);
        assert_eq!(superscript.top_baseline, superscript.top_baseline_orig + 3);

        controller
            .apply(termocr_core::Intent::BaselineRelease { value: 28 })
            .unwrap();
        assert_eq!(engine.page_layout(0).unwrap().lines[0].baseline.1, original + 3.0);
        assert_eq!(
            engine.page_layout(0).unwrap().lines[1].baseline.1,
            original + 20.0
        );
    }
}
