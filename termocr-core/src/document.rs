use std::fmt;

use serde::{Deserialize, Serialize};

pub const TESSERACT_LATEST: &str = "Tesseract Latest";
pub const TESSERACT_LSTM: &str = "Tesseract LSTM";
pub const TESSERACT_LEGACY: &str = "Tesseract Legacy";

/// Name of one recognition result set held by the engine, e.g. `"Tesseract Legacy"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineName(String);

impl EngineName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EngineName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WordId(String);

impl WordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable line identifier assigned at layout-analysis time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(pub u64);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
    Bold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub id: WordId,
    pub text: String,
    pub line: LineId,
    pub superscript: bool,
    pub small_caps: bool,
    pub style: FontStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrLine {
    pub id: LineId,
    /// `(x, y)` baseline geometry shared by every word of the line.
    pub baseline: (f32, f32),
    pub words: Vec<OcrWord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    pub lines: Vec<OcrLine>,
}

impl PageLayout {
    pub fn line(&self, id: LineId) -> Option<&OcrLine> {
        self.lines.iter().find(|line| line.id == id)
    }

    pub fn line_mut(&mut self, id: LineId) -> Option<&mut OcrLine> {
        self.lines.iter_mut().find(|line| line.id == id)
    }

    pub fn word_count(&self) -> usize {
        self.lines.iter().map(|line| line.words.len()).sum()
    }
}

/// A word object as currently drawn by the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedWord {
    pub id: WordId,
    pub page: usize,
    pub line: LineId,
    pub superscript: bool,
    /// Baseline offset at the time the page was drawn.
    pub top_baseline_orig: i32,
    /// Tracked baseline offset, updated during previews even for superscripts.
    pub top_baseline: i32,
    /// Vertical position actually drawn.
    pub y_actual: i32,
    /// Committed adjustment relative to `top_baseline_orig`.
    pub baseline_adj: i32,
}

impl RenderedWord {
    pub fn committed_baseline(&self) -> i32 {
        self.top_baseline_orig + self.baseline_adj
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordUpdate {
    pub id: WordId,
    pub top_baseline: i32,
    /// `None` leaves the drawn position untouched.
    pub y_actual: Option<i32>,
    /// `None` leaves the committed adjustment untouched.
    pub baseline_adj: Option<i32>,
}
