use std::path::PathBuf;

use anyhow::Result;

use crate::config::RecognitionMode;
use crate::document::{EngineName, LineId, PageLayout, RenderedWord, WordUpdate};
use crate::export::{ExportFormat, ExportRequest};
use crate::stage::ProgressReporter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSource {
    pub name: String,
    pub path: PathBuf,
}

impl ImportSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { name, path }
    }

    pub fn is_hocr(&self) -> bool {
        self.name.to_ascii_lowercase().ends_with(".hocr")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Images,
    /// PDF with a native text layer.
    PdfText,
    /// Scanned PDF without any text.
    PdfImage,
    /// PDF carrying a previous OCR layer.
    PdfOcr,
    /// OCR data such as hOCR or plain text.
    OcrData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub page_count: usize,
    pub kind: InputKind,
    pub default_download_name: String,
    pub fonts: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizeRequest {
    pub mode: RecognitionMode,
    pub langs: Vec<String>,
    /// Drop the displayed OCR before recognizing.
    pub discard_active: bool,
}

/// The document and recognition engine.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    fn page_count(&self) -> usize;
    fn page_layout(&self, page: usize) -> Option<PageLayout>;
    /// Per-page match counts for `term`, one entry per page.
    fn count_matches(&self, term: &str) -> Vec<usize>;
    /// The named result set the active OCR currently points at.
    fn displayed_engine(&self) -> Option<EngineName>;
    fn has_page_result(&self, engine: &EngineName, page: usize) -> bool;
    /// Formats `export` can write.
    fn export_formats(&self) -> Vec<ExportFormat> {
        ExportFormat::ALL.to_vec()
    }
    fn apply_line_shift(&self, page: usize, line: LineId, delta: i32) -> Result<()>;
    fn clear(&self);

    async fn import(
        &self,
        sources: Vec<ImportSource>,
        progress: ProgressReporter,
    ) -> Result<ImportSummary>;
    async fn recognize(&self, request: RecognizeRequest, progress: ProgressReporter) -> Result<()>;
    async fn export(&self, request: ExportRequest, progress: ProgressReporter) -> Result<()>;
}

/// The page surface that draws words and owns the selection.
pub trait Viewer {
    fn current_page(&self) -> usize;
    /// Full redisplay; also makes `page` current.
    fn display_page(&mut self, page: usize);
    /// Re-renders only the text overlay of `page`.
    fn render_overlay(&mut self, page: usize);
    fn redraw_text_layer(&mut self);
    fn selected_words(&self) -> Vec<RenderedWord>;
    fn rendered_words(&self) -> Vec<RenderedWord>;
    fn update_word(&mut self, update: &WordUpdate);
    fn set_search_highlight(&mut self, term: Option<&str>);
    fn clear(&mut self);
}
