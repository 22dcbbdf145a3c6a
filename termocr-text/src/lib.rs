//! Plain-text document engine: every input file is already recognized text.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use termocr_core::{
    Engine, EngineName, ExportFormat, ExportRequest, FontStyle, ImportSource, ImportSummary,
    InputKind, LineId, OcrLine, OcrWord, PageLayout, ProgressReporter, RecognizeRequest,
    StageEvent, WordId,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Result set holding the text read from the input files.
pub const TEXT_LAYER: &str = "Text Layer";

const PAGE_BREAK: char = '\u{0c}';
const MARGIN: u32 = 40;
const LINE_HEIGHT: u32 = 20;
const CHAR_WIDTH: u32 = 8;
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp"];

static DOCUMENT_NAMESPACE: Lazy<Uuid> =
    Lazy::new(|| Uuid::new_v5(&Uuid::NAMESPACE_URL, b"https://termocr.net/documents"));

pub fn document_id_for_sources(sources: &[ImportSource]) -> Uuid {
    let joined = sources
        .iter()
        .map(|source| source.path.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    Uuid::new_v5(&DOCUMENT_NAMESPACE, joined.as_bytes())
}

#[derive(Debug, Default)]
struct TextDocument {
    id: Option<Uuid>,
    pages: Vec<PageLayout>,
    next_line: u64,
}

impl TextDocument {
    /// Lays `text` out as one page; returns its index.
    fn push_page(&mut self, text: &str) -> usize {
        let page_index = self.pages.len();
        let mut lines = Vec::new();
        let mut widest = 0;
        let mut rows = 0;
        for (row, raw) in text.lines().enumerate() {
            rows = row as u32 + 1;
            widest = widest.max(raw.chars().count() as u32);
            let tokens: Vec<&str> = raw.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            self.next_line += 1;
            let line = LineId(self.next_line);
            let words = tokens
                .into_iter()
                .enumerate()
                .map(|(n, token)| parse_word(token, page_index, row, n, line))
                .collect();
            lines.push(OcrLine {
                id: line,
                baseline: (MARGIN as f32, (MARGIN + rows * LINE_HEIGHT) as f32),
                words,
            });
        }
        self.pages.push(PageLayout {
            page_index,
            width: MARGIN * 2 + widest * CHAR_WIDTH,
            height: MARGIN * 2 + rows * LINE_HEIGHT,
            lines,
        });
        page_index
    }
}

/// A leading `^` marks a superscript token.
fn parse_word(token: &str, page: usize, row: usize, n: usize, line: LineId) -> OcrWord {
    let (text, superscript) = match token.strip_prefix('^') {
        Some(rest) if !rest.is_empty() => (rest, true),
        _ => (token, false),
    };
    OcrWord {
        id: WordId::new(format!("word_{}_{}_{}", page + 1, row + 1, n + 1)),
        text: text.to_string(),
        line,
        superscript,
        small_caps: false,
        style: FontStyle::Normal,
    }
}

/// Splits on form feeds; a trailing blank segment is not a page.
fn split_pages(text: &str) -> Vec<&str> {
    let mut pages: Vec<&str> = text.split(PAGE_BREAK).collect();
    if pages.len() > 1 && pages.last().is_some_and(|page| page.trim().is_empty()) {
        pages.pop();
    }
    pages
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn line_text(line: &OcrLine) -> String {
    line.words
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn page_text(layout: &PageLayout) -> String {
    layout
        .lines
        .iter()
        .map(line_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn hocr_page(layout: &PageLayout, out: &mut String) {
    let page = layout.page_index + 1;
    out.push_str(&format!(
        "  <div class='ocr_page' id='page_{}' title='bbox 0 0 {} {}'>\n",
        page, layout.width, layout.height
    ));
    for line in &layout.lines {
        let y1 = line.baseline.1.max(0.0) as u32;
        let y0 = y1.saturating_sub(LINE_HEIGHT - 4);
        let x0 = line.baseline.0.max(0.0) as u32;
        let width = line_text(line).chars().count() as u32 * CHAR_WIDTH;
        out.push_str(&format!(
            "   <span class='ocr_line' id='line_{}_{}' title='bbox {} {} {} {}'>",
            page,
            line.id.0,
            x0,
            y0,
            x0 + width,
            y1
        ));
        let mut x = x0;
        for word in &line.words {
            let w = word.text.chars().count() as u32 * CHAR_WIDTH;
            let text = if word.superscript {
                format!("<sup>{}</sup>", escape(&word.text))
            } else {
                escape(&word.text)
            };
            out.push_str(&format!(
                "<span class='ocrx_word' id='{}' title='bbox {} {} {} {}'>{}</span> ",
                word.id,
                x,
                y0,
                x + w,
                y1,
                text
            ));
            x += w + CHAR_WIDTH;
        }
        out.push_str("</span>\n");
    }
    out.push_str("  </div>\n");
}

/// Serves text files as pre-recognized pages.
#[derive(Debug, Default)]
pub struct TextEngine {
    document: Mutex<TextDocument>,
}

impl TextEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_id(&self) -> Option<Uuid> {
        self.document.lock().id
    }

    pub fn page_text(&self, page: usize) -> Option<String> {
        self.document.lock().pages.get(page).map(page_text)
    }

    fn render(&self, request: &ExportRequest, progress: &ProgressReporter) -> Result<String> {
        let document = self.document.lock();
        let pages = document
            .pages
            .get(request.first_page..=request.last_page)
            .ok_or_else(|| {
                anyhow!(
                    "pages {}-{} are out of range",
                    request.first_page + 1,
                    request.last_page + 1
                )
            })?;
        let mut out = String::new();
        match request.format {
            ExportFormat::Text => {
                for layout in pages {
                    out.push_str(&page_text(layout));
                    out.push('\n');
                    if layout.page_index < request.last_page {
                        out.push(PAGE_BREAK);
                    }
                    progress.report(StageEvent::Export);
                }
            }
            ExportFormat::Hocr => {
                out.push_str("<?xml version='1.0' encoding='UTF-8'?>\n");
                out.push_str("<html xmlns='http://www.w3.org/1999/xhtml'>\n <head>\n");
                out.push_str("  <meta name='ocr-system' content='termocr'/>\n");
                out.push_str("  <meta name='ocr-capabilities' content='ocr_page ocr_line ocrx_word'/>\n");
                out.push_str(" </head>\n <body>\n");
                for layout in pages {
                    hocr_page(layout, &mut out);
                    progress.report(StageEvent::Export);
                }
                out.push_str(" </body>\n</html>\n");
            }
            other => bail!("{} export is not supported for text documents", other),
        }
        Ok(out)
    }
}

#[async_trait]
impl Engine for TextEngine {
    fn page_count(&self) -> usize {
        self.document.lock().pages.len()
    }

    fn page_layout(&self, page: usize) -> Option<PageLayout> {
        self.document.lock().pages.get(page).cloned()
    }

    fn count_matches(&self, term: &str) -> Vec<usize> {
        let needle = term.to_lowercase();
        self.document
            .lock()
            .pages
            .iter()
            .map(|layout| {
                if needle.is_empty() {
                    0
                } else {
                    page_text(layout).to_lowercase().matches(&needle).count()
                }
            })
            .collect()
    }

    fn displayed_engine(&self) -> Option<EngineName> {
        if self.page_count() == 0 {
            None
        } else {
            Some(EngineName::from(TEXT_LAYER))
        }
    }

    fn has_page_result(&self, engine: &EngineName, page: usize) -> bool {
        engine.as_str() == TEXT_LAYER && page < self.page_count()
    }

    fn export_formats(&self) -> Vec<ExportFormat> {
        vec![ExportFormat::Text, ExportFormat::Hocr]
    }

    fn apply_line_shift(&self, page: usize, line: LineId, delta: i32) -> Result<()> {
        let mut document = self.document.lock();
        let layout = document
            .pages
            .get_mut(page)
            .with_context(|| format!("page {} out of range", page + 1))?;
        let geometry = layout
            .line_mut(line)
            .ok_or_else(|| anyhow!("{} not found on page {}", line, page + 1))?;
        geometry.baseline.1 += delta as f32;
        debug!(page, %line, delta, "line baseline shifted");
        Ok(())
    }

    fn clear(&self) {
        *self.document.lock() = TextDocument::default();
    }

    #[instrument(skip(self, sources, progress), fields(files = sources.len()))]
    async fn import(
        &self,
        sources: Vec<ImportSource>,
        progress: ProgressReporter,
    ) -> Result<ImportSummary> {
        // Nothing is stored until every source has parsed.
        let mut parsed = TextDocument {
            id: Some(document_id_for_sources(&sources)),
            pages: Vec::new(),
            next_line: self.document.lock().next_line,
        };
        let mut warnings = Vec::new();
        for source in &sources {
            if is_image(&source.path) {
                bail!("{} is an image; only text input can be imported", source.name);
            }
            let text = tokio::fs::read_to_string(&source.path)
                .await
                .with_context(|| format!("failed to read {:?}", source.path))?;
            let mut words = 0;
            for chunk in split_pages(&text) {
                let page = parsed.push_page(chunk);
                words += parsed.pages[page].word_count();
            }
            if words == 0 {
                warn!(file = %source.name, "imported file contains no text");
                warnings.push(format!("{} contains no text", source.name));
            }
        }

        let page_count = parsed.pages.len();
        *self.document.lock() = parsed;
        for page in 0..page_count {
            progress.report(StageEvent::ImportImage { page });
            tokio::task::yield_now().await;
        }
        info!(pages = page_count, "text import finished");
        Ok(ImportSummary {
            page_count,
            kind: InputKind::OcrData,
            default_download_name: sources
                .first()
                .map(|source| source.name.clone())
                .unwrap_or_default(),
            fonts: Vec::new(),
            warnings,
        })
    }

    async fn recognize(&self, request: RecognizeRequest, _progress: ProgressReporter) -> Result<()> {
        bail!(
            "no recognition backend is available for {} ({:?} mode)",
            request.langs.join("+"),
            request.mode
        )
    }

    #[instrument(skip(self, progress), fields(format = %request.format))]
    async fn export(&self, request: ExportRequest, progress: ProgressReporter) -> Result<()> {
        let contents = self.render(&request, &progress)?;
        tokio::fs::write(&request.file_name, contents)
            .await
            .with_context(|| format!("failed to write {:?}", request.file_name))?;
        info!(file = %request.file_name, "export written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use termocr_core::{ProgressEnvelope, RecognitionMode};
    use tempfile::tempdir;

    fn collector() -> (ProgressReporter, Arc<Mutex<Vec<ProgressEnvelope>>>) {
        let queue = Arc::new(Mutex::new(Vec::new()));
        (ProgressReporter::collecting(Arc::clone(&queue)), queue)
    }

    async fn imported(contents: &str) -> (tempfile::TempDir, TextEngine) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.txt");
        fs::write(&path, contents).unwrap();
        let engine = TextEngine::new();
        engine
            .import(vec![ImportSource::from_path(&path)], ProgressReporter::detached())
            .await
            .unwrap();
        (dir, engine)
    }

    #[tokio::test]
    async fn form_feeds_separate_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.txt");
        fs::write(&path, "The quick fox\n\njumps high\x0cover the dog\x0c\n").unwrap();
        let engine = TextEngine::new();
        let (reporter, queue) = collector();

        let summary = engine
            .import(vec![ImportSource::from_path(&path)], reporter)
            .await
            .unwrap();

        assert_eq!(summary.page_count, 2);
        assert_eq!(summary.kind, InputKind::OcrData);
        assert_eq!(summary.default_download_name, "book.txt");
        assert!(summary.warnings.is_empty());
        let events: Vec<StageEvent> = queue.lock().iter().map(|e| e.event.clone()).collect();
        assert_eq!(
            events,
            vec![
                StageEvent::ImportImage { page: 0 },
                StageEvent::ImportImage { page: 1 }
            ]
        );

        let first = engine.page_layout(0).unwrap();
        assert_eq!(first.lines.len(), 2);
        assert_eq!(first.word_count(), 5);
        assert_eq!(first.lines[1].baseline.1, (MARGIN + 3 * LINE_HEIGHT) as f32);
        assert_ne!(first.lines[0].id, first.lines[1].id);
        assert_eq!(engine.page_text(1).unwrap(), "over the dog");
        assert!(engine.document_id().is_some());
    }

    #[tokio::test]
    async fn caret_tokens_become_superscripts() {
        let (_dir, engine) = imported("E = mc ^2").await;
        let layout = engine.page_layout(0).unwrap();
        let last = layout.lines[0].words.last().unwrap();
        assert!(last.superscript);
        assert_eq!(last.text, "2");
    }

    #[tokio::test]
    async fn empty_files_warn() {
        let dir = tempdir().unwrap();
        let blank = dir.path().join("blank.txt");
        let filled = dir.path().join("filled.txt");
        fs::write(&blank, "   \n").unwrap();
        fs::write(&filled, "words").unwrap();
        let engine = TextEngine::new();
        let summary = engine
            .import(
                vec![ImportSource::from_path(&blank), ImportSource::from_path(&filled)],
                ProgressReporter::detached(),
            )
            .await
            .unwrap();
        assert_eq!(summary.warnings, vec!["blank.txt contains no text".to_string()]);
        assert_eq!(summary.page_count, 2);
    }

    #[tokio::test]
    async fn failed_import_keeps_nothing_and_next_import_replaces() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("a.txt");
        let picture = dir.path().join("b.png");
        let next = dir.path().join("c.txt");
        fs::write(&good, "one\x0ctwo").unwrap();
        fs::write(&picture, "not text").unwrap();
        fs::write(&next, "three").unwrap();
        let engine = TextEngine::new();
        let (reporter, queue) = collector();

        let err = engine
            .import(
                vec![ImportSource::from_path(&good), ImportSource::from_path(&picture)],
                reporter,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("b.png"));
        assert_eq!(engine.page_count(), 0);
        assert!(queue.lock().is_empty());

        let summary = engine
            .import(vec![ImportSource::from_path(&next)], ProgressReporter::detached())
            .await
            .unwrap();
        assert_eq!(summary.page_count, 1);
        assert_eq!(engine.page_count(), 1);
        assert_eq!(engine.page_text(0).unwrap(), "three");
        assert_eq!(engine.count_matches("three"), vec![1]);
    }

    #[tokio::test]
    async fn reimport_replaces_the_document() {
        let (dir, engine) = imported("old\x0cpages\x0chere").await;
        let first_id = engine.document_id();
        let path = dir.path().join("new.txt");
        fs::write(&path, "fresh").unwrap();
        engine
            .import(vec![ImportSource::from_path(&path)], ProgressReporter::detached())
            .await
            .unwrap();
        assert_eq!(engine.page_count(), 1);
        assert_eq!(engine.page_text(0).unwrap(), "fresh");
        assert_ne!(engine.document_id(), first_id);
    }

    #[tokio::test]
    async fn images_are_rejected() {
        let engine = TextEngine::new();
        let err = engine
            .import(
                vec![ImportSource::from_path("/scans/page1.PNG")],
                ProgressReporter::detached(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("page1.PNG"));
        assert_eq!(engine.page_count(), 0);
    }

    #[tokio::test]
    async fn matches_are_counted_per_page_ignoring_case() {
        let (_dir, engine) = imported("Fox fox\x0cno match\x0cthe FOX").await;
        assert_eq!(engine.count_matches("fox"), vec![2, 0, 1]);
        assert_eq!(engine.count_matches(""), vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn line_shift_moves_only_the_target_line() {
        let (_dir, engine) = imported("one two\nthree").await;
        let layout = engine.page_layout(0).unwrap();
        let (first, second) = (layout.lines[0].clone(), layout.lines[1].clone());

        engine.apply_line_shift(0, first.id, 5).unwrap();
        let layout = engine.page_layout(0).unwrap();
        assert_eq!(layout.lines[0].baseline.1, first.baseline.1 + 5.0);
        assert_eq!(layout.lines[1].baseline.1, second.baseline.1);

        assert!(engine.apply_line_shift(0, LineId(999), 1).is_err());
        assert!(engine.apply_line_shift(4, first.id, 1).is_err());
    }

    #[tokio::test]
    async fn text_layer_is_the_displayed_result() {
        let engine = TextEngine::new();
        assert_eq!(engine.displayed_engine(), None);
        let (_dir, engine) = imported("a\x0cb").await;
        let layer = EngineName::from(TEXT_LAYER);
        assert_eq!(engine.displayed_engine(), Some(layer.clone()));
        assert!(engine.has_page_result(&layer, 1));
        assert!(!engine.has_page_result(&layer, 2));
        assert!(!engine.has_page_result(&EngineName::from("Tesseract LSTM"), 0));
    }

    #[tokio::test]
    async fn recognition_is_unavailable() {
        let (_dir, engine) = imported("a").await;
        let request = RecognizeRequest {
            mode: RecognitionMode::Speed,
            langs: vec!["eng".to_string()],
            discard_active: false,
        };
        assert!(engine
            .recognize(request, ProgressReporter::detached())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn text_export_writes_selected_pages() {
        let (dir, engine) = imported("alpha\x0cbeta\x0cgamma").await;
        let out = dir.path().join("out.txt");
        let (reporter, queue) = collector();
        let request = ExportRequest {
            format: ExportFormat::Text,
            file_name: out.to_string_lossy().into_owned(),
            first_page: 1,
            last_page: 2,
        };
        engine.export(request, reporter).await.unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "beta\n\x0cgamma\n");
        assert_eq!(queue.lock().len(), 2);
        assert!(queue.lock().iter().all(|e| e.event == StageEvent::Export));
    }

    #[tokio::test]
    async fn hocr_export_reflects_shifted_baselines() {
        let (dir, engine) = imported("x <y> ^2").await;
        let line = engine.page_layout(0).unwrap().lines[0].id;
        engine.apply_line_shift(0, line, 5).unwrap();
        let out = dir.path().join("out.hocr");
        let request = ExportRequest {
            format: ExportFormat::Hocr,
            file_name: out.to_string_lossy().into_owned(),
            first_page: 0,
            last_page: 0,
        };
        engine
            .export(request, ProgressReporter::detached())
            .await
            .unwrap();

        let hocr = fs::read_to_string(&out).unwrap();
        let y1 = MARGIN + LINE_HEIGHT + 5;
        assert!(hocr.contains(&format!("title='bbox 40 {} ", y1 - (LINE_HEIGHT - 4))));
        assert!(hocr.contains("&lt;y&gt;"));
        assert!(hocr.contains("<sup>2</sup>"));
        assert!(hocr.contains("id='word_1_1_1'"));
    }

    #[tokio::test]
    async fn unsupported_formats_and_ranges_fail() {
        let (dir, engine) = imported("a").await;
        let file_name = dir.path().join("out.pdf").to_string_lossy().into_owned();
        let pdf = ExportRequest {
            format: ExportFormat::Pdf,
            file_name: file_name.clone(),
            first_page: 0,
            last_page: 0,
        };
        assert!(engine
            .export(pdf, ProgressReporter::detached())
            .await
            .is_err());
        let beyond = ExportRequest {
            format: ExportFormat::Text,
            file_name,
            first_page: 0,
            last_page: 3,
        };
        assert!(engine
            .export(beyond, ProgressReporter::detached())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn clear_forgets_the_document() {
        let (_dir, engine) = imported("a\x0cb").await;
        engine.clear();
        assert_eq!(engine.page_count(), 0);
        assert_eq!(engine.document_id(), None);
    }
}
