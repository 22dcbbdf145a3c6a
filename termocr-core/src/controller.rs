use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::baseline::BaselineEditor;
use crate::config::SessionConfig;
use crate::document::{EngineName, WordUpdate};
use crate::engine::{Engine, ImportSource, ImportSummary, InputKind, RecognizeRequest, Viewer};
use crate::error::{SessionError, SessionResult};
use crate::export::{replace_extension, DownloadRequest, ExportFormat, ExportRequest, PageRange};
use crate::progress::{ProgressBoard, ProgressSnapshot, TrackerKind};
use crate::search::{SearchAction, SearchIndex};
use crate::stage::{
    ProgressEnvelope, ProgressReporter, Refresh, RouteContext, StageEventRouter, StageKind,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    NextPage,
    PrevPage,
    GotoPage { page: usize },
    /// Raw 1-based page number typed by the user.
    GotoPageInput { raw: String },
    OpenFind,
    CloseFind,
    SubmitSearch { term: String, backwards: bool },
    NextMatch,
    PrevMatch,
    ToggleBaselineEditor,
    BaselineSlide { value: i32 },
    BaselineRelease { value: i32 },
    Deselected,
    UpdatePageRange { min: String, max: String },
    DownloadPanelHidden,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    pub edit: bool,
    pub layout: bool,
    pub download: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPrompt {
    /// The input has no text at all.
    OfferRecognition,
    /// The input already carries OCR that may be kept.
    OfferRecognitionOrKeepExisting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ProgressChanged {
        tracker: TrackerKind,
        progress: ProgressSnapshot,
    },
    PageDisplayed {
        page: usize,
        page_count: usize,
    },
    MatchLabelChanged {
        current: String,
        total: usize,
    },
    ControlsChanged(Controls),
    /// Slider position while the baseline editor is open, `None` once closed.
    BaselineControl(Option<i32>),
    ImportPrompt(ImportPrompt),
    FontsAdded(Vec<String>),
    DownloadNameChanged(String),
    PageRangeChanged {
        label: String,
    },
    StageFinished {
        stage: StageKind,
        success: bool,
    },
    Alert {
        level: AlertLevel,
        message: String,
    },
    Cleared,
}

/// Proof that a stage was started; hand it back when the engine call resolves.
#[derive(Debug)]
pub struct StageTicket {
    kind: StageKind,
    generation: u64,
    reporter: ProgressReporter,
}

impl StageTicket {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reporter(&self) -> ProgressReporter {
        self.reporter.clone()
    }
}

#[derive(Debug)]
pub enum ExportStart {
    Started {
        ticket: StageTicket,
        request: ExportRequest,
    },
    /// Queued until the running recognition completes.
    Deferred,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    kind: StageKind,
    generation: u64,
    hocr: bool,
}

struct Delivery<'a, V: Viewer> {
    viewer: &'a V,
    engine: &'a dyn Engine,
    active: TrackerKind,
}

impl<V: Viewer> RouteContext for Delivery<'_, V> {
    fn current_page(&self) -> usize {
        self.viewer.current_page()
    }

    fn active_tracker(&self) -> TrackerKind {
        self.active
    }

    fn displayed_engine(&self) -> Option<EngineName> {
        self.engine.displayed_engine()
    }

    fn has_page_result(&self, engine: &EngineName, page: usize) -> bool {
        self.engine.has_page_result(engine, page)
    }
}

pub struct SessionController<V: Viewer> {
    engine: Arc<dyn Engine>,
    viewer: V,
    config: SessionConfig,
    board: ProgressBoard,
    router: StageEventRouter,
    search: SearchIndex,
    search_mode: bool,
    baseline: BaselineEditor,
    progress_queue: Arc<Mutex<Vec<ProgressEnvelope>>>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
    in_flight: Option<InFlight>,
    deferred_export: Option<DownloadRequest>,
    controls: Controls,
    page_count: usize,
}

impl<V: Viewer> SessionController<V> {
    pub fn new(engine: Arc<dyn Engine>, viewer: V, config: SessionConfig) -> Self {
        let router = StageEventRouter::new(
            config.latest_alias.clone(),
            config.fallback_engines.clone(),
            config.overlay_warm_distance,
        );
        let baseline = BaselineEditor::new(config.baseline_range);
        Self {
            engine,
            viewer,
            config,
            board: ProgressBoard::new(),
            router,
            search: SearchIndex::new(),
            search_mode: false,
            baseline,
            progress_queue: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(Mutex::new(Vec::new())),
            in_flight: None,
            deferred_export: None,
            controls: Controls::default(),
            page_count: 0,
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn engine(&self) -> Arc<dyn Engine> {
        Arc::clone(&self.engine)
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn viewer_mut(&mut self) -> &mut V {
        &mut self.viewer
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn search(&self) -> &SearchIndex {
        &self.search
    }

    pub fn search_mode(&self) -> bool {
        self.search_mode
    }

    pub fn baseline(&self) -> &BaselineEditor {
        &self.baseline
    }

    pub fn progress(&self, tracker: TrackerKind) -> ProgressSnapshot {
        self.board.tracker(tracker).snapshot()
    }

    pub fn active_tracker(&self) -> TrackerKind {
        self.board.active()
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn stage_in_flight(&self) -> Option<StageKind> {
        self.in_flight.map(|stage| stage.kind)
    }

    pub fn apply(&mut self, intent: Intent) -> SessionResult<()> {
        match intent {
            Intent::NextPage => {
                let next = self.viewer.current_page() + 1;
                if next < self.page_count {
                    self.show_page(next);
                }
            }
            Intent::PrevPage => {
                let current = self.viewer.current_page();
                if current > 0 && self.page_count > 0 {
                    self.show_page(current - 1);
                }
            }
            Intent::GotoPage { page } => {
                if self.page_count > 0 {
                    self.show_page(page.min(self.page_count - 1));
                }
            }
            Intent::GotoPageInput { raw } => match raw.trim().parse::<i64>() {
                Ok(number) if self.page_count > 0 => {
                    let last = self.page_count as i64;
                    let page = number.clamp(1, last) - 1;
                    self.show_page(page as usize);
                }
                Ok(_) => {}
                Err(_) => warn!(input = %raw, "ignoring non-numeric page number"),
            },
            Intent::OpenFind => {
                self.search_mode = true;
                let term = self.search.term();
                if !term.is_empty() {
                    self.viewer.set_search_highlight(Some(term));
                }
            }
            Intent::CloseFind => {
                self.search_mode = false;
                self.viewer.set_search_highlight(None);
                self.viewer.redraw_text_layer();
            }
            Intent::SubmitSearch { term, backwards } => self.submit_search(&term, backwards),
            Intent::NextMatch => {
                if let Some(page) = self.search.find_next(self.viewer.current_page()) {
                    self.show_page(page);
                }
            }
            Intent::PrevMatch => {
                if let Some(page) = self.search.find_previous(self.viewer.current_page()) {
                    self.show_page(page);
                }
            }
            Intent::ToggleBaselineEditor => {
                if self.baseline.is_open() {
                    self.close_baseline_editor();
                } else {
                    self.open_baseline_editor()?;
                }
            }
            Intent::BaselineSlide { value } => {
                if let Some(updates) = self.baseline.preview(value) {
                    self.apply_updates(&updates);
                    self.viewer.redraw_text_layer();
                }
            }
            Intent::BaselineRelease { value } => self.commit_baseline(value),
            Intent::Deselected => {
                if self.baseline.is_open() {
                    self.close_baseline_editor();
                }
            }
            Intent::UpdatePageRange { min, max } => {
                let range = PageRange::from_inputs(&min, &max, self.page_count);
                self.publish(SessionEvent::PageRangeChanged {
                    label: range.label(),
                });
            }
            Intent::DownloadPanelHidden => {
                self.board.tracker_mut(TrackerKind::Download).hide();
                self.publish_progress(TrackerKind::Download);
            }
            Intent::Clear => self.clear(),
        }
        Ok(())
    }

    /// Opens the baseline editor on the current selection, closing any open session first.
    pub fn open_baseline_editor(&mut self) -> SessionResult<()> {
        let selected = self.viewer.selected_words();
        let rendered = self.viewer.rendered_words();
        match self.baseline.open(&selected, &rendered) {
            Ok(Some(opened)) => {
                if !opened.reverted.is_empty() {
                    self.apply_updates(&opened.reverted);
                    self.viewer.redraw_text_layer();
                }
                self.publish(SessionEvent::BaselineControl(Some(opened.slider_value)));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                if self.baseline.is_open() {
                    self.close_baseline_editor();
                }
                Err(err)
            }
        }
    }

    pub fn close_baseline_editor(&mut self) {
        let reverted = self.baseline.cancel();
        self.apply_updates(&reverted);
        self.viewer.redraw_text_layer();
        self.publish(SessionEvent::BaselineControl(None));
    }

    fn commit_baseline(&mut self, value: i32) {
        // The session may have been closed since the slider was grabbed.
        let Some(commit) = self.baseline.commit(value) else {
            debug!("baseline release without an open session");
            return;
        };
        self.apply_updates(&commit.updates);
        if let Err(err) = self
            .engine
            .apply_line_shift(commit.page, commit.line, commit.delta)
        {
            warn!(line = %commit.line, error = %err, "failed to shift line baseline");
            self.alert(AlertLevel::Error, format!("{:#}", err));
        }
        self.viewer.redraw_text_layer();
        self.publish(SessionEvent::BaselineControl(None));
    }

    fn submit_search(&mut self, term: &str, backwards: bool) {
        let current = self.viewer.current_page();
        let engine = Arc::clone(&self.engine);
        match self
            .search
            .submit(term, backwards, current, |term| engine.count_matches(term))
        {
            Ok(SearchAction::Indexed { total }) => {
                debug!(term = %self.search.term(), total, "search indexed");
                if self.search_mode {
                    self.viewer.set_search_highlight(Some(self.search.term()));
                }
                self.publish_match_label();
            }
            Ok(SearchAction::Navigate { target: Some(page) }) => self.show_page(page),
            Ok(SearchAction::Navigate { target: None }) => {}
            Err(SessionError::EmptyQuery) => {}
            Err(err) => warn!(error = %err, "search failed"),
        }
    }

    fn show_page(&mut self, page: usize) {
        if self.baseline.is_open() {
            self.baseline.cancel();
            self.publish(SessionEvent::BaselineControl(None));
        }
        self.viewer.display_page(page);
        if self.search_mode && !self.search.term().is_empty() {
            self.viewer.set_search_highlight(Some(self.search.term()));
        }
        self.publish(SessionEvent::PageDisplayed {
            page,
            page_count: self.page_count,
        });
        self.publish_match_label();
    }

    fn apply_updates(&mut self, updates: &[WordUpdate]) {
        for update in updates {
            self.viewer.update_word(update);
        }
    }

    /// Routes every queued progress event; returns how many were attributed.
    pub fn pump_progress(&mut self) -> usize {
        let envelopes = std::mem::take(&mut *self.progress_queue.lock());
        let mut routed = 0;
        for envelope in envelopes {
            if self.deliver(envelope) {
                routed += 1;
            }
        }
        routed
    }

    fn deliver(&mut self, envelope: ProgressEnvelope) -> bool {
        if !self.board.is_current(envelope.generation) {
            debug!(
                generation = envelope.generation,
                current = self.board.generation(),
                event = ?envelope.event,
                "dropping progress from a superseded stage"
            );
            return false;
        }
        let routing = {
            let ctx = Delivery {
                viewer: &self.viewer,
                engine: self.engine.as_ref(),
                active: self.board.active(),
            };
            self.router.route(&envelope.event, &ctx)
        };
        if routing.increment {
            self.board.active_tracker_mut().increment();
            self.publish_progress(self.board.active());
        }
        match routing.refresh {
            Some(Refresh::Redisplay(page)) => self.show_page(page),
            Some(Refresh::OverlayOnly(page)) => self.viewer.render_overlay(page),
            None => {}
        }
        true
    }

    fn begin_stage(&mut self, kind: StageKind, total: usize, hocr: bool) -> SessionResult<StageTicket> {
        if let Some(running) = self.in_flight {
            return Err(SessionError::StageInFlight {
                running: running.kind,
            });
        }
        let generation = self.board.activate(kind.tracker(), total);
        self.in_flight = Some(InFlight {
            kind,
            generation,
            hocr,
        });
        info!(stage = %kind, generation, total, "stage started");
        self.publish_progress(kind.tracker());
        Ok(StageTicket {
            kind,
            generation,
            reporter: ProgressReporter::new(generation, Arc::clone(&self.progress_queue)),
        })
    }

    /// Routes the stage's remaining events and releases the in-flight slot.
    fn end_stage(&mut self, ticket: &StageTicket) -> Option<InFlight> {
        match self.in_flight {
            Some(running) if running.generation == ticket.generation => {
                self.pump_progress();
                self.in_flight = None;
                Some(running)
            }
            _ => {
                debug!(stage = %ticket.kind, generation = ticket.generation, "ignoring completion of a superseded stage");
                None
            }
        }
    }

    fn fail_stage(&mut self, kind: StageKind, err: &anyhow::Error) {
        error!(stage = %kind, error = %err, "stage failed");
        self.board.tracker_mut(kind.tracker()).hide();
        self.publish_progress(kind.tracker());
        self.alert(AlertLevel::Error, format!("{} failed: {:#}", kind, err));
        self.publish(SessionEvent::StageFinished {
            stage: kind,
            success: false,
        });
    }

    pub fn begin_import(&mut self, sources: &[ImportSource]) -> SessionResult<StageTicket> {
        let hocr = sources.iter().any(ImportSource::is_hocr);
        self.begin_stage(StageKind::Import, sources.len(), hocr)
    }

    pub fn complete_import(&mut self, ticket: StageTicket, result: Result<ImportSummary>) {
        let Some(stage) = self.end_stage(&ticket) else {
            return;
        };
        let summary = match result {
            Ok(summary) => summary,
            Err(err) => {
                self.fail_stage(StageKind::Import, &err);
                return;
            }
        };

        self.page_count = summary.page_count;
        self.reindex_search();
        if self.page_count > 0 {
            let page = self.viewer.current_page().min(self.page_count - 1);
            self.show_page(page);
        }
        if !summary.fonts.is_empty() {
            self.publish(SessionEvent::FontsAdded(summary.fonts.clone()));
        }
        for warning in &summary.warnings {
            self.alert(AlertLevel::Warning, warning.clone());
        }
        if !stage.hocr {
            match summary.kind {
                InputKind::Images | InputKind::PdfImage => {
                    self.publish(SessionEvent::ImportPrompt(ImportPrompt::OfferRecognition))
                }
                InputKind::PdfOcr => self.publish(SessionEvent::ImportPrompt(
                    ImportPrompt::OfferRecognitionOrKeepExisting,
                )),
                InputKind::PdfText | InputKind::OcrData => {}
            }
        }
        self.publish(SessionEvent::DownloadNameChanged(replace_extension(
            &summary.default_download_name,
            ExportFormat::Xlsx.extension(),
        )));
        self.controls.download = true;
        if summary.kind == InputKind::OcrData {
            self.controls.edit = true;
            self.controls.layout = true;
        }
        self.publish(SessionEvent::ControlsChanged(self.controls));

        self.board.tracker_mut(TrackerKind::Import).fill();
        self.publish_progress(TrackerKind::Import);
        info!(pages = summary.page_count, kind = ?summary.kind, "import finished");
        self.publish(SessionEvent::StageFinished {
            stage: StageKind::Import,
            success: true,
        });
    }

    pub fn begin_recognition(
        &mut self,
        discard_active: bool,
    ) -> SessionResult<(StageTicket, RecognizeRequest)> {
        if self.page_count == 0 {
            return Err(SessionError::NoDocument);
        }
        let recognition = &self.config.recognition;
        let request = RecognizeRequest {
            mode: recognition.mode,
            langs: recognition.langs.clone(),
            discard_active,
        };
        let total = request.mode.progress_total(self.page_count);
        let ticket = self.begin_stage(StageKind::Recognize, total, false)?;
        Ok((ticket, request))
    }

    /// Finishes recognition and starts an export that was waiting on it.
    pub fn complete_recognition(
        &mut self,
        ticket: StageTicket,
        result: Result<()>,
    ) -> Option<(StageTicket, ExportRequest)> {
        self.end_stage(&ticket)?;
        match result {
            Ok(()) => {
                let page = self.viewer.current_page();
                self.show_page(page);
                self.board.tracker_mut(TrackerKind::Import).increment();
                self.publish_progress(TrackerKind::Import);
                self.controls.edit = true;
                self.controls.layout = true;
                self.publish(SessionEvent::ControlsChanged(self.controls));
                self.publish(SessionEvent::StageFinished {
                    stage: StageKind::Recognize,
                    success: true,
                });
            }
            Err(err) => {
                self.fail_stage(StageKind::Recognize, &err);
                if self.deferred_export.take().is_some() {
                    info!("deferred export dropped after failed recognition");
                    self.restore_download();
                }
                return None;
            }
        }

        let request = self.deferred_export.take()?;
        match self.start_export(request) {
            Ok(started) => Some(started),
            Err(err) => {
                warn!(error = %err, "deferred export could not start");
                self.restore_download();
                None
            }
        }
    }

    pub fn request_export(&mut self, request: DownloadRequest) -> SessionResult<ExportStart> {
        if self.page_count == 0 {
            return Err(SessionError::NoDocument);
        }
        if !self.engine.export_formats().contains(&request.format) {
            return Err(SessionError::InvalidArgument {
                what: "export format",
                value: request.format.to_string(),
            });
        }
        if self.stage_in_flight() == Some(StageKind::Recognize) {
            info!("export waits for running recognition");
            self.deferred_export = Some(request);
            self.controls.download = false;
            self.publish(SessionEvent::ControlsChanged(self.controls));
            return Ok(ExportStart::Deferred);
        }
        let (ticket, request) = self.start_export(request)?;
        Ok(ExportStart::Started { ticket, request })
    }

    fn start_export(&mut self, request: DownloadRequest) -> SessionResult<(StageTicket, ExportRequest)> {
        let range = PageRange::from_inputs(&request.min_page, &request.max_page, self.page_count);
        self.publish(SessionEvent::PageRangeChanged {
            label: range.label(),
        });
        let total = request.format.progress_total(range.len());
        let ticket = self.begin_stage(StageKind::Export, total, false)?;
        self.controls.download = false;
        self.publish(SessionEvent::ControlsChanged(self.controls));
        let (first_page, last_page) = range.indices();
        let export = ExportRequest {
            format: request.format,
            file_name: replace_extension(&request.file_name, request.format.extension()),
            first_page,
            last_page,
        };
        Ok((ticket, export))
    }

    pub fn complete_export(&mut self, ticket: StageTicket, result: Result<()>) {
        if self.end_stage(&ticket).is_none() {
            return;
        }
        match result {
            Ok(()) => {
                self.board.tracker_mut(TrackerKind::Download).fill();
                self.publish_progress(TrackerKind::Download);
                self.publish(SessionEvent::StageFinished {
                    stage: StageKind::Export,
                    success: true,
                });
            }
            Err(err) => self.fail_stage(StageKind::Export, &err),
        }
        self.restore_download();
    }

    #[instrument(skip(self, sources), fields(files = sources.len()))]
    pub async fn import(&mut self, sources: Vec<ImportSource>) -> SessionResult<()> {
        let ticket = self.begin_import(&sources)?;
        let engine = Arc::clone(&self.engine);
        let result = engine.import(sources, ticket.reporter()).await;
        self.complete_import(ticket, result);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn recognize_all(&mut self, discard_active: bool) -> SessionResult<()> {
        let (ticket, request) = self.begin_recognition(discard_active)?;
        let engine = Arc::clone(&self.engine);
        let result = engine.recognize(request, ticket.reporter()).await;
        self.complete_recognition(ticket, result);
        Ok(())
    }

    #[instrument(skip(self, request), fields(format = %request.format))]
    pub async fn download(&mut self, request: DownloadRequest) -> SessionResult<()> {
        if let ExportStart::Started { ticket, request } = self.request_export(request)? {
            let engine = Arc::clone(&self.engine);
            let result = engine.export(request, ticket.reporter()).await;
            self.complete_export(ticket, result);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.engine.clear();
        self.board.retire();
        self.progress_queue.lock().clear();
        self.in_flight = None;
        self.deferred_export = None;
        if self.baseline.is_open() {
            self.baseline.cancel();
            self.publish(SessionEvent::BaselineControl(None));
        }
        self.viewer.clear();
        self.search.clear();
        self.page_count = 0;
        self.controls = Controls::default();
        self.publish(SessionEvent::ControlsChanged(self.controls));
        self.publish(SessionEvent::Cleared);
        info!("session cleared");
    }

    fn reindex_search(&mut self) {
        let term = self.search.term().to_string();
        self.search.reset(self.page_count);
        if !term.is_empty() {
            let engine = Arc::clone(&self.engine);
            if let Err(err) = self.search.search(&term, |term| engine.count_matches(term)) {
                debug!(error = %err, "search not re-run");
            }
        }
    }

    fn restore_download(&mut self) {
        self.controls.download = self.page_count > 0;
        self.publish(SessionEvent::ControlsChanged(self.controls));
    }

    fn publish(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }

    fn publish_progress(&self, tracker: TrackerKind) {
        self.publish(SessionEvent::ProgressChanged {
            tracker,
            progress: self.board.tracker(tracker).snapshot(),
        });
    }

    fn publish_match_label(&self) {
        let current = self.search.match_label(self.viewer.current_page());
        self.publish(SessionEvent::MatchLabelChanged {
            current,
            total: self.search.total(),
        });
    }

    fn alert(&self, level: AlertLevel, message: String) {
        self.publish(SessionEvent::Alert { level, message });
    }
}
