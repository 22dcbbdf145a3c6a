use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use termocr_core::{
    AlertLevel, DownloadRequest, Engine, ExportFormat, ExportRequest, ExportStart, ImportPrompt,
    ImportSource, ImportSummary, Intent, SessionConfig, SessionController, SessionError,
    SessionEvent, StageTicket, TrackerKind,
};
use termocr_text::TextEngine;
use termocr_tty::{write_status_line, EventMapper, InputMode, StatusLine, TerminalViewer, UiEvent};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "termocr", version, about = "terminal viewer and editor for OCR text")]
struct Args {
    /// Page to open on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<String>,

    /// Config file, defaults to config.toml in the platform config directory
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Export format (pdf, hocr, docx, xlsx, txt)
    #[arg(short = 'f', long = "format")]
    format: Option<ExportFormat>,

    /// Pages to export, e.g. `2-5` or `3`
    #[arg(long = "pages")]
    pages: Option<String>,

    /// Write an export to this file and exit without opening the viewer
    #[arg(short = 'o', long = "export")]
    export: Option<PathBuf>,

    /// Text or hOCR files to import, one or more pages each
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.files.is_empty() {
        return Err(anyhow!("no input files provided"));
    }

    let project_dirs = ProjectDirs::from("net", "termocr", "termocr")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs, args.export.is_some())?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = SessionConfig::load(&config_path)?;
    info!(config = %config_path.display(), "configuration loaded");

    let range = args.pages.as_deref().map(split_range).unwrap_or_default();
    let engine: Arc<dyn Engine> = Arc::new(TextEngine::new());
    let format = resolve_format(args.format, config.export.default_format, engine.as_ref());
    let viewer = TerminalViewer::new(Arc::clone(&engine));
    let mut controller = SessionController::new(engine, viewer, config);
    let sources: Vec<ImportSource> = args.files.iter().map(ImportSource::from_path).collect();

    if let Some(output) = &args.export {
        let request = DownloadRequest {
            format,
            file_name: output.to_string_lossy().into_owned(),
            min_page: range.0,
            max_page: range.1,
        };
        return run_batch(&mut controller, sources, request).await;
    }

    let mut app = App::new(controller, format, range, args.page);
    app.start_import(&sources);
    app.run().await
}

/// `--format` wins; a configured default the engine cannot write falls back
/// to the engine's first format.
fn resolve_format(
    requested: Option<ExportFormat>,
    configured: ExportFormat,
    engine: &dyn Engine,
) -> ExportFormat {
    if let Some(format) = requested {
        return format;
    }
    let supported = engine.export_formats();
    if supported.contains(&configured) {
        return configured;
    }
    match supported.first() {
        Some(&fallback) => {
            warn!(%configured, %fallback, "configured export format is not supported");
            fallback
        }
        None => configured,
    }
}

/// Imports and exports without a terminal; any error alert fails the run.
async fn run_batch(
    controller: &mut SessionController<TerminalViewer>,
    sources: Vec<ImportSource>,
    request: DownloadRequest,
) -> Result<()> {
    controller.import(sources).await?;
    fail_on_alert(&controller.drain_events())?;
    let output = request.file_name.clone();
    controller.download(request).await?;
    fail_on_alert(&controller.drain_events())?;
    info!(file = %output, "batch export finished");
    Ok(())
}

fn fail_on_alert(events: &[SessionEvent]) -> Result<()> {
    for event in events {
        match event {
            SessionEvent::Alert {
                level: AlertLevel::Error,
                message,
            } => bail!("{}", message),
            SessionEvent::Alert {
                level: AlertLevel::Warning,
                message,
            } => warn!(%message, "import warning"),
            _ => {}
        }
    }
    Ok(())
}

/// `2-5` becomes `("2", "5")`, a single page is used for both ends.
fn split_range(raw: &str) -> (String, String) {
    match raw.split_once(['-', '\u{2013}', ':']) {
        Some((min, max)) => (min.trim().to_string(), max.trim().to_string()),
        None => (raw.trim().to_string(), raw.trim().to_string()),
    }
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('\u{2026}');
    out
}

async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(result) => result,
        Err(err) => Err(anyhow!(err).context("stage task did not finish")),
    }
}

enum Running {
    Import(StageTicket, JoinHandle<Result<ImportSummary>>),
    Recognize(StageTicket, JoinHandle<Result<()>>),
    Export(StageTicket, JoinHandle<Result<()>>),
}

impl Running {
    fn is_finished(&self) -> bool {
        match self {
            Running::Import(_, handle) => handle.is_finished(),
            Running::Recognize(_, handle) | Running::Export(_, handle) => handle.is_finished(),
        }
    }

    fn abort(&self) {
        match self {
            Running::Import(_, handle) => handle.abort(),
            Running::Recognize(_, handle) | Running::Export(_, handle) => handle.abort(),
        }
    }
}

enum LoopAction {
    Continue,
    Quit,
}

struct App {
    controller: SessionController<TerminalViewer>,
    mapper: EventMapper,
    status: StatusLine,
    format: ExportFormat,
    range: (String, String),
    initial_page: Option<String>,
    running: Option<Running>,
    dirty: bool,
}

impl App {
    fn new(
        controller: SessionController<TerminalViewer>,
        format: ExportFormat,
        range: (String, String),
        initial_page: Option<String>,
    ) -> Self {
        let status = StatusLine::new(controller.baseline().range());
        Self {
            controller,
            mapper: EventMapper::new(),
            status,
            format,
            range,
            initial_page,
            running: None,
            dirty: true,
        }
    }

    async fn run(&mut self) -> Result<()> {
        let _raw = RawModeGuard::new()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, cursor::Hide, Clear(ClearType::All))?;

        loop {
            self.poll_stage().await;
            self.controller.pump_progress();
            self.absorb_events();

            let viewer_dirty = self.controller.viewer_mut().take_dirty();
            if self.dirty || viewer_dirty {
                self.redraw(&mut stdout)?;
                self.dirty = false;
            }

            if event::poll(Duration::from_millis(100))? {
                let ev = event::read()?;
                if let Event::Key(key) = &ev {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                }
                if matches!(ev, Event::Resize(..)) {
                    crossterm::execute!(stdout, Clear(ClearType::All))?;
                    self.dirty = true;
                    continue;
                }
                let ui_event = self.mapper.map_event(ev);
                self.dirty = true;
                if let LoopAction::Quit = self.handle_event(ui_event) {
                    break;
                }
            }
        }

        if let Some(running) = self.running.take() {
            running.abort();
        }
        crossterm::execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
        Ok(())
    }

    fn handle_event(&mut self, event: UiEvent) -> LoopAction {
        match event {
            UiEvent::Intent(intent) => self.apply(intent),
            UiEvent::Repeat { intent, count } => {
                let limit = self.controller.page_count().max(1);
                for _ in 0..count.min(limit) {
                    self.apply(intent.clone());
                }
            }
            UiEvent::SelectWord { delta } => self.controller.viewer_mut().select_word(delta),
            UiEvent::Deselect => {
                self.controller.viewer_mut().clear_selection();
                self.apply(Intent::Deselected);
                let download = self.controller.progress(TrackerKind::Download);
                if download.visible && download.completed == download.total {
                    self.apply(Intent::DownloadPanelHidden);
                }
                self.status.dismiss();
            }
            UiEvent::SearchQueryChanged { .. } => {}
            UiEvent::RecognizeAll => self.start_recognition(),
            UiEvent::Export => self.start_export(),
            UiEvent::Quit => return LoopAction::Quit,
            UiEvent::None => {}
        }
        LoopAction::Continue
    }

    fn apply(&mut self, intent: Intent) {
        if intent == Intent::Clear {
            if let Some(running) = self.running.take() {
                running.abort();
            }
        }
        if let Err(err) = self.controller.apply(intent) {
            warn!(error = %err, "intent rejected");
            self.status.apply(&SessionEvent::Alert {
                level: AlertLevel::Warning,
                message: err.to_string(),
            });
        }
    }

    fn start_import(&mut self, sources: &[ImportSource]) {
        match self.controller.begin_import(sources) {
            Ok(ticket) => {
                let engine = self.controller.engine();
                let reporter = ticket.reporter();
                let sources = sources.to_vec();
                let handle = tokio::spawn(async move { engine.import(sources, reporter).await });
                self.running = Some(Running::Import(ticket, handle));
            }
            Err(err) => self.reject("import", err),
        }
    }

    fn start_recognition(&mut self) {
        let discard_active =
            self.status.prompt() == Some(ImportPrompt::OfferRecognitionOrKeepExisting);
        match self.controller.begin_recognition(discard_active) {
            Ok((ticket, request)) => {
                let engine = self.controller.engine();
                let reporter = ticket.reporter();
                let handle =
                    tokio::spawn(async move { engine.recognize(request, reporter).await });
                self.running = Some(Running::Recognize(ticket, handle));
            }
            Err(err) => self.reject("recognition", err),
        }
    }

    fn start_export(&mut self) {
        let file_name = self
            .status
            .download_name()
            .unwrap_or("export")
            .to_string();
        let request = DownloadRequest {
            format: self.format,
            file_name,
            min_page: self.range.0.clone(),
            max_page: self.range.1.clone(),
        };
        match self.controller.request_export(request) {
            Ok(ExportStart::Started { ticket, request }) => self.spawn_export(ticket, request),
            Ok(ExportStart::Deferred) => info!("export queued behind recognition"),
            Err(err) => self.reject("export", err),
        }
    }

    fn spawn_export(&mut self, ticket: StageTicket, request: ExportRequest) {
        let engine = self.controller.engine();
        let reporter = ticket.reporter();
        let handle = tokio::spawn(async move { engine.export(request, reporter).await });
        self.running = Some(Running::Export(ticket, handle));
    }

    fn reject(&mut self, stage: &str, err: SessionError) {
        warn!(stage, error = %err, "stage not started");
        self.status.apply(&SessionEvent::Alert {
            level: AlertLevel::Warning,
            message: format!("{}: {}", stage, err),
        });
    }

    async fn poll_stage(&mut self) {
        if !self.running.as_ref().is_some_and(Running::is_finished) {
            return;
        }
        let Some(running) = self.running.take() else {
            return;
        };
        match running {
            Running::Import(ticket, handle) => {
                let result = join(handle).await;
                self.controller.complete_import(ticket, result);
                if !self.range.0.is_empty() || !self.range.1.is_empty() {
                    self.apply(Intent::UpdatePageRange {
                        min: self.range.0.clone(),
                        max: self.range.1.clone(),
                    });
                }
                if let Some(raw) = self.initial_page.take() {
                    self.apply(Intent::GotoPageInput { raw });
                }
            }
            Running::Recognize(ticket, handle) => {
                let result = join(handle).await;
                if let Some((ticket, request)) = self.controller.complete_recognition(ticket, result)
                {
                    self.spawn_export(ticket, request);
                }
            }
            Running::Export(ticket, handle) => {
                let result = join(handle).await;
                self.controller.complete_export(ticket, result);
            }
        }
        self.dirty = true;
    }

    fn absorb_events(&mut self) {
        let range = self.controller.baseline().range();
        for event in self.controller.drain_events() {
            match &event {
                SessionEvent::BaselineControl(Some(value)) => self.mapper.enter_baseline(*value, range),
                SessionEvent::BaselineControl(None) if self.mapper.mode() == InputMode::Baseline => {
                    self.mapper.set_mode(InputMode::Normal)
                }
                _ => {}
            }
            self.status.apply(&event);
            self.dirty = true;
        }
    }

    fn redraw<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let (cols, rows) = terminal::size()?;
        let body = rows.saturating_sub(1);
        crossterm::queue!(out, terminal::BeginSynchronizedUpdate)?;
        self.controller.viewer().draw(out, 0, body)?;
        let pending = self.mapper.pending_input();
        let line = self.status.render(pending.as_deref());
        write_status_line(out, body, &truncate_to_width(&line, cols as usize))?;
        crossterm::execute!(out, terminal::EndSynchronizedUpdate)?;
        Ok(())
    }
}

fn init_logging(project_dirs: &ProjectDirs, console: bool) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "termocr.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // The viewer owns the terminal, so only batch runs log to stderr.
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
