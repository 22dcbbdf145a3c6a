use termocr_core::{AlertLevel, ImportPrompt, ProgressSnapshot, SessionEvent, TrackerKind};

const BAR_WIDTH: usize = 10;

/// Folds session events into the one-line footer.
#[derive(Debug, Default)]
pub struct StatusLine {
    baseline_range: i32,
    page: usize,
    page_count: usize,
    match_label: String,
    match_total: usize,
    import: ProgressSnapshot,
    download: ProgressSnapshot,
    baseline: Option<i32>,
    prompt: Option<ImportPrompt>,
    download_name: Option<String>,
    range_label: Option<String>,
    alert: Option<(AlertLevel, String)>,
}

impl StatusLine {
    pub fn new(baseline_range: i32) -> Self {
        Self {
            baseline_range,
            ..Self::default()
        }
    }

    pub fn download_name(&self) -> Option<&str> {
        self.download_name.as_deref()
    }

    pub fn prompt(&self) -> Option<ImportPrompt> {
        self.prompt
    }

    pub fn dismiss(&mut self) {
        self.alert = None;
        self.prompt = None;
    }

    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::ProgressChanged { tracker, progress } => match tracker {
                TrackerKind::Import => self.import = *progress,
                TrackerKind::Download => self.download = *progress,
            },
            SessionEvent::PageDisplayed { page, page_count } => {
                self.page = *page;
                self.page_count = *page_count;
            }
            SessionEvent::MatchLabelChanged { current, total } => {
                self.match_label = current.clone();
                self.match_total = *total;
            }
            SessionEvent::BaselineControl(value) => self.baseline = *value,
            SessionEvent::ImportPrompt(prompt) => self.prompt = Some(*prompt),
            SessionEvent::DownloadNameChanged(name) => self.download_name = Some(name.clone()),
            SessionEvent::PageRangeChanged { label } => self.range_label = Some(label.clone()),
            SessionEvent::Alert { level, message } => self.alert = Some((*level, message.clone())),
            SessionEvent::StageFinished { success: true, .. } => self.prompt = None,
            SessionEvent::Cleared => *self = Self::new(self.baseline_range),
            SessionEvent::ControlsChanged(_)
            | SessionEvent::FontsAdded(_)
            | SessionEvent::StageFinished { .. } => {}
        }
    }

    pub fn render(&self, pending: Option<&str>) -> String {
        let mut parts = Vec::new();
        if self.page_count > 0 {
            parts.push(format!("page {}/{}", self.page + 1, self.page_count));
        } else {
            parts.push("no document".to_string());
        }
        if self.match_total > 0 {
            parts.push(format!("match {}/{}", self.match_label, self.match_total));
        }
        if self.import.visible {
            parts.push(progress_bar("ocr", &self.import));
        }
        if self.download.visible {
            let mut bar = progress_bar("export", &self.download);
            if let Some(label) = &self.range_label {
                bar.push_str(label);
            }
            parts.push(bar);
        }
        if let Some(value) = self.baseline {
            parts.push(format!("baseline {:+}", value - self.baseline_range));
        }
        match self.prompt {
            Some(ImportPrompt::OfferRecognition) => parts.push("r: recognize text".to_string()),
            Some(ImportPrompt::OfferRecognitionOrKeepExisting) => {
                parts.push("r: re-recognize, Esc: keep existing text".to_string())
            }
            None => {}
        }
        if let Some((level, message)) = &self.alert {
            let tag = match level {
                AlertLevel::Warning => "warning",
                AlertLevel::Error => "error",
            };
            parts.push(format!("{}: {}", tag, message));
        }
        if let Some(pending) = pending {
            parts.push(pending.to_string());
        }
        parts.join(" | ")
    }
}

fn progress_bar(name: &str, progress: &ProgressSnapshot) -> String {
    let fraction = progress.fraction().clamp(0.0, 1.0);
    let filled = (fraction * BAR_WIDTH as f32).round() as usize;
    format!(
        "{} [{}{}] {:>3}%",
        name,
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        (fraction * 100.0).round() as u32
    )
}
