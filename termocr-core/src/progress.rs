use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerKind {
    /// Shared by import and recognition.
    Import,
    /// Export, plus background rendering while an export runs.
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub visible: bool,
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: usize,
    completed: usize,
    visible: bool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, total: usize) {
        self.total = total;
        self.completed = 0;
        self.visible = true;
    }

    pub fn increment(&mut self) {
        if self.completed < self.total {
            self.completed += 1;
        }
    }

    pub fn fill(&mut self) {
        self.completed = self.total;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            completed: self.completed,
            visible: self.visible,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

/// Validates a raw progress total coming from outside the core.
pub fn parse_total(raw: i64) -> SessionResult<usize> {
    usize::try_from(raw).map_err(|_| SessionError::InvalidArgument {
        what: "progress total",
        value: raw.to_string(),
    })
}

/// The stage trackers plus which one is active and under which stage generation.
#[derive(Debug)]
pub struct ProgressBoard {
    import: ProgressTracker,
    download: ProgressTracker,
    active: TrackerKind,
    generation: u64,
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self {
            import: ProgressTracker::new(),
            download: ProgressTracker::new(),
            active: TrackerKind::Import,
            generation: 0,
        }
    }
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates `kind` for a new stage and returns that stage's generation.
    pub fn activate(&mut self, kind: TrackerKind, total: usize) -> u64 {
        self.generation += 1;
        self.active = kind;
        self.tracker_mut(kind).show(total);
        self.generation
    }

    /// Invalidates the current generation without switching trackers.
    pub fn retire(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn active(&self) -> TrackerKind {
        self.active
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn tracker(&self, kind: TrackerKind) -> &ProgressTracker {
        match kind {
            TrackerKind::Import => &self.import,
            TrackerKind::Download => &self.download,
        }
    }

    pub fn tracker_mut(&mut self, kind: TrackerKind) -> &mut ProgressTracker {
        match kind {
            TrackerKind::Import => &mut self.import,
            TrackerKind::Download => &mut self.download,
        }
    }

    pub fn active_tracker_mut(&mut self) -> &mut ProgressTracker {
        self.tracker_mut(self.active)
    }
}
