//! Session orchestration for an OCR document viewer: progress routing, search
//! navigation and scoped edit sessions over an external engine and viewer.

mod baseline;
mod config;
mod controller;
mod document;
mod engine;
mod error;
mod export;
mod progress;
mod search;
mod stage;

pub use baseline::{BaselineCommit, BaselineEditor, Opened, MAX_BASELINE_RANGE};
pub use config::{ExportConfig, RecognitionConfig, RecognitionMode, SessionConfig};
pub use controller::{
    AlertLevel, Controls, ExportStart, ImportPrompt, Intent, SessionController, SessionEvent,
    StageTicket,
};
pub use document::{
    EngineName, FontStyle, LineId, OcrLine, OcrWord, PageLayout, RenderedWord, WordId,
    WordUpdate, TESSERACT_LATEST, TESSERACT_LEGACY, TESSERACT_LSTM,
};
pub use engine::{Engine, ImportSource, ImportSummary, InputKind, RecognizeRequest, Viewer};
pub use error::{SessionError, SessionResult};
pub use export::{replace_extension, DownloadRequest, ExportFormat, ExportRequest, PageRange};
pub use progress::{parse_total, ProgressBoard, ProgressSnapshot, ProgressTracker, TrackerKind};
pub use search::{SearchAction, SearchIndex};
pub use stage::{
    ProgressEnvelope, ProgressReporter, Refresh, RouteContext, Routing, StageEvent,
    StageEventRouter, StageKind,
};
