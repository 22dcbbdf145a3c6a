use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::document::EngineName;
use crate::progress::TrackerKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Import,
    Recognize,
    Export,
}

impl StageKind {
    pub fn tracker(self) -> TrackerKind {
        match self {
            StageKind::Import | StageKind::Recognize => TrackerKind::Import,
            StageKind::Export => TrackerKind::Download,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageKind::Import => "import",
            StageKind::Recognize => "recognition",
            StageKind::Export => "export",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Convert { page: usize, engine_name: EngineName },
    Export,
    ImportImage { page: usize },
    ImportPdf { page: usize },
    Render,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEnvelope {
    pub generation: u64,
    pub event: StageEvent,
}

/// Handed to the engine for one stage; every event it reports carries that stage's generation.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    generation: u64,
    queue: Arc<Mutex<Vec<ProgressEnvelope>>>,
}

impl ProgressReporter {
    pub(crate) fn new(generation: u64, queue: Arc<Mutex<Vec<ProgressEnvelope>>>) -> Self {
        Self { generation, queue }
    }

    /// A reporter whose events go nowhere, for driving engines outside a session.
    pub fn detached() -> Self {
        Self::new(0, Arc::new(Mutex::new(Vec::new())))
    }

    /// A reporter that collects into `queue` outside a session.
    pub fn collecting(queue: Arc<Mutex<Vec<ProgressEnvelope>>>) -> Self {
        Self::new(0, queue)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn report(&self, event: StageEvent) {
        self.queue.lock().push(ProgressEnvelope {
            generation: self.generation,
            event,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Redisplay(usize),
    OverlayOnly(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routing {
    pub increment: bool,
    pub refresh: Option<Refresh>,
}

impl Routing {
    const IGNORE: Routing = Routing {
        increment: false,
        refresh: None,
    };

    fn increment_only() -> Self {
        Self {
            increment: true,
            refresh: None,
        }
    }

    fn increment_and(refresh: Option<Refresh>) -> Self {
        Self {
            increment: true,
            refresh,
        }
    }
}

/// What the router needs to know about the world at delivery time.
pub trait RouteContext {
    fn current_page(&self) -> usize;
    fn active_tracker(&self) -> TrackerKind;
    fn displayed_engine(&self) -> Option<EngineName>;
    fn has_page_result(&self, engine: &EngineName, page: usize) -> bool;
}

#[derive(Debug, Clone)]
pub struct StageEventRouter {
    latest_alias: EngineName,
    /// Placeholder engines, highest priority first.
    fallback_engines: Vec<EngineName>,
    overlay_warm_distance: usize,
}

impl StageEventRouter {
    pub fn new(
        latest_alias: EngineName,
        fallback_engines: Vec<EngineName>,
        overlay_warm_distance: usize,
    ) -> Self {
        Self {
            latest_alias,
            fallback_engines,
            overlay_warm_distance,
        }
    }

    pub fn route(&self, event: &StageEvent, ctx: &dyn RouteContext) -> Routing {
        let current = ctx.current_page();
        match event {
            StageEvent::Convert { page, engine_name } => {
                let show = *page == current && self.displays_engine(engine_name, *page, ctx);
                Routing::increment_and(show.then_some(Refresh::Redisplay(*page)))
            }
            StageEvent::Export => Routing::increment_only(),
            StageEvent::ImportImage { page } => {
                let refresh = if *page == current {
                    Some(Refresh::Redisplay(*page))
                } else if page.abs_diff(current) < self.overlay_warm_distance {
                    Some(Refresh::OverlayOnly(*page))
                } else {
                    None
                };
                Routing::increment_and(refresh)
            }
            StageEvent::ImportPdf { page } => {
                Routing::increment_and((*page == current).then_some(Refresh::Redisplay(*page)))
            }
            StageEvent::Render => {
                if ctx.active_tracker() == TrackerKind::Download {
                    Routing::increment_only()
                } else {
                    Routing::IGNORE
                }
            }
        }
    }

    fn displays_engine(&self, engine: &EngineName, page: usize, ctx: &dyn RouteContext) -> bool {
        let Some(displayed) = ctx.displayed_engine() else {
            return false;
        };
        if *engine == displayed {
            return true;
        }
        if displayed != self.latest_alias {
            return false;
        }
        // A placeholder only shows while nothing better exists for the page.
        match self.fallback_engines.iter().position(|name| name == engine) {
            Some(rank) => !self.fallback_engines[..rank]
                .iter()
                .any(|better| ctx.has_page_result(better, page)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{TESSERACT_LATEST, TESSERACT_LEGACY, TESSERACT_LSTM};
    use std::collections::HashSet;

    struct Ctx {
        current: usize,
        active: TrackerKind,
        displayed: Option<EngineName>,
        results: HashSet<(String, usize)>,
    }

    impl Ctx {
        fn at(current: usize) -> Self {
            Self {
                current,
                active: TrackerKind::Import,
                displayed: Some(EngineName::from(TESSERACT_LATEST)),
                results: HashSet::new(),
            }
        }
    }

    impl RouteContext for Ctx {
        fn current_page(&self) -> usize {
            self.current
        }

        fn active_tracker(&self) -> TrackerKind {
            self.active
        }

        fn displayed_engine(&self) -> Option<EngineName> {
            self.displayed.clone()
        }

        fn has_page_result(&self, engine: &EngineName, page: usize) -> bool {
            self.results.contains(&(engine.as_str().to_string(), page))
        }
    }

    fn router() -> StageEventRouter {
        StageEventRouter::new(
            EngineName::from(TESSERACT_LATEST),
            vec![
                EngineName::from(TESSERACT_LSTM),
                EngineName::from(TESSERACT_LEGACY),
            ],
            2,
        )
    }

    fn convert(page: usize, engine: &str) -> StageEvent {
        StageEvent::Convert {
            page,
            engine_name: EngineName::from(engine),
        }
    }

    #[test]
    fn legacy_placeholder_shows_while_lstm_is_missing() {
        let ctx = Ctx::at(2);
        let routing = router().route(&convert(2, TESSERACT_LEGACY), &ctx);
        assert!(routing.increment);
        assert_eq!(routing.refresh, Some(Refresh::Redisplay(2)));
    }

    #[test]
    fn legacy_placeholder_is_hidden_once_lstm_exists() {
        let mut ctx = Ctx::at(2);
        ctx.results.insert((TESSERACT_LSTM.to_string(), 2));
        let routing = router().route(&convert(2, TESSERACT_LEGACY), &ctx);
        assert!(routing.increment);
        assert_eq!(routing.refresh, None);

        let routing = router().route(&convert(2, TESSERACT_LSTM), &ctx);
        assert_eq!(routing.refresh, Some(Refresh::Redisplay(2)));
    }

    #[test]
    fn convert_for_displayed_engine_refreshes_only_current_page() {
        let mut ctx = Ctx::at(1);
        ctx.displayed = Some(EngineName::from(TESSERACT_LEGACY));
        let router = router();
        assert_eq!(
            router.route(&convert(1, TESSERACT_LEGACY), &ctx).refresh,
            Some(Refresh::Redisplay(1))
        );
        assert_eq!(router.route(&convert(0, TESSERACT_LEGACY), &ctx).refresh, None);
        // Placeholders only apply to the latest alias.
        assert_eq!(router.route(&convert(1, TESSERACT_LSTM), &ctx).refresh, None);
    }

    #[test]
    fn convert_without_displayed_engine_never_refreshes() {
        let mut ctx = Ctx::at(0);
        ctx.displayed = None;
        let routing = router().route(&convert(0, TESSERACT_LSTM), &ctx);
        assert!(routing.increment);
        assert_eq!(routing.refresh, None);
    }

    #[test]
    fn import_image_warms_adjacent_pages_only() {
        let ctx = Ctx::at(4);
        let router = router();
        assert_eq!(
            router.route(&StageEvent::ImportImage { page: 5 }, &ctx).refresh,
            Some(Refresh::OverlayOnly(5))
        );
        assert_eq!(
            router.route(&StageEvent::ImportImage { page: 3 }, &ctx).refresh,
            Some(Refresh::OverlayOnly(3))
        );
        assert_eq!(
            router.route(&StageEvent::ImportImage { page: 4 }, &ctx).refresh,
            Some(Refresh::Redisplay(4))
        );
        let far = router.route(&StageEvent::ImportImage { page: 9 }, &ctx);
        assert!(far.increment);
        assert_eq!(far.refresh, None);
    }

    #[test]
    fn import_pdf_never_renders_overlay_for_neighbours() {
        let ctx = Ctx::at(4);
        let router = router();
        assert_eq!(
            router.route(&StageEvent::ImportPdf { page: 5 }, &ctx).refresh,
            None
        );
        assert_eq!(
            router.route(&StageEvent::ImportPdf { page: 4 }, &ctx).refresh,
            Some(Refresh::Redisplay(4))
        );
    }

    #[test]
    fn render_counts_only_during_download() {
        let mut ctx = Ctx::at(0);
        let router = router();
        assert!(!router.route(&StageEvent::Render, &ctx).increment);
        ctx.active = TrackerKind::Download;
        assert!(router.route(&StageEvent::Render, &ctx).increment);
        assert!(router.route(&StageEvent::Export, &ctx).increment);
    }

    #[test]
    fn reporter_stamps_generation() {
        let queue = Arc::new(Mutex::new(Vec::new()));
        let reporter = ProgressReporter::new(7, Arc::clone(&queue));
        reporter.report(StageEvent::Export);
        reporter.clone().report(StageEvent::Render);
        let envelopes = queue.lock();
        assert_eq!(envelopes.len(), 2);
        assert!(envelopes.iter().all(|env| env.generation == 7));
    }
}
