//! Baseline adjustment for one line of rendered words.
//!
//! The slider runs from `0` to `2 * range`; its midpoint means "no adjustment".
//! Previews move words in place, a release commits the adjustment and shifts
//! the line's shared baseline once.

use tracing::{debug, error};

use crate::document::{LineId, RenderedWord, WordId, WordUpdate};
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, PartialEq)]
struct Member {
    id: WordId,
    superscript: bool,
    original_offset: i32,
    committed_adj: i32,
}

#[derive(Debug, Clone, PartialEq)]
struct OpenSession {
    page: usize,
    line: LineId,
    members: Vec<Member>,
    value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub line: LineId,
    pub slider_value: i32,
    /// Reverts for a session that was open on another line.
    pub reverted: Vec<WordUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineCommit {
    pub page: usize,
    pub line: LineId,
    /// Shift applied to the line's shared baseline geometry.
    pub delta: i32,
    pub updates: Vec<WordUpdate>,
}

/// Largest accepted slider half-width.
pub const MAX_BASELINE_RANGE: i32 = 1000;

#[derive(Debug, Clone)]
pub struct BaselineEditor {
    range: i32,
    session: Option<OpenSession>,
}

impl BaselineEditor {
    pub fn new(range: i32) -> Self {
        Self {
            range: range.clamp(0, MAX_BASELINE_RANGE),
            session: None,
        }
    }

    pub fn range(&self) -> i32 {
        self.range
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn line(&self) -> Option<LineId> {
        self.session.as_ref().map(|session| session.line)
    }

    pub fn value(&self) -> Option<i32> {
        self.session.as_ref().map(|session| session.value)
    }

    pub fn members(&self) -> Vec<WordId> {
        self.session
            .as_ref()
            .map(|session| session.members.iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Opens a session on the line of the first selected word.
    ///
    /// Returns `Ok(None)` when nothing is selected.
    pub fn open(
        &mut self,
        selected: &[RenderedWord],
        rendered: &[RenderedWord],
    ) -> SessionResult<Option<Opened>> {
        let Some(first) = selected.first() else {
            return Ok(None);
        };

        let members: Vec<Member> = rendered
            .iter()
            .filter(|word| word.page == first.page && word.line == first.line)
            .map(|word| Member {
                id: word.id.clone(),
                superscript: word.superscript,
                original_offset: word.top_baseline_orig,
                committed_adj: word.baseline_adj,
            })
            .collect();
        if members.is_empty() {
            error!(word = %first.id, line = %first.line, "selected word has no rendered line");
            return Err(SessionError::UnresolvedLineIdentity {
                word: first.id.clone(),
            });
        }

        let reverted = self.cancel();
        let slider_value = self.range.saturating_add(first.baseline_adj);
        debug!(line = %first.line, members = members.len(), slider_value, "baseline session opened");
        self.session = Some(OpenSession {
            page: first.page,
            line: first.line,
            members,
            value: slider_value,
        });
        Ok(Some(Opened {
            line: first.line,
            slider_value,
            reverted,
        }))
    }

    /// Computes live positions for `value`; superscripts keep their drawn position.
    pub fn preview(&mut self, value: i32) -> Option<Vec<WordUpdate>> {
        let value = self.clamp(value);
        let range = self.range;
        let session = self.session.as_mut()?;
        session.value = value;
        let updates = session
            .members
            .iter()
            .map(|member| {
                let top_baseline = member.original_offset + (value - range);
                WordUpdate {
                    id: member.id.clone(),
                    top_baseline,
                    y_actual: (!member.superscript).then_some(top_baseline),
                    baseline_adj: None,
                }
            })
            .collect();
        Some(updates)
    }

    /// Commits `value` and closes the session. `None` when no session is open.
    pub fn commit(&mut self, value: i32) -> Option<BaselineCommit> {
        let value = self.clamp(value);
        let session = self.session.take()?;
        let adjustment = value - self.range;
        let delta = adjustment - session.members[0].committed_adj;
        let updates = session
            .members
            .iter()
            .map(|member| {
                let top_baseline = member.original_offset + adjustment;
                WordUpdate {
                    id: member.id.clone(),
                    top_baseline,
                    y_actual: (!member.superscript).then_some(top_baseline),
                    baseline_adj: Some(adjustment),
                }
            })
            .collect();
        debug!(line = %session.line, delta, "baseline committed");
        Some(BaselineCommit {
            page: session.page,
            line: session.line,
            delta,
            updates,
        })
    }

    /// Closes without committing; returns updates that restore committed positions.
    pub fn cancel(&mut self) -> Vec<WordUpdate> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };
        debug!(line = %session.line, "baseline session cancelled");
        session
            .members
            .iter()
            .map(|member| {
                let top_baseline = member.original_offset + member.committed_adj;
                WordUpdate {
                    id: member.id.clone(),
                    top_baseline,
                    y_actual: (!member.superscript).then_some(top_baseline),
                    baseline_adj: None,
                }
            })
            .collect()
    }

    fn clamp(&self, value: i32) -> i32 {
        value.clamp(0, self.range.saturating_mul(2))
    }
}
