use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAction {
    /// A new term was indexed.
    Indexed { total: usize },
    /// The active term was re-submitted; `target` is the page to jump to, if any.
    Navigate { target: Option<usize> },
}

#[derive(Debug, Default, Clone)]
pub struct SearchIndex {
    term: String,
    matches: Vec<usize>,
    total: usize,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn matches(&self) -> &[usize] {
        &self.matches
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Indexes `term` using the per-page counts produced by `count`.
    pub fn search<F>(&mut self, term: &str, count: F) -> SessionResult<usize>
    where
        F: FnOnce(&str) -> Vec<usize>,
    {
        let term = term.trim();
        if term.is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        let matches = count(term);
        self.term = term.to_string();
        self.set_matches(matches);
        Ok(self.total)
    }

    /// Handles an Enter in the find box: repeats navigate, new terms are indexed.
    pub fn submit<F>(
        &mut self,
        term: &str,
        backwards: bool,
        current_page: usize,
        count: F,
    ) -> SessionResult<SearchAction>
    where
        F: FnOnce(&str) -> Vec<usize>,
    {
        let trimmed = term.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        if trimmed == self.term {
            let target = if backwards {
                self.find_previous(current_page)
            } else {
                self.find_next(current_page)
            };
            return Ok(SearchAction::Navigate { target });
        }
        let total = self.search(trimmed, count)?;
        Ok(SearchAction::Indexed { total })
    }

    /// Drops the term and sizes the table for a document of `page_count` pages.
    pub fn reset(&mut self, page_count: usize) {
        self.term.clear();
        self.set_matches(vec![0; page_count]);
    }

    pub fn clear(&mut self) {
        self.reset(0);
    }

    pub fn match_label(&self, page: usize) -> String {
        let count = match self.matches.get(page) {
            Some(&count) if count > 0 => count,
            _ => return "-".to_string(),
        };
        let first = self.matches[..page].iter().sum::<usize>() + 1;
        if count == 1 {
            first.to_string()
        } else {
            format!("{}-{}", first, first + count - 1)
        }
    }

    pub fn find_previous(&self, current_page: usize) -> Option<usize> {
        let end = current_page.min(self.matches.len());
        self.matches[..end].iter().rposition(|&count| count > 0)
    }

    pub fn find_next(&self, current_page: usize) -> Option<usize> {
        let start = current_page.checked_add(1)?;
        self.matches
            .get(start..)?
            .iter()
            .position(|&count| count > 0)
            .map(|offset| start + offset)
    }

    fn set_matches(&mut self, matches: Vec<usize>) {
        self.total = matches.iter().sum();
        self.matches = matches;
    }
}
