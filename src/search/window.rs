use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// The query is a case-insensitive regular-expression fragment.
    #[default]
    Pattern,
    /// The query is matched literally, still ignoring case.
    Literal,
}

/// A compiled query plus the context radius used to cut windows around each
/// match.
#[derive(Debug, Clone)]
pub struct WindowSearch {
    regex: Option<Regex>,
    radius: usize,
}

impl WindowSearch {
    pub fn new(query: &str, radius: usize, mode: SearchMode) -> AppResult<Self> {
        if query.is_empty() {
            return Ok(Self {
                regex: None,
                radius,
            });
        }

        let pattern = match mode {
            SearchMode::Pattern => query.to_string(),
            SearchMode::Literal => regex::escape(query),
        };
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| AppError::invalid_pattern(query, source))?;

        Ok(Self {
            regex: Some(regex),
            radius,
        })
    }

    /// True for the empty query, which never produces a window.
    pub fn matches_nothing(&self) -> bool {
        self.regex.is_none()
    }

    /// Windows for every non-empty match, ordered by match start.
    pub fn windows(&self, text: &str) -> Vec<String> {
        let Some(regex) = self.regex.as_ref() else {
            return Vec::new();
        };

        regex
            .find_iter(text)
            .filter(|found| !found.is_empty())
            .map(|found| self.window_at(text, found.start(), found.end()))
            .collect()
    }

    fn window_at(&self, text: &str, start: usize, end: usize) -> String {
        let left = context_start(text, start, self.radius);
        let right = context_end(text, end, self.radius);

        let mut window = String::with_capacity(right - left + 2 * ELLIPSIS.len());
        if left < start {
            window.push_str(ELLIPSIS);
        }
        window.push_str(&text[left..right]);
        if right > end {
            window.push_str(ELLIPSIS);
        }
        window
    }
}

pub fn find_windows(text: &str, query: &str, radius: usize) -> AppResult<Vec<String>> {
    Ok(WindowSearch::new(query, radius, SearchMode::Pattern)?.windows(text))
}

// Context never reaches across a line break.
fn is_line_terminator(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn context_start(text: &str, start: usize, radius: usize) -> usize {
    text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .take_while(|(_, ch)| !is_line_terminator(*ch))
        .last()
        .map_or(start, |(index, _)| index)
}

fn context_end(text: &str, end: usize, radius: usize) -> usize {
    text[end..]
        .char_indices()
        .take(radius)
        .take_while(|(_, ch)| !is_line_terminator(*ch))
        .last()
        .map_or(end, |(index, ch)| end + index + ch.len_utf8())
}
