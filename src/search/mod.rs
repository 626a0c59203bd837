pub mod window;

use serde::Serialize;

pub use window::{ELLIPSIS, SearchMode, WindowSearch, find_windows};

/// One occurrence of a query on one page, with its context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub page_number: usize,
    pub window: String,
}
