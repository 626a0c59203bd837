use crate::backend::PageHandle;
use crate::error::AppResult;

/// One run of text as the backend yields it, with the baseline origin it was
/// drawn at.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextContent {
    pub items: Vec<TextItem>,
}

impl TextContent {
    /// Joins item fragments in order, without separators. Positions are
    /// dropped and whitespace inside fragments is kept as-is.
    pub fn flatten(&self) -> String {
        let capacity = self.items.iter().map(|item| item.text.len()).sum();
        self.items
            .iter()
            .fold(String::with_capacity(capacity), |mut out, item| {
                out.push_str(&item.text);
                out
            })
    }
}

pub fn extract_text(page: &PageHandle<'_>) -> AppResult<String> {
    Ok(page.text_content()?.flatten())
}
