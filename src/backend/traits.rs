use crate::error::{AppError, AppResult};
use crate::render::Viewport;
use crate::surface::Surface;
use crate::text::TextContent;

/// A parsed document. Page numbers are 1-based throughout.
pub trait PdfBackend: Send {
    fn page_count(&self) -> usize;
    fn page_dimensions(&self, page: usize) -> AppResult<(f32, f32)>;
    fn rasterize(&self, page: usize, viewport: &Viewport, surface: &mut dyn Surface)
    -> AppResult<()>;
    fn text_content(&self, page: usize) -> AppResult<TextContent>;
}

/// A borrowed view of one page of a [`PdfBackend`].
#[derive(Clone, Copy)]
pub struct PageHandle<'a> {
    backend: &'a dyn PdfBackend,
    page: usize,
}

impl<'a> PageHandle<'a> {
    pub(crate) fn new(backend: &'a dyn PdfBackend, page: usize) -> Self {
        Self { backend, page }
    }

    pub fn page_number(&self) -> usize {
        self.page
    }

    pub fn dimensions(&self) -> AppResult<(f32, f32)> {
        self.backend.page_dimensions(self.page)
    }

    pub fn rasterize(&self, viewport: &Viewport, surface: &mut dyn Surface) -> AppResult<()> {
        self.backend.rasterize(self.page, viewport, surface)
    }

    pub fn text_content(&self) -> AppResult<TextContent> {
        self.backend.text_content(self.page)
    }
}

impl std::fmt::Debug for PageHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

pub(crate) fn check_page(page: usize, page_count: usize) -> AppResult<()> {
    if page == 0 || page > page_count {
        return Err(AppError::page_range(page, page_count));
    }
    Ok(())
}
