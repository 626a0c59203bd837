use std::cell::RefCell;
use std::iter::FusedIterator;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::backend::{PageHandle, PdfBackend, check_page, open_default_backend};
use crate::error::AppResult;
use crate::metadata::Metadata;
use crate::render::{PageImage, render_page, validate_scale};
use crate::search::{SearchMatch, SearchMode, WindowSearch};
use crate::source::DocumentSource;
use crate::surface::{ImageEncoding, RasterSurfaceFactory, SurfaceFactory};
use crate::text::extract_text;

pub mod shared;

pub use shared::SharedSession;

pub const DEFAULT_SCALE: f32 = 1.0;
pub const DEFAULT_SEARCH_VIEW_LENGTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    #[default]
    White,
    Transparent,
}

/// Settings handed through to the parser. Interpreter safety settings are
/// fixed and not part of this struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitParams {
    /// Takes precedence over [`OpenOptions::password`].
    pub password: Option<String>,
    pub background: Background,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenOptions {
    pub password: Option<String>,
    pub scale: Option<f32>,
    pub search_view_length: Option<usize>,
    pub search_mode: SearchMode,
    pub encoding: ImageEncoding,
    /// Pages of extracted text kept between searches; 0 disables the cache.
    pub text_cache_pages: usize,
    pub doc_init_params: InitParams,
}

impl OpenOptions {
    pub fn effective_password(&self) -> Option<&str> {
        self.doc_init_params
            .password
            .as_deref()
            .or(self.password.as_deref())
    }

    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            scale: self.scale.unwrap_or(DEFAULT_SCALE),
            search_view_length: self
                .search_view_length
                .unwrap_or(DEFAULT_SEARCH_VIEW_LENGTH),
            search_mode: self.search_mode,
            encoding: self.encoding,
            text_cache_pages: self.text_cache_pages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub scale: f32,
    pub search_view_length: usize,
    pub search_mode: SearchMode,
    pub encoding: ImageEncoding,
    pub text_cache_pages: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        OpenOptions::default().settings()
    }
}

pub struct DocumentSession {
    backend: Box<dyn PdfBackend>,
    metadata: Metadata,
    settings: SessionSettings,
    surfaces: Arc<dyn SurfaceFactory>,
    text_cache: Option<RefCell<LruCache<usize, Arc<str>>>>,
}

impl DocumentSession {
    pub fn open(source: impl Into<DocumentSource>, options: OpenOptions) -> AppResult<Self> {
        let settings = options.settings();
        validate_scale(settings.scale)?;

        let bytes = source.into().resolve()?;
        let opened = open_default_backend(
            bytes,
            options.effective_password(),
            options.doc_init_params.background,
        )?;
        info!(
            pages = opened.backend.page_count(),
            encrypted = opened.encrypted,
            "opened document"
        );

        Self::from_backend(opened.backend, opened.metadata, settings)
    }

    pub fn from_backend(
        backend: Box<dyn PdfBackend>,
        metadata: Metadata,
        settings: SessionSettings,
    ) -> AppResult<Self> {
        validate_scale(settings.scale)?;
        let text_cache = NonZeroUsize::new(settings.text_cache_pages)
            .map(|capacity| RefCell::new(LruCache::new(capacity)));

        Ok(Self {
            backend,
            metadata,
            settings,
            surfaces: Arc::new(RasterSurfaceFactory::new(settings.encoding)),
            text_cache,
        })
    }

    pub fn with_surface_factory(mut self, surfaces: Arc<dyn SurfaceFactory>) -> Self {
        self.surfaces = surfaces;
        self
    }

    pub fn page_count(&self) -> usize {
        self.backend.page_count()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn scale(&self) -> f32 {
        self.settings.scale
    }

    pub fn search_view_length(&self) -> usize {
        self.settings.search_view_length
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn page_handle(&self, page: usize) -> AppResult<PageHandle<'_>> {
        check_page(page, self.page_count())?;
        Ok(PageHandle::new(self.backend.as_ref(), page))
    }

    /// Renders `page` (1-based) at the session scale. Every call renders anew.
    pub fn get_page(&self, page: usize) -> AppResult<PageImage> {
        let handle = self.page_handle(page)?;
        render_page(&handle, self.settings.scale, self.surfaces.as_ref())
    }

    pub fn page_text(&self, page: usize) -> AppResult<String> {
        Ok(self.cached_page_text(page)?.to_string())
    }

    /// Searches every page in ascending order and stops at the first page
    /// that fails.
    pub fn search(&self, query: &str) -> AppResult<Vec<SearchMatch>> {
        let search = self.compile(query)?;
        if search.matches_nothing() {
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for page in 1..=self.page_count() {
            let text = self.cached_page_text(page)?;
            matches.extend(
                search
                    .windows(&text)
                    .into_iter()
                    .map(|window| SearchMatch {
                        page_number: page,
                        window,
                    }),
            );
        }

        debug!(
            pages = self.page_count(),
            matches = matches.len(),
            "search finished"
        );
        Ok(matches)
    }

    pub fn search_in_page(&self, query: &str, page: &PageHandle<'_>) -> AppResult<Vec<String>> {
        let search = self.compile(query)?;
        if search.matches_nothing() {
            return Ok(Vec::new());
        }

        Ok(search.windows(&extract_text(page)?))
    }

    pub fn pages(&self) -> PageImages<'_> {
        PageImages {
            session: self,
            next: 1,
            done: false,
        }
    }

    fn compile(&self, query: &str) -> AppResult<WindowSearch> {
        WindowSearch::new(
            query,
            self.settings.search_view_length,
            self.settings.search_mode,
        )
    }

    fn cached_page_text(&self, page: usize) -> AppResult<Arc<str>> {
        let Some(cache) = self.text_cache.as_ref() else {
            return Ok(extract_text(&self.page_handle(page)?)?.into());
        };

        if let Some(text) = cache.borrow_mut().get(&page) {
            trace!(page, "page text cache hit");
            return Ok(Arc::clone(text));
        }

        let text: Arc<str> = extract_text(&self.page_handle(page)?)?.into();
        cache.borrow_mut().put(page, Arc::clone(&text));
        Ok(text)
    }
}

impl std::fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("page_count", &self.page_count())
            .field("metadata", &self.metadata)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Forward-only page renders. Ends after the last page, or right after the
/// first page that fails, and then keeps returning `None`.
pub struct PageImages<'s> {
    session: &'s DocumentSession,
    next: usize,
    done: bool,
}

impl Iterator for PageImages<'_> {
    type Item = AppResult<PageImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next > self.session.page_count() {
            self.done = true;
            return None;
        }

        let result = self.session.get_page(self.next);
        self.next += 1;
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = (self.session.page_count() + 1).saturating_sub(self.next);
        (0, Some(remaining))
    }
}

impl FusedIterator for PageImages<'_> {}
