use std::sync::{Arc, Mutex};

use futures_util::stream::{self, Stream, StreamExt};
use tokio::task;

use crate::error::{AppError, AppResult};
use crate::metadata::Metadata;
use crate::render::PageImage;
use crate::search::SearchMatch;
use crate::source::DocumentSource;

use super::{DocumentSession, OpenOptions};

/// Async handle to one [`DocumentSession`]. Calls run on the blocking pool and
/// take turns on the session, so results keep their page order no matter how
/// many clones issue requests.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<DocumentSession>>,
    page_count: usize,
    metadata: Arc<Metadata>,
}

impl SharedSession {
    pub async fn open(source: DocumentSource, options: OpenOptions) -> AppResult<Self> {
        let session = run_blocking(move || DocumentSession::open(source, options)).await?;
        Ok(Self::new(session))
    }

    pub fn new(session: DocumentSession) -> Self {
        Self {
            page_count: session.page_count(),
            metadata: Arc::new(session.metadata().clone()),
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub async fn get_page(&self, page: usize) -> AppResult<PageImage> {
        self.with_session(move |session| session.get_page(page))
            .await
    }

    pub async fn page_text(&self, page: usize) -> AppResult<String> {
        self.with_session(move |session| session.page_text(page))
            .await
    }

    pub async fn search(&self, query: impl Into<String>) -> AppResult<Vec<SearchMatch>> {
        let query = query.into();
        self.with_session(move |session| session.search(&query))
            .await
    }

    pub async fn search_page(
        &self,
        page: usize,
        query: impl Into<String>,
    ) -> AppResult<Vec<String>> {
        let query = query.into();
        self.with_session(move |session| {
            let handle = session.page_handle(page)?;
            session.search_in_page(&query, &handle)
        })
        .await
    }

    /// Renders pages one at a time as the stream is polled. The stream ends
    /// after the last page or the first failure and stays ended.
    pub fn pages(&self) -> impl Stream<Item = AppResult<PageImage>> + Send + 'static {
        let shared = self.clone();
        stream::unfold(Some(1_usize), move |next| {
            let shared = shared.clone();
            async move {
                let page = next?;
                if page > shared.page_count {
                    return None;
                }

                let result = shared.get_page(page).await;
                let next = result.is_ok().then_some(page + 1);
                Some((result, next))
            }
        })
        .fuse()
    }

    async fn with_session<T, F>(&self, job: F) -> AppResult<T>
    where
        F: FnOnce(&DocumentSession) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        run_blocking(move || {
            let session = inner
                .lock()
                .map_err(|_| AppError::session_unavailable("document session lock poisoned"))?;
            job(&*session)
        })
        .await
    }
}

async fn run_blocking<T, F>(job: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(job)
        .await
        .map_err(|err| AppError::session_unavailable(format!("blocking task failed: {err}")))?
}
