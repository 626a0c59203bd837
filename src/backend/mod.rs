use std::sync::Arc;

use crate::error::AppResult;
use crate::metadata::Metadata;
use crate::session::Background;

mod hayro;
mod preflight;
mod traits;

pub use hayro::HayroBackend;
pub use preflight::{Preflight, preflight};
pub use traits::{PageHandle, PdfBackend};
pub(crate) use traits::check_page;

pub struct OpenedDocument {
    pub backend: Box<dyn PdfBackend>,
    pub metadata: Metadata,
    pub encrypted: bool,
}

pub fn open_default_backend(
    bytes: Arc<Vec<u8>>,
    password: Option<&str>,
    background: Background,
) -> AppResult<OpenedDocument> {
    let Preflight {
        bytes,
        info,
        encrypted,
    } = preflight(bytes, password)?;
    let backend = HayroBackend::open(bytes, background)?;

    Ok(OpenedDocument {
        backend: Box::new(backend),
        metadata: Metadata::from_raw(info),
        encrypted,
    })
}
