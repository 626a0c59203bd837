use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{AppError, AppResult};

const PDF_HEADER: &[u8] = b"%PDF-";

/// Where the document bytes come from.
pub enum DocumentSource {
    Path(PathBuf),
    Bytes(Arc<Vec<u8>>),
    DataUrl(String),
    Reader(Box<dyn Read + Send>),
}

impl std::fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::DataUrl(url) => write!(f, "DataUrl({} chars)", url.len()),
            Self::Reader(_) => f.write_str("Reader"),
        }
    }
}

impl DocumentSource {
    /// `-` reads stdin, `data:` URLs are decoded, anything else is a path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::Reader(Box::new(std::io::stdin()))
        } else if arg.starts_with("data:") {
            Self::DataUrl(arg.to_string())
        } else {
            Self::Path(PathBuf::from(arg))
        }
    }

    pub fn resolve(self) -> AppResult<Arc<Vec<u8>>> {
        let bytes = match self {
            Self::Path(path) => Arc::new(read_path(&path)?),
            Self::Bytes(bytes) => bytes,
            Self::DataUrl(url) => Arc::new(decode_data_url(&url)?),
            Self::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).map_err(|source| {
                    AppError::io_with_context(source, "failed to read pdf stream")
                })?;
                Arc::new(buf)
            }
        };

        if !bytes.as_slice().starts_with(PDF_HEADER) {
            return Err(AppError::parse("input is not a valid PDF header"));
        }

        Ok(bytes)
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for DocumentSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for DocumentSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Arc::new(bytes))
    }
}

impl From<Arc<Vec<u8>>> for DocumentSource {
    fn from(bytes: Arc<Vec<u8>>) -> Self {
        Self::Bytes(bytes)
    }
}

fn read_path(path: &Path) -> AppResult<Vec<u8>> {
    if path.as_os_str().is_empty() {
        return Err(AppError::invalid_argument("pdf path must not be empty"));
    }
    if !path.exists() {
        return Err(AppError::io_with_context(
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing file"),
            format!("pdf file not found: {}", path.display()),
        ));
    }
    if !path.is_file() {
        return Err(AppError::invalid_argument(
            "pdf path must be a regular file",
        ));
    }

    std::fs::read(path).map_err(|source| {
        AppError::io_with_context(source, format!("failed to read pdf: {}", path.display()))
    })
}

fn decode_data_url(url: &str) -> AppResult<Vec<u8>> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Err(AppError::invalid_argument("data url must start with `data:`"));
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(AppError::invalid_argument("data url is missing a `,` separator"));
    };

    if header.split(';').any(|param| param.eq_ignore_ascii_case("base64")) {
        let compact: String = payload.chars().filter(|ch| !ch.is_whitespace()).collect();
        return STANDARD
            .decode(compact)
            .map_err(|err| AppError::invalid_argument(format!("invalid base64 data url: {err}")));
    }

    Ok(payload.as_bytes().to_vec())
}
