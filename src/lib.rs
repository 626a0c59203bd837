pub mod backend;
pub mod config;
pub mod error;
pub mod metadata;
pub mod render;
pub mod search;
pub mod session;
pub mod source;
pub mod surface;
pub mod text;

#[cfg(test)]
mod test_support;

pub use error::{AppError, AppResult};
pub use metadata::Metadata;
pub use render::PageImage;
pub use search::{SearchMatch, SearchMode};
pub use session::{DocumentSession, InitParams, OpenOptions, SharedSession};
pub use source::DocumentSource;
