//! Source metadata lookup and audio extraction.
//!
//! The extractor resolves a [`SourceReference`] into a free-text catalog
//! query and pulls the audio track out of the source with an external tool.

mod config;
mod error;
mod traits;
mod types;
mod ytdlp;

pub use config::ExtractorConfig;
pub use error::ExtractorError;
pub use traits::Extractor;
pub use types::{
    ExtractionContext, ExtractionJob, ExtractionResult, SourceReference, VideoMetadata,
};
pub use ytdlp::{parse_progress_percent, YtDlpExtractor};
