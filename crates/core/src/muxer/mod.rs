//! Tag and cover-art embedding.

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::MuxerConfig;
pub use error::MuxerError;
pub use ffmpeg::FfmpegMuxer;
pub use traits::Muxer;
pub use types::{sanitize_file_stem, EmbeddedTags, MuxJob, MuxResult};
