pub mod artwork;
pub mod catalog;
pub mod config;
pub mod extractor;
pub mod metrics;
pub mod muxer;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod provisioner;
pub mod testing;

pub use artwork::{ArtworkError, ArtworkFetcher, HttpArtworkFetcher};
pub use catalog::{
    AccessToken, CatalogConfig, CatalogError, SpotifyCatalog, SpotifyConfig, TrackCatalog,
    TrackMetadata,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    ServerConfig,
};
pub use extractor::{
    ExtractionContext, ExtractionJob, ExtractionResult, Extractor, ExtractorConfig,
    ExtractorError, SourceReference, VideoMetadata, YtDlpExtractor,
};
pub use muxer::{EmbeddedTags, FfmpegMuxer, MuxJob, MuxResult, Muxer, MuxerConfig, MuxerError};
pub use pipeline::{
    Artifact, ArtifactInfo, FailureKind, PipelineConfig, PipelineDeps, PipelineError,
    PipelineRunner, RunHandle, RunLookupError, RunOutcome, RunStage, RunStatus,
};
pub use progress::{ProgressChannel, ProgressEvent, ProgressStream};
pub use provisioner::{
    CredentialRefresher, CredentialStore, CredentialsConfig, HttpToolInstaller, ProvisionError,
    ProvisionedTool, ReadyTools, ToolInstaller, ToolKind, ToolProvisioner, ToolsConfig,
};
