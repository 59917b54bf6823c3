pub mod load;
pub mod types;

pub use load::{get_aiwhisper_data_dir, load_default, load_from_path};
pub use types::{
    AiCacheConfig, AiConfig, AiRetryConfig, AppConfig, LoggingConfig, OutputConfig, OutputFormat,
    StateConfig, WorkspaceConfig,
};
