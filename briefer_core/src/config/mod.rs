pub mod settings;

pub use settings::{
    str_to_bool, AppConfig, AuthConfig, BridgeConfig, CorsConfig, LlmConfig, ServerConfig,
};
