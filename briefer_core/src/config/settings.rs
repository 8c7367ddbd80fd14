use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub bridge: BridgeConfig,
    pub cors: CorsConfig,
}

/// Bind settings for the AI API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub basic_auth_username: String,
    pub basic_auth_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub default_model: String,
    pub use_azure: bool,
    pub azure_endpoint: String,
    pub azure_deployment: String,
    pub azure_api_version: String,
    pub bedrock_region: String,
    pub bedrock_api_key: String,
    pub request_timeout_seconds: u64,
}

/// The notebook file bridge. `base_url` mirrors the notebook host's base url
/// and always ends with a slash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            llm: LlmConfig::default(),
            bridge: BridgeConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            basic_auth_username: String::new(),
            basic_auth_password: String::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4o".to_string(),
            use_azure: false,
            azure_endpoint: String::new(),
            azure_deployment: String::new(),
            azure_api_version: String::new(),
            bedrock_region: "us-east-1".to_string(),
            bedrock_api_key: String::new(),
            request_timeout_seconds: 120,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            base_url: "/".to_string(),
            token: String::new(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

/// Unprefixed variables the deployment scripts already export, mapped onto
/// their nested keys.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("BASIC_AUTH_USERNAME", "auth.basic_auth_username"),
    ("BASIC_AUTH_PASSWORD", "auth.basic_auth_password"),
    ("OPENAI_API_KEY", "llm.openai_api_key"),
    ("OPENAI_DEFAULT_MODEL_NAME", "llm.default_model"),
    ("AZURE_OPENAI_ENDPOINT", "llm.azure_endpoint"),
    ("AZURE_DEPLOYMENT", "llm.azure_deployment"),
    ("AZURE_API_VERSION", "llm.azure_api_version"),
    ("AWS_REGION", "llm.bedrock_region"),
    ("AWS_BEARER_TOKEN_BEDROCK", "llm.bedrock_api_key"),
    ("JUPYTER_TOKEN", "bridge.token"),
    ("BASE_URL", "bridge.base_url"),
];

/// Truthiness used by the deployment scripts for flags such as `USE_AZURE`.
pub fn str_to_bool(value: Option<&str>) -> bool {
    match value {
        Some(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "t" | "y" | "yes"),
        None => false,
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?);

        if std::path::Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in LEGACY_ENV_KEYS {
            builder = builder.set_override_option(*key, env::var(var).ok())?;
        }

        if let Ok(port) = env::var("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Message(format!("Invalid PORT value: {}", port)))?;
            builder = builder.set_override("server.port", port)?;
        }

        if env::var("USE_AZURE").is_ok() {
            builder = builder.set_override(
                "llm.use_azure",
                str_to_bool(env::var("USE_AZURE").ok().as_deref()),
            )?;
        }

        let config = builder.build()?;
        let mut app_config: AppConfig = config.try_deserialize()?;

        if !app_config.bridge.base_url.ends_with('/') {
            app_config.bridge.base_url.push('/');
        }

        app_config.validate()?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port cannot be 0".to_string()));
        }

        if self.bridge.port == 0 {
            return Err(ConfigError::Message("Bridge port cannot be 0".to_string()));
        }

        if !self.bridge.base_url.starts_with('/') {
            return Err(ConfigError::Message(
                "Bridge base url must start with '/'".to_string(),
            ));
        }

        if self.llm.request_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "LLM request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The AI API refuses to start without basic auth credentials.
    pub fn validate_ai(&self) -> Result<(), ConfigError> {
        if self.auth.basic_auth_username.is_empty() || self.auth.basic_auth_password.is_empty() {
            return Err(ConfigError::Message(
                "BASIC_AUTH_USERNAME and BASIC_AUTH_PASSWORD must be set".to_string(),
            ));
        }

        if self.llm.use_azure
            && (self.llm.azure_endpoint.is_empty() || self.llm.azure_deployment.is_empty())
        {
            tracing::warn!("USE_AZURE is set but the Azure endpoint or deployment is empty");
        }

        Ok(())
    }

    pub fn validate_bridge(&self) -> Result<(), ConfigError> {
        if self.bridge.token.is_empty() {
            return Err(ConfigError::Message("JUPYTER_TOKEN must be set".to_string()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn bridge_bind_address(&self) -> String {
        format!("{}:{}", self.bridge.host, self.bridge.port)
    }
}
