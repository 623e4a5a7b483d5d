use log::LevelFilter;

pub const DEFAULT_API_BASE_URL: &str = "https://api.tinfoil.sh";
pub const DEFAULT_INFERENCE_PROXY_URL: &str = "https://inference.tinfoil.sh";
pub const DEFAULT_MODEL: &str = "gpt-oss-120b";
pub const DEFAULT_STORAGE_NAMESPACE: &str = "browser-integration-demo";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Sent in place of a real credential so that an unconfigured client fails
/// remote calls cleanly instead of going out unauthenticated.
pub const PLACEHOLDER_API_KEY: &str = "placeholder-key-not-yet-configured";

const MODELS_PATH: &str = "/api/app/models?paid=true";

/// Build-time configuration. The browser has no process environment, so the
/// values are baked in with `option_env!` when the bundle is compiled.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub api_base_url: String,
    pub inference_proxy_url: String,
    pub inference_proxy_repo: Option<String>,
    pub default_model: String,
    pub storage_namespace: String,
    pub log_level: LevelFilter,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_values(None, None, None, None, None, None)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_values(
            option_env!("API_BASE_URL"),
            option_env!("INFERENCE_PROXY_URL"),
            option_env!("INFERENCE_PROXY_REPO"),
            option_env!("DEFAULT_MODEL"),
            option_env!("STORAGE_NAMESPACE"),
            option_env!("LOG_LEVEL"),
        )
    }

    pub fn from_values(
        api_base_url: Option<&str>,
        inference_proxy_url: Option<&str>,
        inference_proxy_repo: Option<&str>,
        default_model: Option<&str>,
        storage_namespace: Option<&str>,
        log_level: Option<&str>,
    ) -> Self {
        let proxy = inference_proxy_url.unwrap_or(DEFAULT_INFERENCE_PROXY_URL);
        Self {
            api_base_url: api_base_url.unwrap_or(DEFAULT_API_BASE_URL).to_string(),
            inference_proxy_url: proxy.strip_suffix('/').unwrap_or(proxy).to_string(),
            inference_proxy_repo: inference_proxy_repo
                .map(str::trim)
                .filter(|repo| !repo.is_empty())
                .map(str::to_string),
            default_model: default_model
                .filter(|model| !model.trim().is_empty())
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
            storage_namespace: storage_namespace
                .unwrap_or(DEFAULT_STORAGE_NAMESPACE)
                .to_string(),
            log_level: log_level
                .and_then(|level| level.parse().ok())
                .unwrap_or(LevelFilter::Info),
        }
    }

    /// Full URL of the model catalog, or `None` when no base URL is configured.
    pub fn models_url(&self) -> Option<String> {
        let base = self.api_base_url.trim_end_matches('/');
        if base.is_empty() {
            None
        } else {
            Some(format!("{}{}", base, MODELS_PATH))
        }
    }

    pub fn storage_key(&self, name: &str) -> String {
        format!("{}:{}", self.storage_namespace, name)
    }
}
