use anyhow::{bail, Result};
use reqwest::Client;

use crate::config::AppConfig;
use crate::models::ChatModel;

/// Remote list of models offered by the inference service.
pub struct ModelCatalog {
    models_url: Option<String>,
}

impl ModelCatalog {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            models_url: config.models_url(),
        }
    }

    async fn fetch_models(url: &str) -> Result<Vec<ChatModel>> {
        let client = Client::new();
        let resp = client.get(url).send().await?;
        if !resp.status().is_success() {
            bail!("failed to fetch models: {}", resp.status());
        }
        let models = resp.json::<Vec<ChatModel>>().await?;
        Ok(models)
    }

    /// Chat-capable models, or an empty list when the catalog is unreachable.
    pub async fn chat_models(&self) -> Vec<ChatModel> {
        let url = match &self.models_url {
            Some(url) => url,
            None => {
                log::warn!("no model catalog base URL configured");
                return Vec::new();
            }
        };

        match Self::fetch_models(url).await {
            Ok(models) => filter_chat_models(models),
            Err(e) => {
                log::error!("unable to load model list: {:#}", e);
                Vec::new()
            }
        }
    }
}

pub fn filter_chat_models(models: Vec<ChatModel>) -> Vec<ChatModel> {
    models.into_iter().filter(ChatModel::is_chat_capable).collect()
}

/// Picks the model to use once the catalog is known: the saved choice if the
/// catalog still offers it, then the configured default, then the first entry.
pub fn reconcile_selection(models: &[ChatModel], saved: &str, default_model: &str) -> String {
    let offered = |name: &str| models.iter().any(|model| model.model_name == name);

    if models.is_empty() {
        return if saved.is_empty() { default_model.to_string() } else { saved.to_string() };
    }
    if !saved.is_empty() && offered(saved) {
        return saved.to_string();
    }
    if offered(default_model) {
        return default_model.to_string();
    }
    models[0].model_name.clone()
}
