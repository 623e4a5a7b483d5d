use std::cell::RefCell;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;

use crate::config::AppConfig;
use crate::controllers::chat_session::ChatSessionController;
use crate::controllers::verification::VerificationController;
use crate::models::ChatModel;
use crate::services::client_factory::{http_connector, Connector, InferenceClientFactory};
use crate::services::model_catalog::{reconcile_selection, ModelCatalog};
use crate::services::settings::SettingsStore;
use crate::services::storage::{KeyValueStorage, LocalStorage};

/// Everything one page instance needs: settings, the client factory, and the
/// two controllers sharing it.
pub struct Session {
    pub config: AppConfig,
    pub settings: Rc<SettingsStore>,
    pub verification: VerificationController,
    pub chat: ChatSessionController,
    catalog: Rc<ModelCatalog>,
    models: Rc<RefCell<Vec<ChatModel>>>,
}

impl Session {
    pub fn new(config: AppConfig, storage: Rc<dyn KeyValueStorage>, connector: Connector) -> Self {
        let settings = Rc::new(SettingsStore::load(&config, storage));
        let factory = Rc::new(InferenceClientFactory::new(&config, settings.clone(), connector));
        Self {
            verification: VerificationController::new(factory.clone()),
            chat: ChatSessionController::new(settings.clone(), factory.clone()),
            catalog: Rc::new(ModelCatalog::new(&config)),
            models: Rc::new(RefCell::new(Vec::new())),
            config,
            settings,
        }
    }

    /// Browser session backed by `localStorage` and the HTTP client.
    pub fn browser(config: AppConfig) -> Self {
        Self::new(config, Rc::new(LocalStorage), http_connector())
    }

    /// Persists the key. When it actually changed, the client is rebuilt and
    /// verification re-run; the returned future drives that run.
    pub fn set_api_key(&self, value: &str) -> Option<LocalBoxFuture<'static, ()>> {
        if self.settings.api_key() == value {
            return None;
        }
        self.settings.set_api_key(value);
        Some(self.verification.refresh(true))
    }

    pub fn set_system_prompt(&self, value: &str) {
        self.settings.set_system_prompt(value);
    }

    pub fn set_selected_model(&self, value: &str) {
        self.settings.set_selected_model(value);
    }

    /// Fetches the catalog and settles the model selection against it.
    pub fn load_models(&self) -> LocalBoxFuture<'static, Vec<ChatModel>> {
        let settings = self.settings.clone();
        let default_model = self.config.default_model.clone();
        let catalog = self.catalog.clone();
        let loaded = self.models.clone();
        async move {
            let models = catalog.chat_models().await;
            let saved = settings.selected_model();
            let selection = reconcile_selection(&models, &saved, &default_model);
            if selection != saved {
                settings.set_selected_model(&selection);
            }
            *loaded.borrow_mut() = models.clone();
            models
        }
        .boxed_local()
    }

    /// Restores default settings, picks a model from the catalog already
    /// loaded, and rebuilds the client. The returned future drives the
    /// verification run for the new client.
    pub fn reset_settings(&self) -> LocalBoxFuture<'static, ()> {
        self.settings.reset();
        let selection = reconcile_selection(&self.models.borrow(), "", &self.config.default_model);
        self.settings.set_selected_model(&selection);
        self.verification.refresh(true)
    }

    /// Tears the session down; pending completions are dropped from here on.
    pub fn detach(&self) {
        self.chat.detach();
        self.verification.detach();
    }
}
