use std::cell::RefCell;
use std::rc::Rc;

use crate::config::AppConfig;
use crate::controllers::observable::{SubscriptionId, Subscribers};
use crate::models::Settings;
use crate::services::storage::KeyValueStorage;

const KEY_API_KEY: &str = "api-key";
const KEY_SYSTEM_PROMPT: &str = "system-prompt";
const KEY_MODEL_NAME: &str = "model-name";

/// Process-wide user settings, written through to durable storage on every
/// change. The in-memory copy is authoritative when storage fails.
pub struct SettingsStore {
    storage: Rc<dyn KeyValueStorage>,
    api_key_key: String,
    system_prompt_key: String,
    model_name_key: String,
    current: RefCell<Settings>,
    subscribers: Subscribers<Settings>,
}

impl SettingsStore {
    /// Hydrates from storage, falling back to defaults for every key that is
    /// missing or unreadable.
    pub fn load(config: &AppConfig, storage: Rc<dyn KeyValueStorage>) -> Self {
        let store = Self {
            storage,
            api_key_key: config.storage_key(KEY_API_KEY),
            system_prompt_key: config.storage_key(KEY_SYSTEM_PROMPT),
            model_name_key: config.storage_key(KEY_MODEL_NAME),
            current: RefCell::new(Settings::default()),
            subscribers: Subscribers::default(),
        };

        let mut settings = Settings::default();
        if let Some(api_key) = store.read(&store.api_key_key) {
            settings.api_key = api_key;
        }
        if let Some(prompt) = store.read(&store.system_prompt_key) {
            if !prompt.is_empty() {
                settings.system_prompt = prompt;
            }
        }
        if let Some(model) = store.read(&store.model_name_key) {
            settings.selected_model_name = model;
        }
        *store.current.borrow_mut() = settings;
        store
    }

    pub fn settings(&self) -> Settings {
        self.current.borrow().clone()
    }

    pub fn api_key(&self) -> String {
        self.current.borrow().api_key.clone()
    }

    pub fn selected_model(&self) -> String {
        self.current.borrow().selected_model_name.clone()
    }

    pub fn set_api_key(&self, value: &str) {
        self.current.borrow_mut().api_key = value.to_string();
        self.write(&self.api_key_key, value);
        self.announce();
    }

    pub fn set_system_prompt(&self, value: &str) {
        self.current.borrow_mut().system_prompt = value.to_string();
        self.write(&self.system_prompt_key, value);
        self.announce();
    }

    pub fn set_selected_model(&self, value: &str) {
        self.current.borrow_mut().selected_model_name = value.to_string();
        self.write(&self.model_name_key, value);
        self.announce();
    }

    /// Restores defaults and drops every persisted key.
    pub fn reset(&self) {
        *self.current.borrow_mut() = Settings::default();
        for key in [&self.api_key_key, &self.system_prompt_key, &self.model_name_key] {
            if let Err(e) = self.storage.remove(key) {
                log::warn!("could not remove {}: {}", key, e);
            }
        }
        self.announce();
    }

    pub fn subscribe(&self, listener: impl Fn(&Settings) + 'static) -> SubscriptionId {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id);
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("could not read {}: {}", key, e);
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            log::warn!("could not persist {}: {}", key, e);
        }
    }

    fn announce(&self) {
        let snapshot = self.settings();
        self.subscribers.notify(&snapshot);
    }
}
