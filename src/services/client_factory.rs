use std::cell::RefCell;
use std::rc::Rc;

use crate::config::{AppConfig, PLACEHOLDER_API_KEY};
use crate::models::Settings;
use crate::services::inference::{ClientConfig, HttpInferenceClient, InferenceClient};
use crate::services::settings::SettingsStore;

pub type ClientHandle = Rc<dyn InferenceClient>;

/// Builds a client for a given configuration.
pub type Connector = Box<dyn Fn(&ClientConfig) -> ClientHandle>;

pub fn http_connector() -> Connector {
    Box::new(|config: &ClientConfig| Rc::new(HttpInferenceClient::new(config.clone())) as ClientHandle)
}

struct BoundClient {
    api_key: String,
    client: ClientHandle,
}

/// Owns the single live client handle. A handle is bound to the API key it
/// was built with and is replaced as soon as that key changes.
pub struct InferenceClientFactory {
    base_url: String,
    config_repo: Option<String>,
    settings: Rc<SettingsStore>,
    connector: Connector,
    current: RefCell<Option<BoundClient>>,
}

impl InferenceClientFactory {
    pub fn new(config: &AppConfig, settings: Rc<SettingsStore>, connector: Connector) -> Self {
        Self {
            base_url: config.inference_proxy_url.clone(),
            config_repo: config.inference_proxy_repo.clone(),
            settings,
            connector,
            current: RefCell::new(None),
        }
    }

    /// An empty key is replaced by a placeholder that every remote call rejects.
    pub fn client_config(&self, api_key: &str) -> ClientConfig {
        let trimmed = api_key.trim();
        ClientConfig {
            base_url: self.base_url.clone(),
            config_repo: self.config_repo.clone(),
            api_key: if trimmed.is_empty() {
                PLACEHOLDER_API_KEY.to_string()
            } else {
                trimmed.to_string()
            },
        }
    }

    /// Builds a new handle for `settings` and installs it, discarding the
    /// previous one. Requests already running on the old handle are left alone.
    pub fn create(&self, settings: &Settings) -> ClientHandle {
        let client = (self.connector)(&self.client_config(&settings.api_key));
        log::info!("inference client created for {}", self.base_url);
        *self.current.borrow_mut() = Some(BoundClient {
            api_key: settings.api_key.clone(),
            client: client.clone(),
        });
        client
    }

    pub fn get_or_create(&self) -> ClientHandle {
        let settings = self.settings.settings();
        if let Some(bound) = self.current.borrow().as_ref() {
            if bound.api_key == settings.api_key {
                return bound.client.clone();
            }
        }
        self.create(&settings)
    }

    /// Unconditionally rebuilds the handle from the current settings.
    pub fn reinitialize(&self) -> ClientHandle {
        self.create(&self.settings.settings())
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<ClientHandle> {
        self.current.borrow().as_ref().map(|bound| bound.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{settings_store, MockConnector};

    fn factory(connector: &MockConnector, settings: Rc<SettingsStore>) -> InferenceClientFactory {
        InferenceClientFactory::new(&AppConfig::default(), settings, connector.connector())
    }

    #[test]
    fn reuses_handle_while_key_is_unchanged() {
        let connector = MockConnector::default();
        let settings = settings_store("key-1");
        let factory = factory(&connector, settings);

        let first = factory.get_or_create();
        let second = factory.get_or_create();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(connector.built(), 1);
    }

    #[test]
    fn key_change_builds_a_new_handle() {
        let connector = MockConnector::default();
        let settings = settings_store("key-1");
        let factory = factory(&connector, settings.clone());

        let first = factory.get_or_create();
        settings.set_api_key("key-2");
        let second = factory.get_or_create();

        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(connector.configs()[1].api_key, "key-2");
        assert!(Rc::ptr_eq(&factory.current().unwrap(), &second));
    }

    #[test]
    fn empty_key_gets_placeholder_credential() {
        let connector = MockConnector::default();
        let factory = factory(&connector, settings_store("  "));

        factory.get_or_create();
        let config = &connector.configs()[0];
        assert_eq!(config.api_key, PLACEHOLDER_API_KEY);
        assert_eq!(config.base_url, "https://inference.tinfoil.sh");
        assert_eq!(config.config_repo, None);
    }

    #[test]
    fn reinitialize_always_rebuilds() {
        let connector = MockConnector::default();
        let factory = factory(&connector, settings_store("key"));

        let first = factory.get_or_create();
        let second = factory.reinitialize();
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(connector.built(), 2);
    }
}
