pub mod client_factory;
pub mod inference;
pub mod model_catalog;
pub mod settings;
pub mod storage;
