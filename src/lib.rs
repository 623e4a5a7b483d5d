mod app;
mod components;
mod config;
mod controllers;
mod error;
mod logger;
mod models;
mod services;
mod session;
mod utils;

#[cfg(test)]
mod testing;

use wasm_bindgen::prelude::*;
use app::App;
use config::AppConfig;

#[wasm_bindgen(start)]
pub fn run_app() {
    utils::set_panic_hook();
    logger::init(AppConfig::from_env().log_level);
    log::info!("starting enclave chat");
    yew::Renderer::<App>::new().render();
}
