use yew::prelude::*;
use web_sys::{HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement};

use crate::models::ChatModel;

#[derive(Properties, PartialEq, Clone)]
pub struct SettingsProps {
    pub api_key: String,
    pub system_prompt: String,
    pub selected_model: String,
    pub models: Vec<ChatModel>,
    pub on_api_key: Callback<String>,
    pub on_system_prompt: Callback<String>,
    pub on_model: Callback<String>,
    pub on_close: Callback<()>,
    pub on_reset: Callback<()>,
}

#[function_component(SettingsPanel)]
pub fn settings_panel(props: &SettingsProps) -> Html {
    let reveal_key = use_state(|| false);

    // The key is committed on change so verification is not re-run per keystroke.
    let on_key_change = {
        let on_api_key = props.on_api_key.clone();
        Callback::from(move |e: Event| {
            let input: HtmlInputElement = e.target_unchecked_into();
            on_api_key.emit(input.value().trim().to_string());
        })
    };

    let on_prompt_change = {
        let on_system_prompt = props.on_system_prompt.clone();
        Callback::from(move |e: Event| {
            let input: HtmlTextAreaElement = e.target_unchecked_into();
            on_system_prompt.emit(input.value());
        })
    };

    let on_model_change = {
        let on_model = props.on_model.clone();
        Callback::from(move |e: Event| {
            let select: HtmlSelectElement = e.target_unchecked_into();
            on_model.emit(select.value());
        })
    };

    let toggle_reveal = {
        let reveal_key = reveal_key.clone();
        Callback::from(move |_: MouseEvent| reveal_key.set(!*reveal_key))
    };

    let css = r#"
        .settings-backdrop { position: absolute; top: 0; left: 0; width: 100%; height: 100%; background: rgba(255,255,255,0.6); backdrop-filter: blur(2px); z-index: 99; cursor: pointer; }
        .settings-panel { position: absolute; top: 60px; right: 20px; width: 360px; background: white; border: 1px solid var(--border-color); border-radius: 8px; box-shadow: 0 10px 15px -3px rgba(0, 0, 0, 0.1); padding: 20px; z-index: 100; display: flex; flex-direction: column; gap: 15px; }
        .settings-header { display: flex; justify-content: space-between; align-items: center; border-bottom: 1px solid var(--border-color); padding-bottom: 10px; margin-bottom: 5px; }
        .settings-header h3 { margin: 0; font-size: 1.1rem; }
        .form-label { display: block; font-size: 0.85rem; font-weight: 600; margin-bottom: 5px; color: var(--text-secondary); }
        .form-hint { font-size: 0.75rem; color: var(--text-secondary); margin-top: -5px; }
        .key-group { display: flex; gap: 8px; }
        .actions { margin-top: 10px; display: flex; flex-direction: column; gap: 8px; }
    "#;

    let model_options = if props.models.is_empty() {
        html! { <option value={props.selected_model.clone()} selected=true>{ &props.selected_model }</option> }
    } else {
        html! {
            for props.models.iter().map(|m| html! {
                <option value={m.model_name.clone()} selected={m.model_name == props.selected_model}>
                    { m.display_name() }
                </option>
            })
        }
    };

    let selected_description = props
        .models
        .iter()
        .find(|m| m.model_name == props.selected_model)
        .and_then(|m| m.description.clone());

    html! {
        <>
            <style>{ css }</style>
            <div class="settings-backdrop" onclick={props.on_close.reform(|_| ())}></div>

            <div class="settings-panel">
                <div class="settings-header">
                    <h3>{ "Settings" }</h3>
                    <button class="close-btn" onclick={props.on_close.reform(|_| ())} title="Close">{ "×" }</button>
                </div>

                <div>
                    <label class="form-label">{ "API Key" }</label>
                    <div class="key-group">
                        <input
                            class="form-input"
                            type={if *reveal_key { "text" } else { "password" }}
                            placeholder="Paste your API key"
                            autocomplete="off"
                            value={props.api_key.clone()}
                            onchange={on_key_change}
                            style="margin-bottom:0;"
                        />
                        <button class="btn" onclick={toggle_reveal} title="Show or hide the key">
                            { if *reveal_key { "Hide" } else { "Show" } }
                        </button>
                    </div>
                </div>
                <div class="form-hint">{ "Stored in this browser only. Changing it re-runs verification." }</div>

                <div>
                    <label class="form-label">{ "System Prompt" }</label>
                    <textarea class="form-textarea" value={props.system_prompt.clone()} onchange={on_prompt_change} style="height: 80px; resize: none;" />
                </div>

                <div>
                    <label class="form-label">{ "Model" }</label>
                    <select class="form-select" onchange={on_model_change}>
                        { model_options }
                    </select>
                    if let Some(description) = selected_description {
                        <div class="form-hint">{ description }</div>
                    }
                </div>

                <div class="actions">
                    <hr style="width: 100%; border: 0; border-top: 1px solid var(--border-color);" />
                    <button class="btn btn-danger" onclick={props.on_reset.reform(|_| ())}>{ "Reset Settings" }</button>
                </div>
            </div>
        </>
    }
}
