use yew::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::components::{chat_area::ChatArea, settings::SettingsPanel, verification_center::VerificationCenter};
use crate::config::AppConfig;
use crate::controllers::verification::VerificationStatus;
use crate::session::Session;

const GLOBAL_STYLES: &str = r#"
    :root {
        --bg-app: #ffffff;
        --border-color: #e5e5e5;
        --text-primary: #333;
        --text-secondary: #666;
        --accent-color: #10a37f;
        --accent-hover: #1a7f64;
        --danger-color: #ef4444;
        --warning-color: #d97706;
    }

    * { box-sizing: border-box; }
    body { margin: 0; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif; color: var(--text-primary); }

    .app-container { display: flex; height: 100vh; overflow: hidden; }
    .main-content { flex-grow: 1; display: flex; flex-direction: column; position: relative; background: var(--bg-app); }
    .header { padding: 10px 20px; border-bottom: 1px solid var(--border-color); display: flex; justify-content: space-between; align-items: center; height: 60px; gap: 10px; }
    .header h2 { font-size: 1rem; margin: 0; font-weight: 600; overflow: hidden; white-space: nowrap; text-overflow: ellipsis; max-width: 500px; }
    .header-actions { display: flex; gap: 8px; align-items: center; }

    .btn { cursor: pointer; border: 1px solid var(--border-color); background: white; padding: 8px 12px; border-radius: 6px; font-size: 0.9rem; transition: all 0.2s; color: var(--text-primary); }
    .btn:hover { background: #f0f0f0; }
    .btn:disabled { opacity: 0.6; cursor: default; }
    .btn-danger { color: var(--danger-color); border-color: var(--danger-color); }
    .btn-danger:hover { background: #fef2f2; }
    .btn-icon { border: none; background: transparent; font-size: 1.2rem; padding: 5px; color: var(--text-secondary); cursor: pointer; }
    .btn-icon:hover { background: rgba(0,0,0,0.05); color: var(--text-primary); }
    .close-btn { background: none; border: none; font-size: 1.5rem; line-height: 1; cursor: pointer; color: var(--text-secondary); padding: 0 5px; }
    .close-btn:hover { color: var(--text-primary); }

    .verify-btn { display: flex; align-items: center; gap: 6px; font-size: 0.85rem; }
    .verify-btn .dot { width: 8px; height: 8px; border-radius: 50%; background: var(--text-secondary); }
    .verify-btn.loading .dot { background: var(--warning-color); }
    .verify-btn.success .dot { background: var(--accent-color); }
    .verify-btn.error { color: var(--danger-color); border-color: var(--danger-color); }
    .verify-btn.error .dot { background: var(--danger-color); }

    .form-input, .form-select, .form-textarea { width: 100%; padding: 8px; border: 1px solid var(--border-color); border-radius: 6px; font-family: inherit; margin-bottom: 10px; }
    .form-input:focus, .form-textarea:focus { outline: 2px solid var(--accent-color); border-color: transparent; }

    .markdown-body { line-height: 1.6; font-size: 1rem; }
    .markdown-body pre { background: #2d2d2d; color: #fff; padding: 15px; border-radius: 6px; overflow-x: auto; }
    .markdown-body code { background: #f4f4f4; padding: 2px 4px; border-radius: 4px; font-family: monospace; font-size: 0.9em; }
    .markdown-body pre code { background: transparent; color: inherit; }
    .markdown-body p { margin-top: 0; margin-bottom: 1em; }
"#;

fn status_class(status: VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::Idle => "idle",
        VerificationStatus::Loading => "loading",
        VerificationStatus::Success => "success",
        VerificationStatus::Error => "error",
    }
}

#[function_component(App)]
pub fn app() -> Html {
    let session = use_memo((), |_| Session::browser(AppConfig::from_env()));

    let chat = use_state(|| session.chat.snapshot());
    let verification = use_state(|| session.verification.snapshot());
    let settings = use_state(|| session.settings.settings());
    let models = use_state(Vec::new);

    let show_settings = use_state(|| false);
    let show_verifier = use_state(|| false);

    // --- EFFECTS ---

    // Mirror controller state into the component, start verification and the
    // catalog fetch, and tear everything down on unmount.
    {
        let session = session.clone();
        let chat = chat.clone();
        let verification = verification.clone();
        let settings = settings.clone();
        let models = models.clone();
        use_effect_with((), move |_| {
            let chat_sub = session.chat.subscribe(move |snapshot| chat.set(snapshot.clone()));
            let verification_sub = session
                .verification
                .subscribe(move |snapshot| verification.set(snapshot.clone()));
            let settings_sub = session.settings.subscribe(move |current| settings.set(current.clone()));

            spawn_local(session.verification.refresh(false));

            let load_models = session.load_models();
            spawn_local(async move {
                let fetched = load_models.await;
                log::debug!("model catalog offers {} chat models", fetched.len());
                models.set(fetched);
            });

            move || {
                session.chat.unsubscribe(chat_sub);
                session.verification.unsubscribe(verification_sub);
                session.settings.unsubscribe(settings_sub);
                session.detach();
            }
        });
    }

    // --- ACTIONS ---

    let on_send = {
        let session = session.clone();
        Callback::from(move |text: String| {
            let turn = session.chat.send_message(&text);
            spawn_local(async move {
                let outcome = turn.await;
                log::debug!("turn finished: {:?}", outcome);
            });
        })
    };

    let on_stop = {
        let session = session.clone();
        Callback::from(move |_: ()| session.chat.cancel())
    };

    let on_dismiss_error = {
        let session = session.clone();
        Callback::from(move |_: ()| session.chat.dismiss_error())
    };

    let on_api_key = {
        let session = session.clone();
        Callback::from(move |key: String| {
            if let Some(refresh) = session.set_api_key(&key) {
                spawn_local(refresh);
            }
        })
    };

    let on_system_prompt = {
        let session = session.clone();
        Callback::from(move |prompt: String| session.set_system_prompt(&prompt))
    };

    let on_model = {
        let session = session.clone();
        Callback::from(move |model: String| session.set_selected_model(&model))
    };

    let on_reset_settings = {
        let session = session.clone();
        Callback::from(move |_: ()| {
            let confirmed = web_sys::window()
                .map_or(false, |w| w.confirm_with_message("Reset all settings to default?").unwrap_or(false));
            if confirmed {
                spawn_local(session.reset_settings());
            }
        })
    };

    let toggle_verifier = {
        let session = session.clone();
        let show_verifier = show_verifier.clone();
        Callback::from(move |_: MouseEvent| {
            let opening = !*show_verifier;
            if opening {
                if let Some(retry) = session.verification.retry_if_failed() {
                    spawn_local(retry);
                }
            }
            show_verifier.set(opening);
        })
    };

    let close_verifier = {
        let show_verifier = show_verifier.clone();
        Callback::from(move |_: ()| show_verifier.set(false))
    };

    let on_request_document = {
        let session = session.clone();
        Callback::from(move |_: ()| {
            let request = session.verification.request_document();
            spawn_local(async move {
                if request.await.is_none() {
                    log::warn!("attestation document requested but none is available");
                }
            });
        })
    };

    let close_settings = {
        let show_settings = show_settings.clone();
        Callback::from(move |_: ()| show_settings.set(false))
    };

    let toggle_settings = show_settings.clone();

    let model_title = models
        .iter()
        .find(|m| m.model_name == settings.selected_model_name)
        .map(|m| m.display_name().to_string())
        .unwrap_or_else(|| settings.selected_model_name.clone());

    html! {
        <>
            <style>{ GLOBAL_STYLES }</style>
            <div class="app-container">
                <div class="main-content">
                    <div class="header">
                        <h2>{ &model_title }</h2>
                        <div class="header-actions">
                            <button
                                class={classes!("btn", "verify-btn", status_class(verification.status))}
                                title={verification.tooltip()}
                                onclick={toggle_verifier}
                            >
                                <span class="dot"></span>
                                { verification.status.label() }
                            </button>
                            <button class="btn-icon" onclick={Callback::from(move |_| toggle_settings.set(!*toggle_settings))} title="Settings">
                                <svg width="24" height="24" viewBox="0 0 24 24" fill="none" stroke="currentColor" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"><circle cx="12" cy="12" r="3"></circle><path d="M19.4 15a1.65 1.65 0 0 0 .33 1.82l.06.06a2 2 0 0 1 0 2.83 2 2 0 0 1-2.83 0l-.06-.06a1.65 1.65 0 0 0-1.82-.33 1.65 1.65 0 0 0-1 1.51V21a2 2 0 0 1-2 2 2 2 0 0 1-2-2v-.09A1.65 1.65 0 0 0 9 19.4a1.65 1.65 0 0 0-1.82.33l-.06.06a2 2 0 0 1-2.83 0 2 2 0 0 1 0-2.83l.06-.06a1.65 1.65 0 0 0 .33-1.82 1.65 1.65 0 0 0-1.51-1H3a2 2 0 0 1-2-2 2 2 0 0 1 2-2h.09A1.65 1.65 0 0 0 4.6 9a1.65 1.65 0 0 0-.33-1.82l-.06-.06a2 2 0 0 1 0-2.83 2 2 0 0 1 2.83 0l.06.06a1.65 1.65 0 0 0 1.82.33H9a1.65 1.65 0 0 0 1-1.51V3a2 2 0 0 1 2-2 2 2 0 0 1 2 2v.09a1.65 1.65 0 0 0 1 1.51 1.65 1.65 0 0 0 1.82-.33l.06-.06a2 2 0 0 1 2.83 0 2 2 0 0 1 0 2.83l-.06.06a1.65 1.65 0 0 0-.33 1.82V9a1.65 1.65 0 0 0 1.51 1H21a2 2 0 0 1 2 2 2 2 0 0 1-2 2h-.09a1.65 1.65 0 0 0-1.51 1z"></path></svg>
                            </button>
                        </div>
                    </div>

                    if *show_settings {
                        <SettingsPanel
                            api_key={settings.api_key.clone()}
                            system_prompt={settings.system_prompt.clone()}
                            selected_model={settings.selected_model_name.clone()}
                            models={(*models).clone()}
                            on_api_key={on_api_key}
                            on_system_prompt={on_system_prompt}
                            on_model={on_model}
                            on_close={close_settings}
                            on_reset={on_reset_settings}
                        />
                    }

                    if *show_verifier {
                        <VerificationCenter
                            snapshot={(*verification).clone()}
                            on_close={close_verifier}
                            on_request_document={on_request_document}
                        />
                    }

                    <ChatArea
                        messages={chat.messages.clone()}
                        is_streaming={chat.is_streaming}
                        stream_error={chat.stream_error.clone()}
                        model_name={model_title.clone()}
                        on_send={on_send}
                        on_stop={on_stop}
                        on_dismiss_error={on_dismiss_error}
                    />
                </div>
            </div>
        </>
    }
}
