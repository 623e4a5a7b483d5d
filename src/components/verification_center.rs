use yew::prelude::*;

use crate::controllers::verification::{VerificationSnapshot, VerificationStatus};

/// Typed stand-in for the attestation display widget: the document arrives as
/// a property, closing and on-demand fetches leave through callbacks.
#[derive(Properties, PartialEq)]
pub struct VerificationCenterProps {
    pub snapshot: VerificationSnapshot,
    pub on_close: Callback<()>,
    pub on_request_document: Callback<()>,
}

#[function_component(VerificationCenter)]
pub fn verification_center(props: &VerificationCenterProps) -> Html {
    let css = r#"
        .verifier-backdrop { position: absolute; top: 0; left: 0; width: 100%; height: 100%; background: rgba(255,255,255,0.6); backdrop-filter: blur(2px); z-index: 99; cursor: pointer; }
        .verifier-panel { position: absolute; top: 60px; right: 20px; width: 440px; max-height: 75vh; overflow-y: auto; background: white; border: 1px solid var(--border-color); border-radius: 8px; box-shadow: 0 10px 15px -3px rgba(0, 0, 0, 0.1); padding: 20px; z-index: 100; display: flex; flex-direction: column; gap: 12px; }
        .verifier-header { display: flex; justify-content: space-between; align-items: center; border-bottom: 1px solid var(--border-color); padding-bottom: 10px; }
        .verifier-header h3 { margin: 0; font-size: 1.1rem; }
        .doc-row { display: flex; flex-direction: column; gap: 3px; }
        .doc-row span:first-child { font-size: 0.75rem; font-weight: 600; text-transform: uppercase; color: var(--text-secondary); }
        .doc-body { font-family: monospace; font-size: 0.75rem; background: #f4f4f4; padding: 8px; border-radius: 6px; max-height: 180px; overflow: auto; overflow-wrap: anywhere; white-space: pre-wrap; }
        .verifier-error { color: var(--danger-color); font-size: 0.85rem; }
    "#;

    let snapshot = &props.snapshot;

    let content = match (&snapshot.document, snapshot.status) {
        (_, VerificationStatus::Loading) if snapshot.document.is_none() => html! {
            <div>{ "Fetching the enclave attestation..." }</div>
        },
        (Some(doc), _) => html! {
            <>
                <div class="doc-row">
                    <span>{ "Enclave" }</span>
                    <span>{ &doc.enclave_host }</span>
                </div>
                <div class="doc-row">
                    <span>{ "Config repository" }</span>
                    <span>{ doc.config_repo.clone().unwrap_or_else(|| "not set".to_string()) }</span>
                </div>
                <div class="doc-row">
                    <span>{ "Format" }</span>
                    <span>{ &doc.format }</span>
                </div>
                <div class="doc-row">
                    <span>{ "Attestation" }</span>
                    <div class="doc-body">{ &doc.body }</div>
                </div>
            </>
        },
        (None, _) => html! {
            <div>{ "No attestation document is available yet." }</div>
        },
    };

    let busy = snapshot.status == VerificationStatus::Loading;

    html! {
        <>
            <style>{ css }</style>
            <div class="verifier-backdrop" onclick={props.on_close.reform(|_| ())}></div>

            <div class="verifier-panel" role="dialog">
                <div class="verifier-header">
                    <h3>{ snapshot.status.label() }</h3>
                    <button class="close-btn" onclick={props.on_close.reform(|_| ())} title="Close">{ "×" }</button>
                </div>

                { content }

                if let Some(error) = &snapshot.error {
                    <div class="verifier-error">{ error }</div>
                }

                <button class="btn" disabled={busy} onclick={props.on_request_document.reform(|_| ())}>
                    { if snapshot.status == VerificationStatus::Error { "Retry verification" } else { "Request document" } }
                </button>
            </div>
        </>
    }
}
