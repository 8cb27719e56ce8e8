/// Popup UI: script editor and saved-script list
///
/// All changes go through the background's command protocol; the popup keeps
/// no state of its own beyond what is on screen.
use crate::chrome::{self, ChromeStorage, from_js};
use crate::config::ExtensionConfig;
use crate::coordinator::RunOutcome;
use crate::metadata::parse_script;
use crate::router::{Broadcast, Command, Response};
use crate::script_data::{NewScript, ScriptRecord};
use crate::storage::{Theme, load_theme, save_theme};
use crate::ui::script_card::ScriptCard;
use patternfly_yew::prelude::*;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{HtmlInputElement, HtmlTextAreaElement};
use yew::prelude::*;

/// Editor contents for a fresh script
pub const SCRIPT_TEMPLATE: &str = "// ==UserScript==
// @name        New Script
// @namespace   http://your-namespace.com
// @version     1.0
// @description Script description
// @match       *://*.example.com/*
// ==/UserScript==

(function() {
    'use strict';

    // Your code here

})();";

#[derive(Clone, PartialEq)]
enum PopupState {
    Idle,
    Loading(String),
    Error(String),
}

#[function_component(App)]
pub fn app() -> Html {
    let state = use_state(|| PopupState::Loading("Loading scripts...".to_string()));
    let scripts = use_state(Vec::<ScriptRecord>::new);
    let editor = use_state(|| SCRIPT_TEMPLATE.to_string());
    let editing = use_state(|| None::<(String, String)>); // script id, source
    let notice = use_state(|| None::<String>);
    let theme = use_state(Theme::default);

    // Load theme and scripts on mount, then follow background broadcasts
    {
        let state = state.clone();
        let scripts = scripts.clone();
        let theme = theme.clone();

        use_effect_with((), move |_| {
            spawn_local({
                let state = state.clone();
                let scripts = scripts.clone();
                async move {
                    let stored = load_theme(&ChromeStorage, &theme_key()).await;
                    apply_theme(stored);
                    theme.set(stored);

                    refresh(&scripts, &state).await;
                }
            });

            let on_broadcast = Closure::wrap(Box::new(move |message: JsValue| {
                match from_js::<Broadcast>(message) {
                    Ok(Broadcast::ScriptsUpdated { scripts: updated }) => scripts.set(updated),
                    Err(e) => log::debug!("Ignoring message: {}", e),
                }
            }) as Box<dyn FnMut(JsValue)>);
            chrome::onBroadcast(on_broadcast.as_ref().unchecked_ref());
            on_broadcast.forget();

            || ()
        });
    }

    let on_editor_input = {
        let editor = editor.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlTextAreaElement>() {
                editor.set(input.value());
            }
        })
    };

    // Save the editor contents as a new script
    let on_save = {
        let state = state.clone();
        let scripts = scripts.clone();
        let editor = editor.clone();
        let notice = notice.clone();

        Callback::from(move |_| {
            let source = (*editor).clone();
            if source.trim().is_empty() {
                state.set(PopupState::Error("Script cannot be empty!".to_string()));
                return;
            }

            let parsed = parse_script(&source);
            let name = parsed.name.clone();
            let command = Command::SaveScript {
                script: NewScript {
                    code: source,
                    name: Some(parsed.name),
                    matches: Some(
                        parsed
                            .directives
                            .get("match")
                            .map(|m| m.values().iter().map(|s| s.to_string()).collect())
                            .unwrap_or_default(),
                    ),
                    enabled: Some(true),
                },
            };

            let state = state.clone();
            let scripts = scripts.clone();
            let editor = editor.clone();
            let notice = notice.clone();
            state.set(PopupState::Loading("Saving script...".to_string()));

            spawn_local(async move {
                match send_command(command).await {
                    Ok(Response::Saved { script_id, .. }) => {
                        editor.set(SCRIPT_TEMPLATE.to_string());
                        let outcome = run_on_active_tab(script_id).await;
                        refresh(&scripts, &state).await;
                        match outcome {
                            Ok(outcome) => notice.set(Some(save_notice(&name, outcome))),
                            Err(e) => state.set(PopupState::Error(format!(
                                "{} saved but execution failed: {}",
                                name, e
                            ))),
                        }
                    }
                    Ok(_) => {
                        notice.set(Some(format!("{} saved!", name)));
                        refresh(&scripts, &state).await;
                    }
                    Err(e) => {
                        state.set(PopupState::Error(format!("Failed to save script: {}", e)));
                    }
                }
            });
        })
    };

    let on_toggle = {
        let state = state.clone();
        let scripts = scripts.clone();

        Callback::from(move |(script_id, enabled): (String, bool)| {
            let state = state.clone();
            let scripts = scripts.clone();
            spawn_local(async move {
                let result = run_command(Command::ToggleScript { script_id, enabled }).await;
                refresh(&scripts, &state).await;
                if let Err(e) = result {
                    state.set(PopupState::Error(format!("Toggle failed: {}", e)));
                }
            });
        })
    };

    let on_delete = {
        let state = state.clone();
        let scripts = scripts.clone();

        Callback::from(move |script_id: String| {
            let confirmed = web_sys::window()
                .and_then(|w| w.confirm_with_message("Delete this script permanently?").ok())
                .unwrap_or(false);
            if !confirmed {
                return;
            }

            let state = state.clone();
            let scripts = scripts.clone();
            spawn_local(async move {
                let result = run_command(Command::DeleteScript { script_id }).await;
                refresh(&scripts, &state).await;
                if let Err(e) = result {
                    state.set(PopupState::Error(format!("Delete failed: {}", e)));
                }
            });
        })
    };

    let on_edit = {
        let editing = editing.clone();
        Callback::from(move |script: ScriptRecord| {
            // Older records may lack the full source
            let source = if script.source.is_empty() {
                script.code
            } else {
                script.source
            };
            editing.set(Some((script.id, source)));
        })
    };

    let on_edit_input = {
        let editing = editing.clone();
        Callback::from(move |e: InputEvent| {
            if let (Some(input), Some((id, _))) =
                (e.target_dyn_into::<HtmlTextAreaElement>(), (*editing).clone())
            {
                editing.set(Some((id, input.value())));
            }
        })
    };

    let on_edit_save = {
        let editing = editing.clone();
        let state = state.clone();
        let scripts = scripts.clone();
        let notice = notice.clone();

        Callback::from(move |_| {
            let Some((script_id, code)) = (*editing).clone() else {
                return;
            };

            let editing = editing.clone();
            let state = state.clone();
            let scripts = scripts.clone();
            let notice = notice.clone();
            spawn_local(async move {
                match run_command(Command::UpdateScript { script_id, code }).await {
                    Ok(()) => {
                        editing.set(None);
                        notice.set(Some("Script updated!".to_string()));
                        refresh(&scripts, &state).await;
                    }
                    Err(e) => state.set(PopupState::Error(format!("Update failed: {}", e))),
                }
            });
        })
    };

    let on_edit_cancel = {
        let editing = editing.clone();
        Callback::from(move |_| editing.set(None))
    };

    let on_theme_change = {
        let theme = theme.clone();
        Callback::from(move |e: Event| {
            let Some(input) = e.target_dyn_into::<HtmlInputElement>() else {
                return;
            };
            let selected = if input.checked() { Theme::Dark } else { Theme::Light };
            apply_theme(selected);
            theme.set(selected);

            spawn_local(async move {
                if let Err(e) = save_theme(&ChromeStorage, &theme_key(), selected).await {
                    log::error!("Failed to save theme: {}", e);
                }
            });
        })
    };

    let is_busy = matches!(*state, PopupState::Loading(_));

    html! {
        <div class="padding-20">
            <div class="popup-header">
                <h1 class="popup-title">{"AlterPage"}</h1>
                <label class="theme-toggle">
                    <input
                        type="checkbox"
                        checked={*theme == Theme::Dark}
                        onchange={on_theme_change}
                    />
                    <span>{"Dark mode"}</span>
                </label>
            </div>

            // Status display
            {match &*state {
                PopupState::Loading(msg) => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{msg}</p>
                    </div>
                },
                PopupState::Error(err) => html! {
                    <div class="message-top-margin">
                        <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                            {err.clone()}
                        </Alert>
                    </div>
                },
                PopupState::Idle => html! {}
            }}

            if let Some(message) = (*notice).clone() {
                <Alert r#type={AlertType::Success} title={message} inline={true}>
                </Alert>
            }

            // Editor for a new script, or the script being edited
            {match (*editing).clone() {
                Some((_, source)) => html! {
                    <div class="flex-column-gap">
                        <h2 class="section-title">{"Edit script"}</h2>
                        <textarea class="script-editor" rows="14" value={source} oninput={on_edit_input} />
                        <Button onclick={on_edit_save} disabled={is_busy} variant={ButtonVariant::Primary} block={true}>
                            {"Save changes"}
                        </Button>
                        <Button onclick={on_edit_cancel} variant={ButtonVariant::Secondary} block={true}>
                            {"Cancel"}
                        </Button>
                    </div>
                },
                None => html! {
                    <div class="flex-column-gap">
                        <textarea class="script-editor" rows="14" value={(*editor).clone()} oninput={on_editor_input} />
                        <Button onclick={on_save} disabled={is_busy} variant={ButtonVariant::Primary} block={true}>
                            {"Save script"}
                        </Button>
                    </div>
                },
            }}

            <div class="saved-scripts">
                <h2 class="section-title">{"Saved scripts"}</h2>
                if scripts.is_empty() {
                    <div class="empty-state">
                        <p>{"No scripts found. Create one above!"}</p>
                    </div>
                } else {
                    {for scripts.iter().map(|script| html! {
                        <ScriptCard
                            key={script.id.clone()}
                            script={script.clone()}
                            on_toggle={on_toggle.clone()}
                            on_edit={on_edit.clone()}
                            on_delete={on_delete.clone()}
                            disabled={is_busy}
                        />
                    })}
                }
            </div>

            <p class="footer-popup">
                {"AlterPage v0.1.0"}
            </p>
        </div>
    }
}

// Helper functions

async fn send_command(command: Command) -> Result<Response, String> {
    match chrome::send_message::<_, Response>(&command).await? {
        Response::Error { error } => Err(error),
        reply => Ok(reply),
    }
}

async fn run_command(command: Command) -> Result<(), String> {
    send_command(command).await.map(|_| ())
}

/// Run a just-saved script on the active tab. `None` when there is no tab
/// to run it on.
async fn run_on_active_tab(script_id: String) -> Result<Option<RunOutcome>, String> {
    let Some((tab_id, url)) = chrome::active_tab().await? else {
        return Ok(None);
    };

    match send_command(Command::RunScript {
        script_id,
        tab_id,
        url,
    })
    .await?
    {
        Response::Ran { outcome } => match outcome {
            RunOutcome::Failed => Err("the page refused the script".to_string()),
            outcome => Ok(Some(outcome)),
        },
        _ => Err("Unexpected reply to runScript".to_string()),
    }
}

fn save_notice(name: &str, outcome: Option<RunOutcome>) -> String {
    match outcome {
        Some(RunOutcome::Executed) | Some(RunOutcome::AlreadyPresent) => {
            format!("{} saved & executed!", name)
        }
        Some(RunOutcome::NotMatched) => format!("{} saved (not executed - URL doesn't match)", name),
        Some(RunOutcome::Failed) | None => format!("{} saved!", name),
    }
}

async fn fetch_scripts() -> Result<Vec<ScriptRecord>, String> {
    match chrome::send_message::<_, Response>(&Command::GetScripts).await? {
        Response::Scripts(scripts) => Ok(scripts),
        Response::Error { error } => Err(error),
        _ => Err("Unexpected reply to getScripts".to_string()),
    }
}

async fn refresh(scripts: &UseStateHandle<Vec<ScriptRecord>>, state: &UseStateHandle<PopupState>) {
    match fetch_scripts().await {
        Ok(list) => {
            scripts.set(list);
            state.set(PopupState::Idle);
        }
        Err(e) => {
            scripts.set(Vec::new());
            state.set(PopupState::Error(format!("Failed to load scripts: {}", e)));
        }
    }
}

fn theme_key() -> String {
    ExtensionConfig::default().theme_key
}

fn apply_theme(theme: Theme) {
    if let Some(body) = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.body())
    {
        let _ = body.set_attribute("data-theme", theme.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_notice() {
        assert_eq!(
            save_notice("Demo", Some(RunOutcome::Executed)),
            "Demo saved & executed!"
        );
        assert_eq!(
            save_notice("Demo", Some(RunOutcome::NotMatched)),
            "Demo saved (not executed - URL doesn't match)"
        );
        assert_eq!(save_notice("Demo", None), "Demo saved!");
    }
}
