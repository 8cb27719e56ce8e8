/// One saved script in the popup list
use crate::script_data::ScriptRecord;
use patternfly_yew::prelude::*;
use web_sys::HtmlInputElement;
use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct ScriptCardProps {
    pub script: ScriptRecord,
    pub on_toggle: Callback<(String, bool)>,
    pub on_edit: Callback<ScriptRecord>,
    pub on_delete: Callback<String>,
    #[prop_or(false)]
    pub disabled: bool,
}

#[function_component(ScriptCard)]
pub fn script_card(props: &ScriptCardProps) -> Html {
    let script = &props.script;

    let on_change = {
        let on_toggle = props.on_toggle.clone();
        let id = script.id.clone();
        Callback::from(move |e: Event| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                on_toggle.emit((id.clone(), input.checked()));
            }
        })
    };

    let on_edit = {
        let on_edit = props.on_edit.clone();
        let script = script.clone();
        Callback::from(move |_: MouseEvent| on_edit.emit(script.clone()))
    };

    let on_delete = {
        let on_delete = props.on_delete.clone();
        let id = script.id.clone();
        Callback::from(move |_: MouseEvent| on_delete.emit(id.clone()))
    };

    // Show what the user wrote, not the translated regexes
    let patterns: Vec<&str> = script
        .meta
        .get("match")
        .map(|value| value.values())
        .unwrap_or_else(|| script.matches.iter().map(String::as_str).collect());

    html! {
        <div class="script-card">
            <div class="script-header">
                <label>
                    <input
                        type="checkbox"
                        checked={script.enabled}
                        disabled={props.disabled}
                        onchange={on_change}
                    />
                    <span class="script-name">{&script.name}</span>
                </label>
                <div class="script-actions">
                    <Button onclick={on_edit} disabled={props.disabled} variant={ButtonVariant::Secondary}>
                        {"Edit"}
                    </Button>
                    <Button onclick={on_delete} disabled={props.disabled} variant={ButtonVariant::Danger}>
                        {"Delete"}
                    </Button>
                </div>
            </div>
            <div class="script-matches">
                {for patterns.iter().map(|pattern| html! {
                    <span class="match-pill">{pattern.to_string()}</span>
                })}
            </div>
        </div>
    }
}
