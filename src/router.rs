/// Command protocol between the popup and the background service worker
use crate::coordinator::{BadgeSink, InjectionCoordinator, RunOutcome, TabId};
use crate::error::StoreResult;
use crate::injector::PageExecutor;
use crate::script_data::{NewScript, ScriptRecord};
use crate::storage::{Notifier, StorageArea};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    SaveScript {
        script: NewScript,
    },
    GetScripts,
    ToggleScript {
        #[serde(rename = "scriptId")]
        script_id: String,
        enabled: bool,
    },
    DeleteScript {
        #[serde(rename = "scriptId")]
        script_id: String,
    },
    UpdateScript {
        #[serde(rename = "scriptId")]
        script_id: String,
        code: String,
    },
    /// Run a saved script in a tab now
    RunScript {
        #[serde(rename = "scriptId")]
        script_id: String,
        #[serde(rename = "tabId")]
        tab_id: TabId,
        url: String,
    },
}

impl Command {
    /// Every `action` tag the router understands
    pub const ACTIONS: [&'static str; 6] = [
        "saveScript",
        "getScripts",
        "toggleScript",
        "deleteScript",
        "updateScript",
        "runScript",
    ];

    pub fn action(&self) -> &'static str {
        match self {
            Command::SaveScript { .. } => "saveScript",
            Command::GetScripts => "getScripts",
            Command::ToggleScript { .. } => "toggleScript",
            Command::DeleteScript { .. } => "deleteScript",
            Command::UpdateScript { .. } => "updateScript",
            Command::RunScript { .. } => "runScript",
        }
    }

    pub fn is_known_action(action: &str) -> bool {
        Self::ACTIONS.contains(&action)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Scripts(Vec<ScriptRecord>),
    /// Reply to `saveScript`
    Saved {
        success: bool,
        #[serde(rename = "scriptId")]
        script_id: String,
    },
    Success { success: bool },
    Ran { outcome: RunOutcome },
    Error { error: String },
}

impl Response {
    fn ok() -> Response {
        Response::Success { success: true }
    }
}

/// Messages sent from the background to any open extension page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Broadcast {
    ScriptsUpdated { scripts: Vec<ScriptRecord> },
}

pub struct MessageRouter<S, N, E, B> {
    coordinator: Rc<InjectionCoordinator<S, N, E, B>>,
}

impl<S, N, E, B> MessageRouter<S, N, E, B>
where
    S: StorageArea,
    N: Notifier,
    E: PageExecutor,
    B: BadgeSink,
{
    pub fn new(coordinator: Rc<InjectionCoordinator<S, N, E, B>>) -> Self {
        MessageRouter { coordinator }
    }

    /// Handle a raw message. `None` means no reply is sent: the action is
    /// missing or not one of `Command::ACTIONS`.
    pub async fn dispatch(&self, request: serde_json::Value) -> Option<Response> {
        let action = request
            .get("action")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        match serde_json::from_value::<Command>(request) {
            Ok(command) => Some(self.handle(command).await),
            Err(e) => match action {
                Some(action) if Command::is_known_action(&action) => {
                    log::warn!("Malformed '{}' command: {}", action, e);
                    Some(Response::Error {
                        error: format!("Invalid {} request: {}", action, e),
                    })
                }
                other => {
                    log::warn!("Ignoring unknown command {:?}", other);
                    None
                }
            },
        }
    }

    pub async fn handle(&self, command: Command) -> Response {
        let store = self.coordinator.store();
        let result: StoreResult<Response> = match command {
            Command::SaveScript { script } => store.save(script).await.map(|saved| Response::Saved {
                success: true,
                script_id: saved.id,
            }),
            Command::GetScripts => store.load().await.map(Response::Scripts),
            Command::ToggleScript { script_id, enabled } => store
                .toggle(&script_id, enabled)
                .await
                .map(|_| Response::ok()),
            Command::DeleteScript { script_id } => {
                store.delete(&script_id).await.map(|_| Response::ok())
            }
            Command::UpdateScript { script_id, code } => store
                .update(&script_id, &code)
                .await
                .map(|_| Response::ok()),
            Command::RunScript {
                script_id,
                tab_id,
                url,
            } => self
                .coordinator
                .run_script(tab_id, &url, &script_id)
                .await
                .map(|outcome| match outcome {
                    Some(outcome) => Response::Ran { outcome },
                    None => Response::Error {
                        error: format!("Unknown script {}", script_id),
                    },
                }),
        };

        result.unwrap_or_else(|e| {
            log::error!("Error handling message: {}", e);
            Response::Error {
                error: e.to_string(),
            }
        })
    }
}
