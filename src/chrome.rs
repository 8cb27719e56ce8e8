/// chrome.* implementations of the storage, executor, badge and notifier seams
use crate::coordinator::{BadgeSink, TabId};
use crate::error::{ExecutionError, StoreError, StoreResult};
use crate::injector::PageExecutor;
use crate::router::Broadcast;
use crate::script_data::ScriptRecord;
use crate::storage::{Notifier, StorageArea};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

// Import JS bridge functions
#[wasm_bindgen(module = "/chrome.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn storageGet(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageSet(key: &str, value: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn hasMarker(tab_id: i32, marker: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn injectCode(tab_id: i32, marker: &str, code: &str) -> Result<(), JsValue>;

    fn setBadgeText(tab_id: i32, text: &str);

    #[wasm_bindgen(catch)]
    async fn sendRuntimeMessage(message: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryTabs() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn activeTab() -> Result<JsValue, JsValue>;

    pub fn onBroadcast(callback: &js_sys::Function);
}

/// Serialize into plain JS objects (not `Map`s), as chrome APIs expect
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize: {:?}", e))
}

pub fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, String> {
    serde_wasm_bindgen::from_value(value).map_err(|e| format!("Failed to parse: {:?}", e))
}

/// Human-readable text of a thrown JS value
pub fn describe(error: &JsValue) -> String {
    if let Some(err) = error.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    error.as_string().unwrap_or_else(|| format!("{:?}", error))
}

/// `chrome.storage.local`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeStorage;

impl StorageArea for ChromeStorage {
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let value = storageGet(key)
            .await
            .map_err(|e| StoreError::Storage(describe(&e)))?;

        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        from_js(value).map(Some).map_err(StoreError::Storage)
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
        let value = to_js(&value).map_err(StoreError::Storage)?;
        storageSet(key, value)
            .await
            .map_err(|e| StoreError::Storage(describe(&e)))
    }
}

/// `chrome.scripting.executeScript` in the MAIN world
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromePage;

impl PageExecutor for ChromePage {
    async fn has_marker(&self, tab_id: TabId, marker: &str) -> Result<bool, ExecutionError> {
        let present = hasMarker(tab_id, marker).await.map_err(execution_error)?;
        Ok(present.as_bool().unwrap_or(false))
    }

    async fn inject(&self, tab_id: TabId, marker: &str, code: &str) -> Result<(), ExecutionError> {
        injectCode(tab_id, marker, code).await.map_err(execution_error)
    }
}

fn execution_error(error: JsValue) -> ExecutionError {
    let message = describe(&error);
    if message.contains("No tab with id") || message.contains("Cannot access") {
        ExecutionError::Unavailable(message)
    } else {
        ExecutionError::Rejected(message)
    }
}

/// `chrome.action.setBadgeText`
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeBadge;

impl BadgeSink for ChromeBadge {
    fn set_badge_text(&self, tab_id: TabId, text: &str) {
        setBadgeText(tab_id, text);
    }
}

/// `chrome.runtime.sendMessage` to open extension pages
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeRuntime;

impl Notifier for ChromeRuntime {
    async fn scripts_changed(&self, scripts: &[ScriptRecord]) -> Result<(), String> {
        let message = to_js(&Broadcast::ScriptsUpdated {
            scripts: scripts.to_vec(),
        })?;
        sendRuntimeMessage(message)
            .await
            .map(|_| ())
            .map_err(|e| describe(&e))
    }
}

/// Send a message to the background and parse the reply
pub async fn send_message<T: Serialize, R: DeserializeOwned>(message: &T) -> Result<R, String> {
    let reply = sendRuntimeMessage(to_js(message)?)
        .await
        .map_err(|e| describe(&e))?;
    from_js(reply)
}

#[derive(Debug, Clone, Deserialize)]
struct OpenTab {
    id: TabId,
    url: String,
}

/// The focused window's active tab, if it has a URL
pub async fn active_tab() -> Result<Option<(TabId, String)>, String> {
    let tab_js = activeTab().await.map_err(|e| describe(&e))?;
    let tab: Option<OpenTab> = from_js(tab_js)?;
    Ok(tab.map(|tab| (tab.id, tab.url)))
}

/// Every open tab that has a URL
pub async fn open_tabs() -> Result<Vec<(TabId, String)>, String> {
    let tabs_js = queryTabs().await.map_err(|e| describe(&e))?;
    let tabs: Vec<OpenTab> = from_js(tabs_js)?;
    Ok(tabs.into_iter().map(|tab| (tab.id, tab.url)).collect())
}
