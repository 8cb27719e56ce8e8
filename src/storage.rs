/// Script persistence on top of `chrome.storage.local`
///
/// The whole script list lives under one key and is always read, modified and
/// written back as a unit.
use crate::config::ExtensionConfig;
use crate::error::StoreResult;
use crate::metadata::parse_script;
use crate::script_data::{NewScript, ScriptRecord, now_millis};
use futures::lock::Mutex;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use uuid::Uuid;

/// Key/value storage holding JSON values
#[allow(async_fn_in_trait)]
pub trait StorageArea {
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>>;
    async fn set(&self, key: &str, value: serde_json::Value) -> StoreResult<()>;
}

impl<T: StorageArea> StorageArea for Rc<T> {
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
        (**self).set(key, value).await
    }
}

/// Receives the full script list after every successful mutation.
/// Delivery is best effort; the store ignores failures.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn scripts_changed(&self, scripts: &[ScriptRecord]) -> Result<(), String>;
}

impl<T: Notifier> Notifier for Rc<T> {
    async fn scripts_changed(&self, scripts: &[ScriptRecord]) -> Result<(), String> {
        (**self).scripts_changed(scripts).await
    }
}

/// Build a record from full source text
pub fn build_record(id: String, source: &str, enabled: bool, last_updated: f64) -> ScriptRecord {
    let parsed = parse_script(source);
    let meta = parsed.extra_meta();

    ScriptRecord {
        id,
        name: parsed.name,
        matches: parsed.matches,
        code: parsed.code,
        source: source.to_string(),
        enabled,
        last_updated,
        meta,
    }
}

/// The persisted script list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptCollection {
    pub scripts: Vec<ScriptRecord>,
}

impl ScriptCollection {
    pub fn new() -> Self {
        ScriptCollection {
            scripts: Vec::new(),
        }
    }

    pub fn contains(&self, script_id: &str) -> bool {
        self.scripts.iter().any(|s| s.id == script_id)
    }

    pub fn add_script(&mut self, script: ScriptRecord) {
        self.scripts.push(script);
    }

    pub fn remove_script(&mut self, script_id: &str) -> bool {
        let original_len = self.scripts.len();
        self.scripts.retain(|s| s.id != script_id);
        self.scripts.len() < original_len
    }

    pub fn get_script(&self, script_id: &str) -> Option<&ScriptRecord> {
        self.scripts.iter().find(|s| s.id == script_id)
    }

    pub fn set_enabled(&mut self, script_id: &str, enabled: bool) -> bool {
        self.scripts
            .iter_mut()
            .find(|s| s.id == script_id)
            .map(|script| {
                script.enabled = enabled;
            })
            .is_some()
    }

    /// Replace a script's content, keeping its id and enabled flag
    pub fn replace_source(&mut self, script_id: &str, source: &str, now: f64) -> bool {
        self.scripts
            .iter_mut()
            .find(|s| s.id == script_id)
            .map(|script| {
                *script = build_record(script.id.clone(), source, script.enabled, now);
            })
            .is_some()
    }

    /// A v4 UUID not already used by any script
    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.contains(&id) {
                return id;
            }
        }
    }
}

/// CRUD over the script list with best-effort change notifications.
///
/// Mutations are serialised through an async mutex, so two overlapping
/// commands never write back the same stale snapshot.
pub struct ScriptStore<S, N> {
    storage: S,
    notifier: N,
    key: String,
    write_lock: Mutex<()>,
}

impl<S: StorageArea, N: Notifier> ScriptStore<S, N> {
    pub fn new(storage: S, notifier: N, config: &ExtensionConfig) -> Self {
        ScriptStore {
            storage,
            notifier,
            key: config.scripts_key.clone(),
            write_lock: Mutex::new(()),
        }
    }

    /// Current script list. A missing entry is an empty list.
    pub async fn load(&self) -> StoreResult<Vec<ScriptRecord>> {
        Ok(self.read().await?.scripts)
    }

    /// Store a new script. The id, enabled flag and timestamp are always
    /// assigned here; only `code` is taken from the input.
    pub async fn save(&self, input: NewScript) -> StoreResult<ScriptRecord> {
        let saved = self
            .mutate(|collection| {
                let record = build_record(collection.fresh_id(), &input.code, true, now_millis());
                collection.add_script(record.clone());
                record
            })
            .await?;

        log::info!("Saved script '{}' ({})", saved.name, saved.id);
        Ok(saved)
    }

    /// Re-parse a script from new source. Returns false for an unknown id.
    pub async fn update(&self, script_id: &str, code: &str) -> StoreResult<bool> {
        let found = self
            .mutate(|collection| collection.replace_source(script_id, code, now_millis()))
            .await?;
        self.log_outcome("Updated", script_id, found);
        Ok(found)
    }

    pub async fn toggle(&self, script_id: &str, enabled: bool) -> StoreResult<bool> {
        let found = self
            .mutate(|collection| collection.set_enabled(script_id, enabled))
            .await?;
        self.log_outcome(if enabled { "Enabled" } else { "Disabled" }, script_id, found);
        Ok(found)
    }

    pub async fn delete(&self, script_id: &str) -> StoreResult<bool> {
        let found = self
            .mutate(|collection| collection.remove_script(script_id))
            .await?;
        self.log_outcome("Deleted", script_id, found);
        Ok(found)
    }

    async fn read(&self) -> StoreResult<ScriptCollection> {
        match self.storage.get(&self.key).await? {
            None | Some(serde_json::Value::Null) => Ok(ScriptCollection::new()),
            Some(value) => Ok(serde_json::from_value(value)?),
        }
    }

    async fn mutate<T>(&self, apply: impl FnOnce(&mut ScriptCollection) -> T) -> StoreResult<T> {
        let _guard = self.write_lock.lock().await;

        let mut collection = self.read().await?;
        let result = apply(&mut collection);

        let value = serde_json::to_value(&collection)?;
        if let Err(e) = self.storage.set(&self.key, value).await {
            log::error!("Failed to save scripts: {}", e);
            return Err(e);
        }

        if let Err(e) = self.notifier.scripts_changed(&collection.scripts).await {
            log::debug!("No listener for script changes: {}", e);
        }

        Ok(result)
    }

    fn log_outcome(&self, action: &str, script_id: &str, found: bool) {
        if found {
            log::info!("{} script {}", action, script_id);
        } else {
            log::warn!("{} requested for unknown script {}", action, script_id);
        }
    }
}

/// Popup colour scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    #[default]
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn toggled(self) -> Theme {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

/// Stored theme, falling back to light on any problem
pub async fn load_theme<S: StorageArea>(storage: &S, key: &str) -> Theme {
    match storage.get(key).await {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
        Ok(None) => Theme::default(),
        Err(e) => {
            log::warn!("Failed to load theme: {}", e);
            Theme::default()
        }
    }
}

pub async fn save_theme<S: StorageArea>(storage: &S, key: &str, theme: Theme) -> StoreResult<()> {
    storage
        .set(key, serde_json::Value::String(theme.as_str().to_string()))
        .await
}
