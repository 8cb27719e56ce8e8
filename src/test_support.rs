/// In-memory stand-ins for the browser APIs, used by the unit tests
use crate::coordinator::{BadgeSink, TabId};
use crate::error::{ExecutionError, StoreError, StoreResult};
use crate::injector::PageExecutor;
use crate::script_data::ScriptRecord;
use crate::storage::{Notifier, StorageArea};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Give other futures in a `join!` a chance to run
pub async fn yield_now() {
    struct YieldNow(bool);

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    YieldNow(false).await
}

/// Script text with a metadata header
pub fn script_source(name: &str, matches: &[&str], body: &str) -> String {
    let mut source = String::from("// ==UserScript==\n");
    source.push_str(&format!("// @name {}\n", name));
    for pattern in matches {
        source.push_str(&format!("// @match {}\n", pattern));
    }
    source.push_str("// ==/UserScript==\n");
    source.push_str(body);
    source
}

#[derive(Default)]
pub struct MemoryStorage {
    data: RefCell<HashMap<String, serde_json::Value>>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
    writes: Cell<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: serde_json::Value) {
        self.data.borrow_mut().insert(key.to_string(), value);
    }

    pub fn value(&self, key: &str) -> Option<serde_json::Value> {
        self.data.borrow().get(key).cloned()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn write_count(&self) -> usize {
        self.writes.get()
    }
}

impl StorageArea for MemoryStorage {
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        yield_now().await;
        if self.fail_reads.get() {
            return Err(StoreError::Storage("read refused".to_string()));
        }
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
        yield_now().await;
        if self.fail_writes.get() {
            return Err(StoreError::Storage("quota exceeded".to_string()));
        }
        self.writes.set(self.writes.get() + 1);
        self.insert(key, value);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: RefCell<Vec<Vec<ScriptRecord>>>,
    fail: Cell<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn count(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn last(&self) -> Option<Vec<ScriptRecord>> {
        self.events.borrow().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    async fn scripts_changed(&self, scripts: &[ScriptRecord]) -> Result<(), String> {
        if self.fail.get() {
            return Err("Receiving end does not exist.".to_string());
        }
        self.events.borrow_mut().push(scripts.to_vec());
        Ok(())
    }
}

/// Simulated pages: each tab has a set of global flags and a log of the
/// marker checks and injected code.
#[derive(Default)]
pub struct FakePage {
    globals: RefCell<HashMap<TabId, HashSet<String>>>,
    checked: RefCell<Vec<(TabId, String)>>,
    injected: RefCell<Vec<(TabId, String)>>,
    rejected_tabs: RefCell<HashSet<TabId>>,
    /// Code containing this text is rejected
    poison: RefCell<Option<String>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new document: the tab's globals are gone
    pub fn reload(&self, tab_id: TabId) {
        self.globals.borrow_mut().remove(&tab_id);
    }

    pub fn reject_tab(&self, tab_id: TabId) {
        self.rejected_tabs.borrow_mut().insert(tab_id);
    }

    pub fn poison(&self, needle: &str) {
        *self.poison.borrow_mut() = Some(needle.to_string());
    }

    pub fn has_global(&self, tab_id: TabId, name: &str) -> bool {
        self.globals
            .borrow()
            .get(&tab_id)
            .is_some_and(|flags| flags.contains(name))
    }

    /// Markers checked in a tab, in order
    pub fn marker_checks(&self, tab_id: TabId) -> Vec<String> {
        self.checked
            .borrow()
            .iter()
            .filter(|(tab, _)| *tab == tab_id)
            .map(|(_, marker)| marker.clone())
            .collect()
    }

    /// Code injected into a tab, in order
    pub fn injections(&self, tab_id: TabId) -> Vec<String> {
        self.injected
            .borrow()
            .iter()
            .filter(|(tab, _)| *tab == tab_id)
            .map(|(_, code)| code.clone())
            .collect()
    }

    /// Number of injections that carried the given text
    pub fn injection_count(&self, tab_id: TabId, needle: &str) -> usize {
        self.injections(tab_id)
            .iter()
            .filter(|code| code.contains(needle))
            .count()
    }

    fn check_tab(&self, tab_id: TabId) -> Result<(), ExecutionError> {
        if self.rejected_tabs.borrow().contains(&tab_id) {
            return Err(ExecutionError::Unavailable(format!("No tab with id: {}", tab_id)));
        }
        Ok(())
    }
}

impl PageExecutor for FakePage {
    async fn has_marker(&self, tab_id: TabId, marker: &str) -> Result<bool, ExecutionError> {
        yield_now().await;
        self.check_tab(tab_id)?;

        self.checked.borrow_mut().push((tab_id, marker.to_string()));
        Ok(self.has_global(tab_id, marker))
    }

    async fn inject(&self, tab_id: TabId, marker: &str, code: &str) -> Result<(), ExecutionError> {
        yield_now().await;
        self.check_tab(tab_id)?;

        if let Some(needle) = self.poison.borrow().as_deref() {
            if code.contains(needle) {
                return Err(ExecutionError::Rejected("Refused to execute inline script".to_string()));
            }
        }

        self.globals
            .borrow_mut()
            .entry(tab_id)
            .or_default()
            .insert(marker.to_string());
        self.injected.borrow_mut().push((tab_id, code.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingBadge {
    texts: RefCell<HashMap<TabId, String>>,
}

impl RecordingBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self, tab_id: TabId) -> Option<String> {
        self.texts.borrow().get(&tab_id).cloned()
    }
}

impl BadgeSink for RecordingBadge {
    fn set_badge_text(&self, tab_id: TabId, text: &str) {
        self.texts.borrow_mut().insert(tab_id, text.to_string());
    }
}
