/// Per-tab injection bookkeeping
///
/// Each tab is either `Idle` or `Injected`. Browser callbacks are turned into
/// `TabEvent`s and run through `transition`, which decides what to do:
///
/// | state    | event                                | result          |
/// |----------|--------------------------------------|-----------------|
/// | Idle     | load complete / top frame completed, eligible URL | start injection pass, -> Injected |
/// | Injected | load complete / top frame completed  | nothing         |
/// | any      | top frame navigation started         | clear badge, -> Idle |
/// | any      | tab removed                          | clear badge, forget tab |
/// | any      | sub-frame events                     | nothing         |
use crate::config::ExtensionConfig;
use crate::error::StoreResult;
use crate::injector::{InjectionOutcome, Injector, PageExecutor};
use crate::pattern::PatternSet;
use crate::storage::{Notifier, ScriptStore, StorageArea};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use url::Url;

pub type TabId = i32;

/// Frame id of a tab's top-level document
pub const TOP_FRAME: i32 = 0;

/// Visible per-tab counter (the toolbar badge)
pub trait BadgeSink {
    fn set_badge_text(&self, tab_id: TabId, text: &str);
}

impl<T: BadgeSink> BadgeSink for Rc<T> {
    fn set_badge_text(&self, tab_id: TabId, text: &str) {
        (**self).set_badge_text(tab_id, text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabState {
    Idle,
    /// The pass for the current page load has started. The generation tells
    /// passes from different page loads apart.
    Injected { generation: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    /// `tabs.onUpdated` with `status == "complete"`
    LoadComplete { url: Option<String> },
    /// `webNavigation.onCompleted`
    NavigationCompleted { frame_id: i32, url: String },
    /// `webNavigation.onBeforeNavigate`
    NavigationStarted { frame_id: i32 },
    /// `tabs.onRemoved`
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Stay,
    BeginInjection(String),
    Reset,
    Forget,
}

/// Whether scripts may run on a URL: it must parse and not use a
/// browser-internal scheme.
pub fn is_eligible_url(url: &str, config: &ExtensionConfig) -> bool {
    match Url::parse(url) {
        Ok(parsed) => !config.is_privileged_scheme(parsed.scheme()),
        Err(_) => false,
    }
}

pub fn transition(state: TabState, event: &TabEvent, config: &ExtensionConfig) -> Transition {
    let load_url = match event {
        TabEvent::LoadComplete { url } => url.as_deref(),
        TabEvent::NavigationCompleted { frame_id, url } if *frame_id == TOP_FRAME => Some(url.as_str()),
        TabEvent::NavigationCompleted { .. } => return Transition::Stay,
        TabEvent::NavigationStarted { frame_id } if *frame_id == TOP_FRAME => return Transition::Reset,
        TabEvent::NavigationStarted { .. } => return Transition::Stay,
        TabEvent::Removed => return Transition::Forget,
    };

    match (state, load_url) {
        (TabState::Idle, Some(url)) if is_eligible_url(url, config) => {
            Transition::BeginInjection(url.to_string())
        }
        _ => Transition::Stay,
    }
}

/// What an injection pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub matched: usize,
    pub injected: usize,
    pub already_present: usize,
    pub failed: usize,
}

/// Result of running one script on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    Executed,
    AlreadyPresent,
    /// Disabled, no pattern matches, or the page does not take scripts
    NotMatched,
    Failed,
}

pub struct InjectionCoordinator<S, N, E, B> {
    store: Rc<ScriptStore<S, N>>,
    injector: Injector<E>,
    badge: B,
    config: ExtensionConfig,
    tabs: RefCell<HashMap<TabId, TabState>>,
    next_generation: Cell<u64>,
}

impl<S, N, E, B> InjectionCoordinator<S, N, E, B>
where
    S: StorageArea,
    N: Notifier,
    E: PageExecutor,
    B: BadgeSink,
{
    pub fn new(
        store: Rc<ScriptStore<S, N>>,
        injector: Injector<E>,
        badge: B,
        config: ExtensionConfig,
    ) -> Self {
        InjectionCoordinator {
            store,
            injector,
            badge,
            config,
            tabs: RefCell::new(HashMap::new()),
            next_generation: Cell::new(1),
        }
    }

    pub fn store(&self) -> &Rc<ScriptStore<S, N>> {
        &self.store
    }

    pub fn state(&self, tab_id: TabId) -> TabState {
        self.tabs
            .borrow()
            .get(&tab_id)
            .copied()
            .unwrap_or(TabState::Idle)
    }

    /// Feed one browser event into the tab's state machine. Returns the report
    /// of the injection pass if the event started one that ran to the end.
    pub async fn handle_event(&self, tab_id: TabId, event: TabEvent) -> Option<PassReport> {
        let step = transition(self.state(tab_id), &event, &self.config);
        log::debug!("Tab {}: {:?} -> {:?}", tab_id, event, step);

        match step {
            Transition::Stay => None,
            Transition::Reset => {
                self.tabs.borrow_mut().insert(tab_id, TabState::Idle);
                self.badge.set_badge_text(tab_id, "");
                None
            }
            Transition::Forget => {
                self.tabs.borrow_mut().remove(&tab_id);
                self.badge.set_badge_text(tab_id, "");
                None
            }
            Transition::BeginInjection(url) => {
                // Marked before the first await so a second signal for the same
                // load sees Injected
                let generation = self.next_generation.get();
                self.next_generation.set(generation + 1);
                self.tabs
                    .borrow_mut()
                    .insert(tab_id, TabState::Injected { generation });

                self.run_pass(tab_id, &url, generation).await
            }
        }
    }

    /// Offer every open tab a pass, e.g. after a script was re-enabled.
    /// Tabs already injected for their current load are left alone.
    pub async fn rescan(&self, tabs: Vec<(TabId, String)>) {
        join_all(tabs.into_iter().map(|(tab_id, url)| {
            self.handle_event(tab_id, TabEvent::LoadComplete { url: Some(url) })
        }))
        .await;
    }

    /// Run one script in a tab right away, e.g. just after it was saved.
    /// Tab bookkeeping is untouched; the page marker still keeps it to one
    /// run per document. `None` for an unknown id.
    pub async fn run_script(
        &self,
        tab_id: TabId,
        url: &str,
        script_id: &str,
    ) -> StoreResult<Option<RunOutcome>> {
        let scripts = self.store.load().await?;
        let Some(script) = scripts.into_iter().find(|s| s.id == script_id) else {
            log::warn!("Run requested for unknown script {}", script_id);
            return Ok(None);
        };

        if !script.enabled
            || !is_eligible_url(url, &self.config)
            || !PatternSet::compile(&script.matches).matches(url)
        {
            return Ok(Some(RunOutcome::NotMatched));
        }

        let outcome = match self.injector.inject(tab_id, &script).await {
            InjectionOutcome::Injected => RunOutcome::Executed,
            InjectionOutcome::AlreadyPresent => RunOutcome::AlreadyPresent,
            InjectionOutcome::Failed => RunOutcome::Failed,
        };
        log::info!("Ran '{}' in tab {}: {:?}", script.name, tab_id, outcome);
        Ok(Some(outcome))
    }

    fn is_current(&self, tab_id: TabId, generation: u64) -> bool {
        self.state(tab_id) == TabState::Injected { generation }
    }

    async fn run_pass(&self, tab_id: TabId, url: &str, generation: u64) -> Option<PassReport> {
        let scripts = match self.store.load().await {
            Ok(scripts) => scripts,
            Err(e) => {
                log::error!("Failed to load scripts for tab {}: {}", tab_id, e);
                if self.is_current(tab_id, generation) {
                    self.tabs.borrow_mut().insert(tab_id, TabState::Idle);
                }
                return None;
            }
        };

        if !self.is_current(tab_id, generation) {
            log::debug!("Tab {} navigated away, dropping stale pass", tab_id);
            return None;
        }

        let matched: Vec<_> = scripts
            .into_iter()
            .filter(|script| script.enabled && PatternSet::compile(&script.matches).matches(url))
            .collect();

        let badge = if matched.is_empty() {
            String::new()
        } else {
            matched.len().to_string()
        };
        self.badge.set_badge_text(tab_id, &badge);

        log::info!("Injecting {} script(s) into tab {} ({})", matched.len(), tab_id, url);

        let outcomes = join_all(
            matched
                .iter()
                .map(|script| self.injector.inject(tab_id, script)),
        )
        .await;

        let mut report = PassReport {
            matched: matched.len(),
            ..PassReport::default()
        };
        for outcome in outcomes {
            match outcome {
                InjectionOutcome::Injected => report.injected += 1,
                InjectionOutcome::AlreadyPresent => report.already_present += 1,
                InjectionOutcome::Failed => report.failed += 1,
            }
        }
        Some(report)
    }
}
