/// Running user scripts in the page's main world
use crate::config::ExtensionConfig;
use crate::coordinator::TabId;
use crate::error::ExecutionError;
use crate::script_data::ScriptRecord;

/// The two page operations injection needs. Both run in a tab's own global
/// scope (not an isolated world) as fixed functions with arguments, so page
/// policies against `eval` do not apply.
#[allow(async_fn_in_trait)]
pub trait PageExecutor {
    /// Whether the page's global `marker` flag is `true`
    async fn has_marker(&self, tab_id: TabId, marker: &str) -> Result<bool, ExecutionError>;

    /// Set the `marker` flag, then run `code` through a `<script>` element
    async fn inject(&self, tab_id: TabId, marker: &str, code: &str) -> Result<(), ExecutionError>;
}

impl<T: PageExecutor> PageExecutor for std::rc::Rc<T> {
    async fn has_marker(&self, tab_id: TabId, marker: &str) -> Result<bool, ExecutionError> {
        (**self).has_marker(tab_id, marker).await
    }

    async fn inject(&self, tab_id: TabId, marker: &str, code: &str) -> Result<(), ExecutionError> {
        (**self).inject(tab_id, marker, code).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionOutcome {
    Injected,
    /// The page already carries this script's flag
    AlreadyPresent,
    Failed,
}

pub struct Injector<E> {
    executor: E,
    marker_prefix: String,
}

impl<E: PageExecutor> Injector<E> {
    pub fn new(executor: E, config: &ExtensionConfig) -> Self {
        Injector {
            executor,
            marker_prefix: config.marker_prefix.clone(),
        }
    }

    /// Name of the global flag marking `script` as already run in a page
    pub fn marker_name(&self, script: &ScriptRecord) -> String {
        format!("{}{}_injected", self.marker_prefix, script.marker_key())
    }

    /// Inject one script unless the page already ran it. Errors are logged and
    /// reported as `Failed`, never propagated.
    pub async fn inject(&self, tab_id: TabId, script: &ScriptRecord) -> InjectionOutcome {
        match self.try_inject(tab_id, script).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Injection of '{}' into tab {} failed: {}", script.name, tab_id, e);
                InjectionOutcome::Failed
            }
        }
    }

    async fn try_inject(
        &self,
        tab_id: TabId,
        script: &ScriptRecord,
    ) -> Result<InjectionOutcome, ExecutionError> {
        let marker = self.marker_name(script);

        if self.executor.has_marker(tab_id, &marker).await? {
            log::debug!("'{}' already present in tab {}", script.name, tab_id);
            return Ok(InjectionOutcome::AlreadyPresent);
        }

        self.executor.inject(tab_id, &marker, &script.code).await?;

        log::debug!("Injected '{}' into tab {}", script.name, tab_id);
        Ok(InjectionOutcome::Injected)
    }
}
