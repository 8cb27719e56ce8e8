/// Background service worker: turns browser events into coordinator input and
/// popup messages into router commands.
///
/// The worker script registers the `chrome.*` listeners itself while its top
/// level runs, so the event that woke it is not lost while the wasm module
/// loads. Here we only build the handlers those listeners forward to.
use crate::chrome::{self, ChromeBadge, ChromePage, ChromeRuntime, ChromeStorage, from_js, to_js};
use crate::config::ExtensionConfig;
use crate::coordinator::{InjectionCoordinator, TabEvent, TabId};
use crate::injector::Injector;
use crate::router::{Command, MessageRouter, Response};
use crate::storage::ScriptStore;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

type ChromeCoordinator = InjectionCoordinator<ChromeStorage, ChromeRuntime, ChromePage, ChromeBadge>;

/// Names of the functions in the object returned by `start`
pub const HANDLER_NAMES: [&str; 5] = [
    "onRemoved",
    "onBeforeNavigate",
    "onUpdated",
    "onNavigationCompleted",
    "onMessage",
];

struct Background {
    router: MessageRouter<ChromeStorage, ChromeRuntime, ChromePage, ChromeBadge>,
    coordinator: Rc<ChromeCoordinator>,
}

impl Background {
    fn new(config: ExtensionConfig) -> Background {
        let store = Rc::new(ScriptStore::new(ChromeStorage, ChromeRuntime, &config));
        let injector = Injector::new(ChromePage, &config);
        let coordinator = Rc::new(InjectionCoordinator::new(store, injector, ChromeBadge, config));

        Background {
            router: MessageRouter::new(coordinator.clone()),
            coordinator,
        }
    }

    fn on_tab_event(self: &Rc<Self>, tab_id: TabId, event: TabEvent) {
        let background = self.clone();
        spawn_local(async move {
            background.coordinator.handle_event(tab_id, event).await;
        });
    }

    /// Reply for `chrome.runtime.onMessage`; `undefined` means no reply
    async fn on_message(self: Rc<Self>, request: JsValue) -> JsValue {
        let request: serde_json::Value = match from_js(request) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("Unreadable message: {}", e);
                return JsValue::UNDEFINED;
            }
        };
        let is_toggle = matches!(
            serde_json::from_value::<Command>(request.clone()),
            Ok(Command::ToggleScript { .. })
        );

        let Some(reply) = self.router.dispatch(request).await else {
            return JsValue::UNDEFINED;
        };

        if is_toggle && matches!(reply, Response::Success { .. }) {
            let background = self.clone();
            spawn_local(async move {
                match chrome::open_tabs().await {
                    Ok(tabs) => background.coordinator.rescan(tabs).await,
                    Err(e) => log::error!("Failed to query tabs: {}", e),
                }
            });
        }

        to_js(&reply).unwrap_or_else(|e| {
            log::error!("{}", e);
            JsValue::UNDEFINED
        })
    }
}

/// Build the background logic and return its event handlers as a JS object
/// keyed by `HANDLER_NAMES`. `config` may be `undefined` for defaults.
pub fn start(config: JsValue) -> Result<JsValue, JsValue> {
    let config: ExtensionConfig = if config.is_undefined() || config.is_null() {
        ExtensionConfig::default()
    } else {
        from_js(config).map_err(|e| JsValue::from_str(&e))?
    };

    let background = Rc::new(Background::new(config));

    let on_removed = {
        let background = background.clone();
        Closure::wrap(Box::new(move |tab_id: i32| {
            background.on_tab_event(tab_id, TabEvent::Removed);
        }) as Box<dyn FnMut(i32)>)
    };

    let on_before_navigate = {
        let background = background.clone();
        Closure::wrap(Box::new(move |tab_id: i32, frame_id: i32| {
            background.on_tab_event(tab_id, TabEvent::NavigationStarted { frame_id });
        }) as Box<dyn FnMut(i32, i32)>)
    };

    let on_updated = {
        let background = background.clone();
        Closure::wrap(Box::new(move |tab_id: i32, status: Option<String>, url: Option<String>| {
            if status.as_deref() == Some("complete") {
                background.on_tab_event(tab_id, TabEvent::LoadComplete { url });
            }
        }) as Box<dyn FnMut(i32, Option<String>, Option<String>)>)
    };

    let on_navigation_completed = {
        let background = background.clone();
        Closure::wrap(Box::new(move |tab_id: i32, frame_id: i32, url: String| {
            background.on_tab_event(tab_id, TabEvent::NavigationCompleted { frame_id, url });
        }) as Box<dyn FnMut(i32, i32, String)>)
    };

    let on_message = {
        let background = background.clone();
        Closure::wrap(Box::new(move |request: JsValue| {
            let background = background.clone();
            future_to_promise(async move { Ok(background.on_message(request).await) })
        }) as Box<dyn FnMut(JsValue) -> js_sys::Promise>)
    };

    // Handlers live as long as the service worker; JS owns them from here
    let handlers = js_sys::Object::new();
    let functions = [
        on_removed.into_js_value(),
        on_before_navigate.into_js_value(),
        on_updated.into_js_value(),
        on_navigation_completed.into_js_value(),
        on_message.into_js_value(),
    ];
    for (name, function) in HANDLER_NAMES.iter().zip(functions) {
        js_sys::Reflect::set(&handlers, &JsValue::from_str(name), &function)?;
    }

    log::info!("AlterPage background started");
    Ok(handlers.into())
}
