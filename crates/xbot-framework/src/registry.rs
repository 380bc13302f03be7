//! A set of engines that all receive every event.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;

use xbot_core::{BoxedBot, BoxedEvent};

use crate::engine::Engine;

/// Engines registered with a runtime.
///
/// Every dispatched event goes to every engine. Engines run concurrently and
/// independently; blocking or aborting in one engine does not affect the
/// others.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: Arc<RwLock<Vec<Engine>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, engine: Engine) {
        self.engines.write().push(engine);
    }

    pub fn engines(&self) -> Vec<Engine> {
        self.engines.read().clone()
    }

    pub fn len(&self) -> usize {
        self.engines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.read().is_empty()
    }

    /// Sends `event` to every engine. Returns `true` if any engine matched.
    pub async fn dispatch(&self, event: BoxedEvent, bot: BoxedBot) -> bool {
        let engines = self.engines();
        let results = join_all(
            engines
                .iter()
                .map(|engine| engine.handle_event(event.clone(), Arc::clone(&bot))),
        )
        .await;
        results.into_iter().any(|matched| matched)
    }

    /// Waits for every engine's in-flight handlers.
    pub async fn wait_idle(&self) {
        let engines = self.engines();
        join_all(engines.iter().map(Engine::wait_idle)).await;
    }

    /// Shuts every engine down, waiting for in-flight handlers.
    pub async fn shutdown(&self) {
        let engines = self.engines();
        join_all(engines.iter().map(Engine::shutdown)).await;
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.len())
            .finish()
    }
}
