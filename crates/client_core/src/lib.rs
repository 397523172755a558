//! View-state core of the debugger front end.
//!
//! The engine is reached only through a [`CommandGateway`]; its push
//! notifications arrive on the [`EventBus`]. The [`SyncController`] and
//! [`TerminalController`] fold both into the [`StateStore`], which
//! presentation code observes. User intents go through the
//! [`CommandDispatcher`].

use std::{sync::Arc, time::Duration};

use shared::error::EngineError;
use tracing::info;

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod gateway;
pub mod keymap;
pub mod memory_window;
pub mod store;
pub mod sync;
pub mod terminal;
pub mod transport;

pub use dispatcher::{is_legal, CommandDispatcher, DispatchOutcome, DispatcherOptions, RunCommand};
pub use error::CoreError;
pub use events::{handler_fn, EventBus, EventHandler, Subscription};
pub use gateway::{CommandGateway, EngineClient};
pub use keymap::{KeyBinding, Keymap};
pub use store::{Category, StateStore, ViewState};
pub use sync::{SyncController, SyncState};
pub use terminal::{Key, KeyOutcome, TerminalController, TerminalMode};
pub use transport::WsEngineConnection;

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub keymap: Keymap,
    pub run_timeout: Option<Duration>,
}

/// Every controller of one debugging session, wired to a single store.
pub struct DebuggerSession {
    pub store: Arc<StateStore>,
    pub bus: Arc<EventBus>,
    pub sync: Arc<SyncController>,
    pub terminal: Arc<TerminalController>,
    pub dispatcher: Arc<CommandDispatcher>,
}

impl DebuggerSession {
    /// Wires the controllers, subscribes to engine events and performs the
    /// initial pull of every category.
    pub async fn attach(
        gateway: Arc<dyn CommandGateway>,
        bus: Arc<EventBus>,
        options: SessionOptions,
    ) -> Result<Self, EngineError> {
        let engine = EngineClient::new(gateway);
        let store = StateStore::new();
        let sync = SyncController::new(engine.clone(), Arc::clone(&store), Arc::clone(&bus));
        let terminal = TerminalController::new(engine.clone(), Arc::clone(&store), Arc::clone(&bus));
        let dispatcher = CommandDispatcher::new(
            engine,
            Arc::clone(&store),
            Arc::clone(&sync),
            options.keymap,
            DispatcherOptions {
                run_timeout: options.run_timeout,
            },
        );

        terminal.attach().await;
        if let Err(err) = sync.attach().await {
            terminal.detach().await;
            return Err(err);
        }
        info!("debugger session attached");

        Ok(Self {
            store,
            bus,
            sync,
            terminal,
            dispatcher,
        })
    }

    /// Releases every subscription and key binding and empties the store.
    pub async fn teardown(&self) {
        self.dispatcher.release_keymap().await;
        self.terminal.detach().await;
        self.sync.detach().await;
        info!("debugger session torn down");
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
