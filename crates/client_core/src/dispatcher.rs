//! Maps user intents to engine commands, gated by the current run mode.

use std::{sync::Arc, time::Duration};

use shared::{
    domain::{Address, RunMode, Session},
    error::EngineError,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    error::CoreError,
    gateway::EngineClient,
    keymap::{KeyBinding, Keymap},
    memory_window::parse_offset,
    store::{Category, StateStore},
    sync::SyncController,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunCommand {
    Run,
    Step,
    Stop,
    Reset,
    ToggleTrace,
}

impl RunCommand {
    pub const ALL: [RunCommand; 5] = [
        RunCommand::Run,
        RunCommand::Step,
        RunCommand::Stop,
        RunCommand::Reset,
        RunCommand::ToggleTrace,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RunCommand::Run => "run",
            RunCommand::Step => "step",
            RunCommand::Stop => "stop",
            RunCommand::Reset => "reset",
            RunCommand::ToggleTrace => "toggle trace",
        }
    }
}

/// Legality of `command` in `mode`, with `loaded` telling whether a binary is present.
pub fn is_legal(command: RunCommand, mode: RunMode, loaded: bool) -> bool {
    match (mode, command) {
        (RunMode::Resetting, _) => false,
        (_, RunCommand::ToggleTrace) => true,
        (RunMode::Idle, RunCommand::Stop) => false,
        (RunMode::Idle, _) => loaded,
        (RunMode::Running, RunCommand::Stop) => true,
        (RunMode::Running, _) | (RunMode::Stepping, _) => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    /// The binding is not legal in the current mode, or no chord matched.
    Ignored,
    /// Presentation should ask for a path and call [`CommandDispatcher::load`].
    LoadDialogRequested,
    BreakpointToggled { address: Address, present: bool },
}

#[derive(Debug, Clone, Default)]
pub struct DispatcherOptions {
    /// Upper bound on how long a Run round trip is awaited.
    pub run_timeout: Option<Duration>,
}

pub struct CommandDispatcher {
    engine: EngineClient,
    store: Arc<StateStore>,
    sync: Arc<SyncController>,
    keymap: RwLock<Keymap>,
    cursor: Mutex<Option<Address>>,
    options: DispatcherOptions,
}

impl CommandDispatcher {
    pub fn new(
        engine: EngineClient,
        store: Arc<StateStore>,
        sync: Arc<SyncController>,
        keymap: Keymap,
        options: DispatcherOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            store,
            sync,
            keymap: RwLock::new(keymap),
            cursor: Mutex::new(None),
            options,
        })
    }

    /// Checks legality and, when legal, sets the local mode hint in one step.
    async fn begin(&self, command: RunCommand, next: Option<RunMode>) -> Result<Session, CoreError> {
        self.store
            .try_update(Category::RunMode, |view| {
                let mode = view.mode();
                let loaded = view.loaded();
                if !is_legal(command, mode, loaded) {
                    return Err(CoreError::illegal(command.name(), mode, loaded));
                }
                if let Some(next) = next {
                    view.run.set_hint(next);
                }
                Ok(view.session.clone())
            })
            .await
    }

    async fn finish(&self) {
        self.store
            .update(Category::RunMode, |view| view.run.set_hint(RunMode::Idle))
            .await;
    }

    pub async fn run(&self) -> Result<(), CoreError> {
        self.begin(RunCommand::Run, Some(RunMode::Running)).await?;
        info!("dispatch: run");

        let result = match self.options.run_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.engine.run()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(seconds = limit.as_secs(), "run did not complete in time; engine still owns the run");
                    return Err(CoreError::TimedOut {
                        command: "run",
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => self.engine.run().await,
        };

        self.finish().await;
        result.map_err(CoreError::from)
    }

    pub async fn step(&self) -> Result<(), CoreError> {
        self.begin(RunCommand::Step, Some(RunMode::Stepping)).await?;
        debug!("dispatch: step");
        let result = self.engine.step().await;
        self.finish().await;
        result.map_err(CoreError::from)
    }

    /// Asks the engine to halt a run. This is a new command, not a
    /// cancellation: the pending run round trip still resolves on its own.
    pub async fn stop(&self) -> Result<(), CoreError> {
        self.begin(RunCommand::Stop, None).await?;
        info!("dispatch: stop");
        self.engine.stop().await?;
        self.finish().await;
        Ok(())
    }

    pub async fn reset(&self) -> Result<(), CoreError> {
        let session = self.begin(RunCommand::Reset, Some(RunMode::Resetting)).await?;
        info!(filename = %session.filename, "dispatch: reset");
        let result = self.engine.reset(&session.filename).await;
        self.finish().await;
        result.map_err(CoreError::from)
    }

    pub async fn toggle_trace(&self) -> Result<(), CoreError> {
        self.begin(RunCommand::ToggleTrace, None).await?;
        debug!("dispatch: toggle trace");
        self.engine.toggle_trace().await.map_err(CoreError::from)
    }

    /// Loads a binary; only legal while idle.
    pub async fn load(&self, path: &str) -> Result<Session, CoreError> {
        let mode = self.store.read(|view| view.mode()).await;
        if mode != RunMode::Idle {
            return Err(CoreError::Illegal {
                command: "load",
                mode: mode.to_string(),
            });
        }
        info!(path, "dispatch: load");
        let result = self.engine.load(path).await;
        self.sync.record_load(&result).await;
        result.map_err(CoreError::from)
    }

    async fn ensure_breakpoints_allowed(&self) -> Result<(), CoreError> {
        let (mode, loaded) = self.store.read(|view| (view.mode(), view.loaded())).await;
        if !loaded {
            return Err(CoreError::NotLoaded);
        }
        if mode == RunMode::Resetting {
            return Err(CoreError::illegal("breakpoint change", mode, loaded));
        }
        Ok(())
    }

    /// Rolls back the optimistic entry for `address` when `result` failed.
    async fn settle_breakpoint(
        &self,
        address: Address,
        result: Result<(), EngineError>,
    ) -> Result<(), CoreError> {
        if let Err(err) = result {
            warn!(address = format_args!("{address:#010x}"), error = %err, "breakpoint change rejected; rolling back");
            self.store
                .update(Category::Disassembly, |view| view.breakpoints.rollback(address))
                .await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Flips the breakpoint at `address` ahead of engine confirmation and
    /// returns the displayed membership.
    pub async fn toggle_breakpoint(&self, address: Address) -> Result<bool, CoreError> {
        self.ensure_breakpoints_allowed().await?;
        let present = self
            .store
            .update(Category::Disassembly, |view| view.breakpoints.toggle(address))
            .await;
        debug!(address = format_args!("{address:#010x}"), present, "dispatch: toggle breakpoint");
        let result = self.engine.toggle_breakpoint(address).await;
        self.settle_breakpoint(address, result).await?;
        Ok(present)
    }

    pub async fn add_breakpoint(&self, address: Address) -> Result<(), CoreError> {
        self.ensure_breakpoints_allowed().await?;
        self.store
            .update(Category::Disassembly, |view| view.breakpoints.propose(address, true))
            .await;
        let result = self.engine.add_breakpoint(address).await;
        self.settle_breakpoint(address, result).await
    }

    pub async fn remove_breakpoint(&self, address: Address) -> Result<(), CoreError> {
        self.ensure_breakpoints_allowed().await?;
        self.store
            .update(Category::Disassembly, |view| view.breakpoints.propose(address, false))
            .await;
        let result = self.engine.remove_breakpoint(address).await;
        self.settle_breakpoint(address, result).await
    }

    /// Adds a breakpoint from user text in base 16.
    pub async fn add_breakpoint_from_input(&self, input: &str) -> Result<Address, CoreError> {
        let address = parse_offset(input).map_err(|_| CoreError::InvalidAddress {
            input: input.to_string(),
        })?;
        self.add_breakpoint(address).await?;
        Ok(address)
    }

    pub async fn set_cursor(&self, address: Option<Address>) {
        *self.cursor.lock().await = address;
    }

    /// The cursor address, falling back to the program counter.
    pub async fn cursor(&self) -> Address {
        match *self.cursor.lock().await {
            Some(address) => address,
            None => self.store.read(|view| view.disassembly.pc).await,
        }
    }

    pub async fn toggle_breakpoint_at_cursor(&self) -> Result<(Address, bool), CoreError> {
        let address = self.cursor().await;
        let present = self.toggle_breakpoint(address).await?;
        Ok((address, present))
    }

    /// Re-windows memory at a user-typed offset. Invalid text re-windows at 0
    /// and is reported as [`CoreError::InvalidOffset`].
    pub async fn go_to_address(&self, input: &str) -> Result<Address, CoreError> {
        match parse_offset(input) {
            Ok(offset) => {
                self.sync.refresh_memory(offset).await?;
                Ok(offset)
            }
            Err(_) => {
                self.sync.refresh_memory(0).await?;
                Err(CoreError::InvalidOffset {
                    input: input.to_string(),
                })
            }
        }
    }

    /// Runs a key binding. Bindings that are illegal in the current mode are no-ops.
    pub async fn handle_key(&self, binding: KeyBinding) -> Result<DispatchOutcome, CoreError> {
        let result = match binding {
            KeyBinding::Run => self.run().await.map(|_| DispatchOutcome::Completed),
            KeyBinding::Step => self.step().await.map(|_| DispatchOutcome::Completed),
            KeyBinding::Stop => self.stop().await.map(|_| DispatchOutcome::Completed),
            KeyBinding::Reset => self.reset().await.map(|_| DispatchOutcome::Completed),
            KeyBinding::ToggleTrace => self.toggle_trace().await.map(|_| DispatchOutcome::Completed),
            KeyBinding::LoadDialog => {
                let mode = self.store.read(|view| view.mode()).await;
                if mode == RunMode::Idle {
                    Ok(DispatchOutcome::LoadDialogRequested)
                } else {
                    Ok(DispatchOutcome::Ignored)
                }
            }
            KeyBinding::ToggleBreakpointAtCursor => self
                .toggle_breakpoint_at_cursor()
                .await
                .map(|(address, present)| DispatchOutcome::BreakpointToggled { address, present }),
        };

        match result {
            Err(err) if err.is_illegal() || err == CoreError::NotLoaded => {
                debug!(binding = binding.as_str(), reason = %err, "ignoring key binding");
                Ok(DispatchOutcome::Ignored)
            }
            other => other,
        }
    }

    /// Resolves `chord` through the keymap and runs the bound intent.
    pub async fn handle_chord(&self, chord: &str) -> Result<DispatchOutcome, CoreError> {
        let binding = self.keymap.read().await.resolve(chord);
        match binding {
            Some(binding) => self.handle_key(binding).await,
            None => Ok(DispatchOutcome::Ignored),
        }
    }

    pub async fn keymap(&self) -> Keymap {
        self.keymap.read().await.clone()
    }

    /// Drops every chord; called when the session is torn down.
    pub async fn release_keymap(&self) {
        self.keymap.write().await.clear();
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
