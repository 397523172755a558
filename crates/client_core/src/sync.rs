//! Reconciles pulled snapshots and pushed events into the state store.

use std::{
    future::Future,
    sync::{Arc, Weak},
};

use anyhow::anyhow;
use async_trait::async_trait;
use shared::{
    domain::{Address, DisassemblyWindow, RegisterFile, Session, StackWindow},
    error::EngineError,
    protocol::{EngineEvent, EventName, LoadOutcome},
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    events::{EventBus, EventHandler, Subscription},
    gateway::EngineClient,
    memory_window::window,
    store::{Category, MemoryView, StateStore, ViewState},
};

/// Upper bound on a plausible register file.
const MAX_REGISTERS: usize = 64;

const SYNC_EVENTS: [EventName; 8] = [
    EventName::BinaryLoaded,
    EventName::RegistersChanged,
    EventName::MemoryChunking,
    EventName::MemoryChanged,
    EventName::FlagsChanged,
    EventName::StackChanged,
    EventName::DisassemblyChanged,
    EventName::StatusChanged,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Detached,
    Attaching,
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    Applied,
    /// The engine has nothing loaded; the slice was emptied.
    NotLoaded,
    /// Pushes beat both the pull and its retry; the pushed value stands.
    Superseded,
}

pub struct SyncController {
    engine: EngineClient,
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    state: RwLock<SyncState>,
    subscriptions: Mutex<Vec<Subscription>>,
}

struct SyncEventHandler {
    controller: Weak<SyncController>,
}

#[async_trait]
impl EventHandler for SyncEventHandler {
    async fn handle(&self, event: &EngineEvent) -> anyhow::Result<()> {
        let Some(controller) = self.controller.upgrade() else {
            return Ok(());
        };
        controller.apply_event(event).await
    }
}

impl SyncController {
    pub fn new(engine: EngineClient, store: Arc<StateStore>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            store,
            bus,
            state: RwLock::new(SyncState::Detached),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub async fn state(&self) -> SyncState {
        *self.state.read().await
    }

    /// Subscribes to engine pushes, then pulls every category concurrently.
    ///
    /// Pushes that land while a pull is in flight win over that pull.
    pub async fn attach(self: &Arc<Self>) -> Result<(), EngineError> {
        {
            let mut state = self.state.write().await;
            if *state != SyncState::Detached {
                debug!(state = ?*state, "sync controller already attached");
                return Ok(());
            }
            *state = SyncState::Attaching;
        }
        info!("sync: attaching to engine");

        let handler: Arc<dyn EventHandler> = Arc::new(SyncEventHandler {
            controller: Arc::downgrade(self),
        });
        {
            let mut subscriptions = self.subscriptions.lock().await;
            for name in SYNC_EVENTS {
                subscriptions.push(self.bus.subscribe(name, Arc::clone(&handler)).await);
            }
        }

        let offset = self.store.read(|view| view.memory.offset).await;
        let (session, registers, flags, memory, stack, disassembly, status) = futures::join!(
            self.pull_session(),
            self.pull_registers(),
            self.pull_flags(),
            self.pull_memory(offset),
            self.pull_stack(),
            self.pull_disassembly(),
            self.pull_status(),
        );

        let results = [
            (Category::Session, session),
            (Category::Registers, registers),
            (Category::Flags, flags),
            (Category::Memory, memory),
            (Category::Stack, stack),
            (Category::Disassembly, disassembly),
            (Category::RunMode, status),
        ];

        for (category, result) in results {
            match result {
                Ok(outcome) => debug!(category = %category, ?outcome, "initial pull resolved"),
                Err(EngineError::Transport(message)) => {
                    warn!(category = %category, error = %message, "initial pull failed; detaching");
                    self.detach().await;
                    return Err(EngineError::Transport(message));
                }
                Err(err) => {
                    warn!(category = %category, error = %err, "initial pull failed; keeping last known state");
                }
            }
        }

        *self.state.write().await = SyncState::Synced;
        info!("sync: engine state synchronized");
        Ok(())
    }

    /// Drops every subscription and empties the store.
    pub async fn detach(&self) {
        *self.state.write().await = SyncState::Detached;
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock().await);
        for subscription in subscriptions {
            self.bus.unsubscribe(subscription).await;
        }
        self.store.reset().await;
        info!("sync: detached from engine");
    }

    /// Re-pulls memory and re-windows it at `offset`.
    pub async fn refresh_memory(&self, offset: Address) -> Result<PullOutcome, EngineError> {
        self.store
            .update(Category::Memory, |view| {
                view.memory.offset = offset;
                view.memory.chunking = true;
            })
            .await;

        let result = self.pull_memory(offset).await;
        let chunking = self.store.read(|view| view.memory.chunking).await;
        if chunking {
            self.store
                .update(Category::Memory, |view| view.memory.chunking = false)
                .await;
        }
        result
    }

    /// Records the outcome of a load command issued by the dispatcher.
    pub async fn record_load(&self, result: &Result<Session, EngineError>) {
        match result {
            Ok(session) => {
                let session = session.clone();
                info!(filename = %session.filename, "binary loaded");
                self.store
                    .apply_push(Category::Session, |view| {
                        view.session = session;
                        view.notice = None;
                    })
                    .await;
            }
            Err(EngineError::InvalidBinary(message)) => {
                self.apply_load_failure(message).await;
            }
            Err(err) => {
                let notice = format!("load failed: {err}");
                self.store
                    .update(Category::Session, |view| view.notice = Some(notice))
                    .await;
            }
        }
    }

    async fn apply_load_failure(&self, message: &str) {
        warn!(error = %message, "binary failed to load");
        let notice = EngineError::InvalidBinary(message.to_string()).to_string();
        self.store
            .apply_push(Category::Session, |view| {
                view.session = Session::unloaded();
                view.notice = Some(notice);
                view.clear_dependent_windows();
            })
            .await;
    }

    async fn apply_event(&self, event: &EngineEvent) -> anyhow::Result<()> {
        if self.state().await == SyncState::Detached {
            return Ok(());
        }

        match event {
            EngineEvent::BinaryLoaded(LoadOutcome::Loaded { session }) => {
                let session = session.clone();
                self.store
                    .apply_push(Category::Session, |view| {
                        view.session = session;
                        view.notice = None;
                    })
                    .await;
            }
            EngineEvent::BinaryLoaded(LoadOutcome::Failed { error }) => {
                self.apply_load_failure(error).await;
            }
            EngineEvent::RegistersChanged(registers) => {
                validate_registers(registers)?;
                let registers = registers.clone();
                self.store
                    .apply_push(Category::Registers, |view| view.registers = registers)
                    .await;
            }
            EngineEvent::MemoryChunking => {
                self.store
                    .update(Category::Memory, |view| view.memory.chunking = true)
                    .await;
            }
            EngineEvent::MemoryChanged(snapshot) => {
                self.store
                    .apply_push(Category::Memory, |view| {
                        apply_memory(view, Some((snapshot.checksum, snapshot.bytes.as_slice())))
                    })
                    .await;
            }
            EngineEvent::FlagsChanged(flags) => {
                let flags = *flags;
                self.store
                    .apply_push(Category::Flags, |view| view.flags = flags)
                    .await;
            }
            EngineEvent::StackChanged(stack) => {
                validate_stack(stack)?;
                let stack = stack.clone();
                self.store
                    .apply_push(Category::Stack, |view| view.stack = stack)
                    .await;
            }
            EngineEvent::DisassemblyChanged(disassembly) => {
                validate_disassembly(disassembly)?;
                let disassembly = disassembly.clone();
                self.store
                    .apply_push(Category::Disassembly, |view| {
                        view.breakpoints.confirm_window(&disassembly);
                        view.disassembly = disassembly;
                    })
                    .await;
            }
            EngineEvent::StatusChanged(status) => {
                let status = *status;
                debug!(mode = %status.mode, trace = status.trace, "engine reported run status");
                self.store
                    .apply_push(Category::RunMode, |view| view.run.report(status))
                    .await;
            }
            EngineEvent::TerminalAppend { .. }
            | EngineEvent::TerminalClear
            | EngineEvent::TerminalPromptRequested { .. } => {
                return Err(anyhow!(
                    "sync controller received terminal event {}",
                    event.name()
                ));
            }
        }
        Ok(())
    }

    /// Pulls one category, discarding the result if a push for the same
    /// category landed meanwhile and retrying once.
    async fn pull<T, F, Fut, A>(
        &self,
        category: Category,
        fetch: F,
        apply: A,
    ) -> Result<PullOutcome, EngineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
        A: Fn(&mut ViewState, Option<T>),
    {
        for attempt in 1..=2 {
            let observed = self.store.generation(category).await;
            let value = match fetch().await {
                Ok(value) => Some(value),
                Err(EngineError::NotLoaded) => None,
                Err(err) => return Err(err),
            };
            let outcome = if value.is_some() {
                PullOutcome::Applied
            } else {
                PullOutcome::NotLoaded
            };
            if self
                .store
                .apply_pull(category, observed, |view| apply(view, value))
                .await
            {
                return Ok(outcome);
            }
            warn!(category = %category, attempt, "push arrived during pull; discarding pulled snapshot");
        }
        Ok(PullOutcome::Superseded)
    }

    async fn pull_session(&self) -> Result<PullOutcome, EngineError> {
        self.pull(
            Category::Session,
            || self.engine.get_session(),
            |view, session| {
                let session = session.unwrap_or_else(Session::unloaded);
                if !session.loaded {
                    view.clear_dependent_windows();
                }
                view.session = session;
            },
        )
        .await
    }

    async fn pull_registers(&self) -> Result<PullOutcome, EngineError> {
        self.pull(
            Category::Registers,
            || async move {
                let registers = self.engine.get_registers().await?;
                validate_registers(&registers)?;
                Ok::<_, EngineError>(registers)
            },
            |view, registers| view.registers = registers.unwrap_or_default(),
        )
        .await
    }

    async fn pull_flags(&self) -> Result<PullOutcome, EngineError> {
        self.pull(
            Category::Flags,
            || self.engine.get_flags(),
            |view, flags| view.flags = flags.unwrap_or_default(),
        )
        .await
    }

    async fn pull_memory(&self, offset: Address) -> Result<PullOutcome, EngineError> {
        self.pull(
            Category::Memory,
            || self.engine.get_memory(Some(offset)),
            |view, snapshot| {
                apply_memory(
                    view,
                    snapshot
                        .as_ref()
                        .map(|snapshot| (snapshot.checksum, snapshot.bytes.as_slice())),
                )
            },
        )
        .await
    }

    async fn pull_stack(&self) -> Result<PullOutcome, EngineError> {
        self.pull(
            Category::Stack,
            || async move {
                let stack = self.engine.get_stack().await?;
                validate_stack(&stack)?;
                Ok::<_, EngineError>(stack)
            },
            |view, stack| view.stack = stack.unwrap_or_default(),
        )
        .await
    }

    async fn pull_disassembly(&self) -> Result<PullOutcome, EngineError> {
        self.pull(
            Category::Disassembly,
            || async move {
                let disassembly = self.engine.get_disassembly().await?;
                validate_disassembly(&disassembly)?;
                Ok::<_, EngineError>(disassembly)
            },
            |view, disassembly| match disassembly {
                Some(disassembly) => {
                    view.breakpoints.confirm_window(&disassembly);
                    view.disassembly = disassembly;
                }
                None => {
                    view.breakpoints.clear();
                    view.disassembly = DisassemblyWindow::default();
                }
            },
        )
        .await
    }

    async fn pull_status(&self) -> Result<PullOutcome, EngineError> {
        self.pull(
            Category::RunMode,
            || self.engine.get_status(),
            |view, status| view.run.report(status.unwrap_or_default()),
        )
        .await
    }
}

/// Windows a memory snapshot at the store's current offset; `None` empties the view.
fn apply_memory(view: &mut ViewState, snapshot: Option<(u32, &[u8])>) {
    let offset = view.memory.offset;
    view.memory = match snapshot {
        Some((checksum, bytes)) => MemoryView {
            checksum,
            offset,
            window: window(bytes, offset),
            chunking: false,
        },
        None => MemoryView {
            offset,
            ..MemoryView::default()
        },
    };
}

pub(crate) fn validate_registers(registers: &RegisterFile) -> Result<(), EngineError> {
    if registers.is_empty() || registers.len() > MAX_REGISTERS {
        return Err(EngineError::ProtocolViolation(format!(
            "register file holds {} registers; expected 1..={MAX_REGISTERS}",
            registers.len()
        )));
    }
    Ok(())
}

pub(crate) fn validate_stack(stack: &StackWindow) -> Result<(), EngineError> {
    let ascending = stack
        .entries
        .windows(2)
        .all(|pair| pair[0].address < pair[1].address);
    let descending = stack
        .entries
        .windows(2)
        .all(|pair| pair[0].address > pair[1].address);
    if !ascending && !descending {
        return Err(EngineError::ProtocolViolation(
            "stack entries are not ordered by address".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_disassembly(disassembly: &DisassemblyWindow) -> Result<(), EngineError> {
    if disassembly
        .instructions
        .windows(2)
        .any(|pair| pair[0].address >= pair[1].address)
    {
        return Err(EngineError::ProtocolViolation(
            "disassembly addresses are not strictly increasing".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
