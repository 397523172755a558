//! Terminal I/O: per-character interrupts interleaved with blocking line prompts.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use shared::protocol::{EngineEvent, EventName};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    error::CoreError,
    events::{EventBus, EventHandler, Subscription},
    gateway::EngineClient,
    store::{Category, PromptState, StateStore},
};

pub const BACKSPACE_CODE: u32 = 8;
pub const ENTER_CODE: u32 = 10;

const TERMINAL_EVENTS: [EventName; 3] = [
    EventName::TerminalAppend,
    EventName::TerminalClear,
    EventName::TerminalPromptRequested,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Enter,
}

impl Key {
    pub fn interrupt_code(self) -> u32 {
        match self {
            Key::Char(c) => c as u32,
            Key::Backspace => BACKSPACE_CODE,
            Key::Enter => ENTER_CODE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMode {
    Normal,
    PromptActive { max_length: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Sent to the engine as an interrupt carrying this code.
    Forwarded(u32),
    /// Added to or removed from the local prompt line.
    Buffered,
    /// Dropped: the prompt line is full, or there is nothing to erase.
    Dropped,
    Submitted(String),
}

enum PromptEdit {
    Buffered,
    Dropped,
}

pub struct TerminalController {
    engine: EngineClient,
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    subscriptions: Mutex<Vec<Subscription>>,
}

struct TerminalEventHandler {
    controller: Weak<TerminalController>,
}

#[async_trait]
impl EventHandler for TerminalEventHandler {
    async fn handle(&self, event: &EngineEvent) -> anyhow::Result<()> {
        if let Some(controller) = self.controller.upgrade() {
            controller.apply_event(event).await;
        }
        Ok(())
    }
}

impl TerminalController {
    pub fn new(engine: EngineClient, store: Arc<StateStore>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            store,
            bus,
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub async fn attach(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.is_empty() {
            return;
        }
        let handler: Arc<dyn EventHandler> = Arc::new(TerminalEventHandler {
            controller: Arc::downgrade(self),
        });
        for name in TERMINAL_EVENTS {
            subscriptions.push(self.bus.subscribe(name, Arc::clone(&handler)).await);
        }
    }

    pub async fn detach(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock().await);
        for subscription in subscriptions {
            self.bus.unsubscribe(subscription).await;
        }
    }

    pub async fn mode(&self) -> TerminalMode {
        self.store
            .read(|view| match &view.terminal.prompt {
                Some(prompt) => TerminalMode::PromptActive {
                    max_length: prompt.max_length,
                },
                None => TerminalMode::Normal,
            })
            .await
    }

    /// Handles one keystroke according to the current mode.
    pub async fn key(&self, key: Key) -> Result<KeyOutcome, CoreError> {
        match self.mode().await {
            TerminalMode::Normal => {
                let code = key.interrupt_code();
                debug!(char_code = code, "forwarding terminal interrupt");
                self.engine.terminal_interrupt(code).await?;
                Ok(KeyOutcome::Forwarded(code))
            }
            TerminalMode::PromptActive { .. } => match key {
                Key::Enter => self.submit().await.map(KeyOutcome::Submitted),
                Key::Char(c) => Ok(self.edit_prompt(|prompt| {
                    if prompt.input.len() + c.len_utf8() > prompt.max_length as usize {
                        return PromptEdit::Dropped;
                    }
                    prompt.input.push(c);
                    PromptEdit::Buffered
                })
                .await),
                Key::Backspace => Ok(self
                    .edit_prompt(|prompt| match prompt.input.pop() {
                        Some(_) => PromptEdit::Buffered,
                        None => PromptEdit::Dropped,
                    })
                    .await),
            },
        }
    }

    /// Sends the assembled prompt line and returns to normal mode.
    ///
    /// On failure the prompt and its input are kept so the user can retry. A
    /// prompt the engine opened while the line was in flight stays active.
    pub async fn submit(&self) -> Result<String, CoreError> {
        let (id, line) = self
            .store
            .read(|view| {
                view.terminal
                    .prompt
                    .as_ref()
                    .map(|p| (p.id, p.input.clone()))
            })
            .await
            .ok_or(CoreError::NoPrompt)?;

        self.engine.terminal_prompt_submit(&line).await?;
        info!(length = line.len(), "terminal prompt submitted");

        let closed = self
            .store
            .try_update(Category::Terminal, |view| {
                if view.terminal.close_prompt(id) {
                    Ok(())
                } else {
                    Err(())
                }
            })
            .await;
        if closed.is_err() {
            debug!(prompt = id, "engine opened a new prompt before the submit reply");
        }
        Ok(line)
    }

    async fn edit_prompt(&self, edit: impl FnOnce(&mut PromptState) -> PromptEdit) -> KeyOutcome {
        let result = self
            .store
            .try_update(Category::Terminal, |view| match view.terminal.prompt.as_mut() {
                Some(prompt) => match edit(prompt) {
                    PromptEdit::Buffered => Ok(()),
                    PromptEdit::Dropped => Err(()),
                },
                None => Err(()),
            })
            .await;
        match result {
            Ok(()) => KeyOutcome::Buffered,
            Err(()) => KeyOutcome::Dropped,
        }
    }

    async fn apply_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::TerminalAppend { text } => {
                self.store
                    .update(Category::Terminal, |view| view.terminal.buffer.push_str(text))
                    .await;
            }
            EngineEvent::TerminalClear => {
                self.store
                    .update(Category::Terminal, |view| view.terminal.buffer.clear())
                    .await;
            }
            EngineEvent::TerminalPromptRequested { max_length } => {
                debug!(max_length, "engine requested a terminal prompt");
                let max_length = *max_length;
                self.store
                    .update(Category::Terminal, |view| {
                        view.terminal.open_prompt(max_length);
                    })
                    .await;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "tests/terminal_tests.rs"]
mod tests;
