//! Observable view state mirrored from the engine.
//!
//! Every category has exactly one writer path: the sync controller for pulled
//! and pushed snapshots, the terminal controller for terminal state, and the
//! dispatcher for local hints (run-mode hint, optimistic breakpoints). The
//! mutating methods are crate-private so presentation code can only read.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use shared::domain::{
    Address, DisassembledInstruction, DisassemblyWindow, FlagSet, RegisterFile, RunMode,
    RunStatus, Session, StackWindow,
};
use tokio::sync::{broadcast, RwLock};

use crate::memory_window::MemoryWindow;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Session,
    Registers,
    Flags,
    Memory,
    Stack,
    Disassembly,
    Terminal,
    RunMode,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Session,
        Category::Registers,
        Category::Flags,
        Category::Memory,
        Category::Stack,
        Category::Disassembly,
        Category::Terminal,
        Category::RunMode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Session => "session",
            Category::Registers => "registers",
            Category::Flags => "flags",
            Category::Memory => "memory",
            Category::Stack => "stack",
            Category::Disassembly => "disassembly",
            Category::Terminal => "terminal",
            Category::RunMode => "run_mode",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that may be ahead of engine confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracked<T> {
    Confirmed(T),
    Optimistic { value: T, confirmed: T },
}

impl<T: Copy + PartialEq> Tracked<T> {
    pub fn value(&self) -> T {
        match *self {
            Tracked::Confirmed(value) | Tracked::Optimistic { value, .. } => value,
        }
    }

    pub fn confirmed(&self) -> T {
        match *self {
            Tracked::Confirmed(confirmed) | Tracked::Optimistic { confirmed, .. } => confirmed,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, Tracked::Optimistic { .. })
    }

    /// Shows `value` ahead of confirmation; collapses when it matches the confirmed value.
    pub fn propose(&mut self, value: T) {
        let confirmed = self.confirmed();
        *self = if value == confirmed {
            Tracked::Confirmed(confirmed)
        } else {
            Tracked::Optimistic { value, confirmed }
        };
    }

    pub fn confirm(&mut self, value: T) {
        *self = Tracked::Confirmed(value);
    }

    pub fn rollback(&mut self) {
        *self = Tracked::Confirmed(self.confirmed());
    }
}

/// Breakpoint membership per address, mixing engine-confirmed and optimistic entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointSet {
    entries: BTreeMap<Address, Tracked<bool>>,
}

impl BreakpointSet {
    /// Displayed membership, optimistic entries included.
    pub fn contains(&self, address: Address) -> bool {
        self.entries
            .get(&address)
            .map(Tracked::value)
            .unwrap_or(false)
    }

    pub fn is_confirmed(&self, address: Address) -> bool {
        self.entries
            .get(&address)
            .map(Tracked::confirmed)
            .unwrap_or(false)
    }

    pub fn is_pending(&self, address: Address) -> bool {
        self.entries
            .get(&address)
            .map(Tracked::is_optimistic)
            .unwrap_or(false)
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.entries
            .iter()
            .filter(|(_, tracked)| tracked.value())
            .map(|(address, _)| *address)
            .collect()
    }

    pub(crate) fn propose(&mut self, address: Address, present: bool) {
        self.entries
            .entry(address)
            .or_insert(Tracked::Confirmed(false))
            .propose(present);
        self.prune(address);
    }

    /// Flips displayed membership and returns the new value.
    pub(crate) fn toggle(&mut self, address: Address) -> bool {
        let next = !self.contains(address);
        self.propose(address, next);
        next
    }

    pub(crate) fn rollback(&mut self, address: Address) {
        if let Some(tracked) = self.entries.get_mut(&address) {
            tracked.rollback();
        }
        self.prune(address);
    }

    /// Confirms membership for every address the engine reported in `window`.
    pub(crate) fn confirm_window(&mut self, window: &DisassemblyWindow) {
        for instruction in &window.instructions {
            self.entries
                .entry(instruction.address)
                .or_insert(Tracked::Confirmed(false))
                .confirm(instruction.has_breakpoint);
            self.prune(instruction.address);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    fn prune(&mut self, address: Address) {
        if self.entries.get(&address) == Some(&Tracked::Confirmed(false)) {
            self.entries.remove(&address);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryView {
    pub checksum: u32,
    pub offset: Address,
    pub window: MemoryWindow,
    /// The engine announced a new snapshot, or a re-window is in flight.
    pub chunking: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptState {
    /// Sequence number of the request that opened this prompt.
    pub id: u64,
    pub max_length: u32,
    pub input: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalState {
    pub buffer: String,
    pub prompt: Option<PromptState>,
    prompts_opened: u64,
}

impl TerminalState {
    pub fn prompt_active(&self) -> bool {
        self.prompt.is_some()
    }

    pub fn prompt_max_length(&self) -> u32 {
        self.prompt.as_ref().map(|p| p.max_length).unwrap_or(0)
    }

    pub fn prompt_input(&self) -> &str {
        self.prompt.as_ref().map(|p| p.input.as_str()).unwrap_or("")
    }

    /// Replaces any active prompt with a fresh one and returns its id.
    pub(crate) fn open_prompt(&mut self, max_length: u32) -> u64 {
        self.prompts_opened += 1;
        self.prompt = Some(PromptState {
            id: self.prompts_opened,
            max_length,
            input: String::new(),
        });
        self.prompts_opened
    }

    /// Closes the prompt only if it is still the one identified by `id`.
    pub(crate) fn close_prompt(&mut self, id: u64) -> bool {
        match &self.prompt {
            Some(prompt) if prompt.id == id => {
                self.prompt = None;
                true
            }
            _ => false,
        }
    }
}

/// Engine-reported status plus the dispatcher's local hint.
///
/// The hint only applies while no newer status has been reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    pub reported: RunMode,
    pub trace_enabled: bool,
    status_seq: u64,
    hint: Option<(RunMode, u64)>,
}

impl RunState {
    pub fn mode(&self) -> RunMode {
        match self.hint {
            Some((mode, seq)) if seq == self.status_seq => mode,
            _ => self.reported,
        }
    }

    pub fn hint(&self) -> Option<RunMode> {
        self.hint
            .filter(|(_, seq)| *seq == self.status_seq)
            .map(|(mode, _)| mode)
    }

    pub(crate) fn report(&mut self, status: RunStatus) {
        self.reported = status.mode;
        self.trace_enabled = status.trace;
        self.status_seq += 1;
    }

    pub(crate) fn set_hint(&mut self, mode: RunMode) {
        self.hint = Some((mode, self.status_seq));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisassemblyRow<'a> {
    pub instruction: &'a DisassembledInstruction,
    pub breakpoint: bool,
    pub pending: bool,
    pub current: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub session: Session,
    /// Last user-visible message, such as a failed load.
    pub notice: Option<String>,
    pub registers: RegisterFile,
    pub flags: FlagSet,
    pub memory: MemoryView,
    pub stack: StackWindow,
    pub disassembly: DisassemblyWindow,
    pub breakpoints: BreakpointSet,
    pub terminal: TerminalState,
    pub run: RunState,
}

impl ViewState {
    pub fn loaded(&self) -> bool {
        self.session.loaded
    }

    pub fn mode(&self) -> RunMode {
        self.run.mode()
    }

    /// Disassembly rows with breakpoint markers from the (possibly optimistic) set.
    pub fn disassembly_rows(&self) -> Vec<DisassemblyRow<'_>> {
        self.disassembly
            .instructions
            .iter()
            .map(|instruction| DisassemblyRow {
                instruction,
                breakpoint: self.breakpoints.contains(instruction.address),
                pending: self.breakpoints.is_pending(instruction.address),
                current: self.disassembly.is_current(instruction),
            })
            .collect()
    }

    /// Empties every window that depends on a loaded binary.
    pub(crate) fn clear_dependent_windows(&mut self) {
        self.registers = RegisterFile::default();
        self.flags = FlagSet::default();
        self.memory = MemoryView::default();
        self.stack = StackWindow::default();
        self.disassembly = DisassemblyWindow::default();
        self.breakpoints.clear();
    }
}

struct Inner {
    view: ViewState,
    generations: HashMap<Category, u64>,
}

pub struct StateStore {
    inner: RwLock<Inner>,
    changes: broadcast::Sender<Category>,
}

impl StateStore {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Arc::new(Self {
            inner: RwLock::new(Inner {
                view: ViewState::default(),
                generations: HashMap::new(),
            }),
            changes,
        })
    }

    /// Receives the category of every slice that changes.
    pub fn subscribe(&self) -> broadcast::Receiver<Category> {
        self.changes.subscribe()
    }

    pub async fn snapshot(&self) -> ViewState {
        self.inner.read().await.view.clone()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&ViewState) -> R) -> R {
        f(&self.inner.read().await.view)
    }

    /// Number of pushes applied to `category` so far.
    pub async fn generation(&self, category: Category) -> u64 {
        self.inner
            .read()
            .await
            .generations
            .get(&category)
            .copied()
            .unwrap_or(0)
    }

    /// Applies a pushed snapshot; always wins and advances the category generation.
    pub(crate) async fn apply_push(&self, category: Category, f: impl FnOnce(&mut ViewState)) {
        {
            let mut inner = self.inner.write().await;
            *inner.generations.entry(category).or_insert(0) += 1;
            f(&mut inner.view);
        }
        let _ = self.changes.send(category);
    }

    /// Applies a pulled snapshot only if no push for `category` landed since
    /// `observed` was read. Returns whether it was applied.
    pub(crate) async fn apply_pull(
        &self,
        category: Category,
        observed: u64,
        f: impl FnOnce(&mut ViewState),
    ) -> bool {
        {
            let mut inner = self.inner.write().await;
            let current = inner.generations.get(&category).copied().unwrap_or(0);
            if current != observed {
                return false;
            }
            f(&mut inner.view);
        }
        let _ = self.changes.send(category);
        true
    }

    /// Local write that does not count as an engine push.
    pub(crate) async fn update<R>(&self, category: Category, f: impl FnOnce(&mut ViewState) -> R) -> R {
        let result = {
            let mut inner = self.inner.write().await;
            f(&mut inner.view)
        };
        let _ = self.changes.send(category);
        result
    }

    /// Local write that only notifies observers when `f` succeeds.
    pub(crate) async fn try_update<R, E>(
        &self,
        category: Category,
        f: impl FnOnce(&mut ViewState) -> Result<R, E>,
    ) -> Result<R, E> {
        let result = {
            let mut inner = self.inner.write().await;
            f(&mut inner.view)
        };
        if result.is_ok() {
            let _ = self.changes.send(category);
        }
        result
    }

    /// Returns every slice to its empty state. Generations keep advancing so
    /// that pulls still in flight are discarded.
    pub(crate) async fn reset(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.view = ViewState::default();
            for category in Category::ALL {
                *inner.generations.entry(category).or_insert(0) += 1;
            }
        }
        for category in Category::ALL {
            let _ = self.changes.send(category);
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
