use serde::{Deserialize, Serialize};

/// Machine word as the engine reports it.
pub type Word = u32;
/// Byte address into the engine's flat memory image.
pub type Address = u32;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub loaded: bool,
    pub filename: String,
    /// Engine-computed; displayed, never recomputed locally.
    pub checksum: u32,
}

impl Session {
    pub fn unloaded() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterFile(pub Vec<Word>);

impl RegisterFile {
    pub fn get(&self, index: usize) -> Option<Word> {
        self.0.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Word)> + '_ {
        self.0.iter().copied().enumerate()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSet {
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
    pub i: bool,
}

impl FlagSet {
    pub fn named(&self) -> [(char, bool); 5] {
        [
            ('N', self.n),
            ('Z', self.z),
            ('C', self.c),
            ('V', self.v),
            ('I', self.i),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub checksum: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry {
    pub address: Address,
    pub value: Word,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackWindow {
    pub sp: Address,
    pub entries: Vec<StackEntry>,
}

impl StackWindow {
    pub fn is_current(&self, entry: &StackEntry) -> bool {
        entry.address == self.sp
    }

    pub fn current_index(&self) -> Option<usize> {
        self.entries.iter().position(|entry| self.is_current(entry))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisassembledInstruction {
    pub has_breakpoint: bool,
    pub address: Address,
    pub encoded: Word,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisassemblyWindow {
    pub pc: Address,
    pub instructions: Vec<DisassembledInstruction>,
}

impl DisassemblyWindow {
    pub fn is_current(&self, instruction: &DisassembledInstruction) -> bool {
        instruction.address == self.pc
    }

    pub fn current(&self) -> Option<&DisassembledInstruction> {
        self.instructions.iter().find(|i| self.is_current(i))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Idle,
    Running,
    Stepping,
    Resetting,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunMode::Idle => "idle",
            RunMode::Running => "running",
            RunMode::Stepping => "stepping",
            RunMode::Resetting => "resetting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub mode: RunMode,
    pub trace: bool,
}
