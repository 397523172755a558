//! Key chords mapped to dispatcher entry points.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyBinding {
    Run,
    Step,
    Stop,
    Reset,
    ToggleTrace,
    LoadDialog,
    ToggleBreakpointAtCursor,
}

impl KeyBinding {
    pub const ALL: [KeyBinding; 7] = [
        KeyBinding::Run,
        KeyBinding::Step,
        KeyBinding::Stop,
        KeyBinding::Reset,
        KeyBinding::ToggleTrace,
        KeyBinding::LoadDialog,
        KeyBinding::ToggleBreakpointAtCursor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyBinding::Run => "run",
            KeyBinding::Step => "step",
            KeyBinding::Stop => "stop",
            KeyBinding::Reset => "reset",
            KeyBinding::ToggleTrace => "trace",
            KeyBinding::LoadDialog => "load",
            KeyBinding::ToggleBreakpointAtCursor => "breakpoint",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|binding| binding.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeymapError {
    #[error("unknown key binding '{0}'")]
    UnknownBinding(String),
    #[error("empty key chord for binding '{0}'")]
    EmptyChord(String),
}

/// Normalizes a chord such as `"Shift+Ctrl+B"` to `"ctrl+shift+b"`.
pub fn normalize_chord(chord: &str) -> String {
    let mut parts: Vec<String> = chord
        .split('+')
        .map(|part| part.trim().to_ascii_lowercase())
        .filter(|part| !part.is_empty())
        .collect();
    let Some(key) = parts.pop() else {
        return String::new();
    };
    parts.sort();
    parts.dedup();
    parts.push(key);
    parts.join("+")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keymap {
    chords: BTreeMap<String, KeyBinding>,
}

impl Default for Keymap {
    fn default() -> Self {
        let mut keymap = Self::empty();
        keymap.bind("f5", KeyBinding::Run);
        keymap.bind("f10", KeyBinding::Step);
        keymap.bind("shift+f5", KeyBinding::Stop);
        keymap.bind("ctrl+r", KeyBinding::Reset);
        keymap.bind("ctrl+t", KeyBinding::ToggleTrace);
        keymap.bind("ctrl+o", KeyBinding::LoadDialog);
        keymap.bind("ctrl+b", KeyBinding::ToggleBreakpointAtCursor);
        keymap
    }
}

impl Keymap {
    pub fn empty() -> Self {
        Self {
            chords: BTreeMap::new(),
        }
    }

    /// Applies `binding name -> chord` overrides; each replaces the default chords of its binding.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Result<Self, KeymapError> {
        for (name, chord) in overrides {
            let binding = KeyBinding::from_name(name)
                .ok_or_else(|| KeymapError::UnknownBinding(name.clone()))?;
            if normalize_chord(chord).is_empty() {
                return Err(KeymapError::EmptyChord(name.clone()));
            }
            self.chords.retain(|_, bound| *bound != binding);
            self.bind(chord, binding);
        }
        Ok(self)
    }

    pub fn bind(&mut self, chord: &str, binding: KeyBinding) {
        self.chords.insert(normalize_chord(chord), binding);
    }

    pub fn resolve(&self, chord: &str) -> Option<KeyBinding> {
        self.chords.get(&normalize_chord(chord)).copied()
    }

    pub fn chords_for(&self, binding: KeyBinding) -> Vec<&str> {
        self.chords
            .iter()
            .filter(|(_, bound)| **bound == binding)
            .map(|(chord, _)| chord.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    pub fn clear(&mut self) {
        self.chords.clear();
    }
}
