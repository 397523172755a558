use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        Address, DisassemblyWindow, FlagSet, MemorySnapshot, RegisterFile, RunStatus, Session,
        StackWindow,
    },
    error::EngineFailure,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EngineCommand {
    Load {
        path: String,
    },
    GetSession,
    GetRegisters,
    GetMemory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<Address>,
    },
    GetFlags,
    GetStack,
    GetDisassembly,
    GetStatus,
    Run,
    Step,
    Stop,
    Reset {
        path: String,
    },
    ToggleTrace,
    ToggleBreakpoint {
        address: Address,
    },
    AddBreakpoint {
        address: Address,
    },
    RemoveBreakpoint {
        address: Address,
    },
    TerminalInterrupt {
        char_code: u32,
    },
    TerminalPromptSubmit {
        line: String,
    },
}

impl EngineCommand {
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Load { .. } => "load",
            EngineCommand::GetSession => "get_session",
            EngineCommand::GetRegisters => "get_registers",
            EngineCommand::GetMemory { .. } => "get_memory",
            EngineCommand::GetFlags => "get_flags",
            EngineCommand::GetStack => "get_stack",
            EngineCommand::GetDisassembly => "get_disassembly",
            EngineCommand::GetStatus => "get_status",
            EngineCommand::Run => "run",
            EngineCommand::Step => "step",
            EngineCommand::Stop => "stop",
            EngineCommand::Reset { .. } => "reset",
            EngineCommand::ToggleTrace => "toggle_trace",
            EngineCommand::ToggleBreakpoint { .. } => "toggle_breakpoint",
            EngineCommand::AddBreakpoint { .. } => "add_breakpoint",
            EngineCommand::RemoveBreakpoint { .. } => "remove_breakpoint",
            EngineCommand::TerminalInterrupt { .. } => "terminal_interrupt",
            EngineCommand::TerminalPromptSubmit { .. } => "terminal_prompt_submit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum CommandReply {
    Session(Session),
    Registers(RegisterFile),
    Memory(MemorySnapshot),
    Flags(FlagSet),
    Stack(StackWindow),
    Disassembly(DisassemblyWindow),
    Status(RunStatus),
    Ack,
}

impl CommandReply {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandReply::Session(_) => "session",
            CommandReply::Registers(_) => "registers",
            CommandReply::Memory(_) => "memory",
            CommandReply::Flags(_) => "flags",
            CommandReply::Stack(_) => "stack",
            CommandReply::Disassembly(_) => "disassembly",
            CommandReply::Status(_) => "status",
            CommandReply::Ack => "ack",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded { session: Session },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EngineEvent {
    BinaryLoaded(LoadOutcome),
    RegistersChanged(RegisterFile),
    MemoryChunking,
    MemoryChanged(MemorySnapshot),
    FlagsChanged(FlagSet),
    StackChanged(StackWindow),
    DisassemblyChanged(DisassemblyWindow),
    StatusChanged(RunStatus),
    TerminalAppend { text: String },
    TerminalClear,
    TerminalPromptRequested { max_length: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventName {
    BinaryLoaded,
    RegistersChanged,
    MemoryChunking,
    MemoryChanged,
    FlagsChanged,
    StackChanged,
    DisassemblyChanged,
    StatusChanged,
    TerminalAppend,
    TerminalClear,
    TerminalPromptRequested,
}

impl EventName {
    pub const ALL: [EventName; 11] = [
        EventName::BinaryLoaded,
        EventName::RegistersChanged,
        EventName::MemoryChunking,
        EventName::MemoryChanged,
        EventName::FlagsChanged,
        EventName::StackChanged,
        EventName::DisassemblyChanged,
        EventName::StatusChanged,
        EventName::TerminalAppend,
        EventName::TerminalClear,
        EventName::TerminalPromptRequested,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::BinaryLoaded => "binary_loaded",
            EventName::RegistersChanged => "registers_changed",
            EventName::MemoryChunking => "memory_chunking",
            EventName::MemoryChanged => "memory_changed",
            EventName::FlagsChanged => "flags_changed",
            EventName::StackChanged => "stack_changed",
            EventName::DisassemblyChanged => "disassembly_changed",
            EventName::StatusChanged => "status_changed",
            EventName::TerminalAppend => "terminal_append",
            EventName::TerminalClear => "terminal_clear",
            EventName::TerminalPromptRequested => "terminal_prompt_requested",
        }
    }

    pub fn from_wire(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == tag)
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EngineEvent {
    pub fn name(&self) -> EventName {
        match self {
            EngineEvent::BinaryLoaded(_) => EventName::BinaryLoaded,
            EngineEvent::RegistersChanged(_) => EventName::RegistersChanged,
            EngineEvent::MemoryChunking => EventName::MemoryChunking,
            EngineEvent::MemoryChanged(_) => EventName::MemoryChanged,
            EngineEvent::FlagsChanged(_) => EventName::FlagsChanged,
            EngineEvent::StackChanged(_) => EventName::StackChanged,
            EngineEvent::DisassemblyChanged(_) => EventName::DisassemblyChanged,
            EngineEvent::StatusChanged(_) => EventName::StatusChanged,
            EngineEvent::TerminalAppend { .. } => EventName::TerminalAppend,
            EngineEvent::TerminalClear => EventName::TerminalClear,
            EngineEvent::TerminalPromptRequested { .. } => EventName::TerminalPromptRequested,
        }
    }
}

/// Frames sent from the debugger to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    Invoke { id: u64, command: EngineCommand },
}

/// Frames sent from the engine to the debugger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EngineFrame {
    Reply { id: u64, reply: CommandReply },
    Failure { id: u64, error: EngineFailure },
    Event(EngineEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunMode;

    #[test]
    fn decodes_status_event_from_engine_json() {
        let raw = r#"{"type":"event","payload":{"type":"status_changed","payload":{"mode":"running","trace":true}}}"#;
        let frame: EngineFrame = serde_json::from_str(raw).expect("decode");
        let EngineFrame::Event(event) = frame else {
            panic!("expected event frame");
        };
        assert_eq!(event.name(), EventName::StatusChanged);
        assert_eq!(
            event,
            EngineEvent::StatusChanged(RunStatus {
                mode: RunMode::Running,
                trace: true
            })
        );
    }

    #[test]
    fn encodes_unit_commands_without_payload() {
        let frame = ClientFrame::Invoke {
            id: 7,
            command: EngineCommand::Step,
        };
        let json = serde_json::to_value(&frame).expect("encode");
        assert_eq!(json["payload"]["id"], 7);
        assert_eq!(json["payload"]["command"]["type"], "step");
    }

    #[test]
    fn decodes_failed_load_event() {
        let raw = r#"{"type":"binary_loaded","payload":{"outcome":"failed","error":"bad magic"}}"#;
        let event: EngineEvent = serde_json::from_str(raw).expect("decode");
        assert_eq!(
            event,
            EngineEvent::BinaryLoaded(LoadOutcome::Failed {
                error: "bad magic".into()
            })
        );
    }

    #[test]
    fn event_names_round_trip_through_wire_tags() {
        for name in EventName::ALL {
            assert_eq!(EventName::from_wire(name.as_str()), Some(name));
        }
    }
}
