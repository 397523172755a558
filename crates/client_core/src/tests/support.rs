//! In-process engine double shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use shared::{
    domain::{
        DisassembledInstruction, DisassemblyWindow, FlagSet, MemorySnapshot, RegisterFile,
        RunStatus, Session, StackEntry, StackWindow,
    },
    error::EngineError,
    protocol::{CommandReply, EngineCommand},
};
use tokio::sync::Notify;

use crate::gateway::{CommandGateway, EngineClient};

type Responder = Box<dyn FnMut(&EngineCommand) -> Result<CommandReply, EngineError> + Send>;

/// Holds one reply until released.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Resolves once the gated command has reached the engine.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

pub struct StubGateway {
    calls: Mutex<Vec<EngineCommand>>,
    responder: Mutex<Responder>,
    gates: Mutex<HashMap<&'static str, Arc<Gate>>>,
}

impl StubGateway {
    pub fn new(
        responder: impl FnMut(&EngineCommand) -> Result<CommandReply, EngineError> + Send + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responder: Mutex::new(Box::new(responder)),
            gates: Mutex::new(HashMap::new()),
        })
    }

    /// An engine with `program.bin` loaded and idle.
    pub fn loaded() -> Arc<Self> {
        Self::new(loaded_reply)
    }

    /// An engine with nothing loaded: every query fails with `NotLoaded`.
    pub fn unloaded() -> Arc<Self> {
        Self::new(|command| match command {
            EngineCommand::GetSession => Ok(CommandReply::Session(Session::unloaded())),
            EngineCommand::GetStatus => Ok(CommandReply::Status(RunStatus::default())),
            EngineCommand::ToggleTrace => Ok(CommandReply::Ack),
            _ => Err(EngineError::NotLoaded),
        })
    }

    pub fn set_responder(
        &self,
        responder: impl FnMut(&EngineCommand) -> Result<CommandReply, EngineError> + Send + 'static,
    ) {
        *self.responder.lock().expect("responder lock") = Box::new(responder);
    }

    /// Holds the next reply to `command` until the returned gate is released.
    pub fn hold(&self, command: &'static str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates
            .lock()
            .expect("gates lock")
            .insert(command, Arc::clone(&gate));
        gate
    }

    pub fn client(self: &Arc<Self>) -> EngineClient {
        EngineClient::new(Arc::clone(self) as Arc<dyn CommandGateway>)
    }

    pub fn calls(&self) -> Vec<EngineCommand> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls().iter().map(EngineCommand::name).collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.call_names().iter().filter(|name| **name == command).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls lock").clear();
    }
}

#[async_trait]
impl CommandGateway for StubGateway {
    async fn invoke(&self, command: EngineCommand) -> Result<CommandReply, EngineError> {
        self.calls.lock().expect("calls lock").push(command.clone());
        let gate = self.gates.lock().expect("gates lock").remove(command.name());
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let mut responder = self.responder.lock().expect("responder lock");
        (*responder)(&command)
    }
}

pub fn sample_session() -> Session {
    Session {
        loaded: true,
        filename: "program.bin".into(),
        checksum: 0x0c0f_fee0,
    }
}

pub fn sample_registers() -> RegisterFile {
    RegisterFile((0..16).map(|i| i * 0x10).collect())
}

pub fn sample_memory() -> MemorySnapshot {
    MemorySnapshot {
        checksum: 0x1234,
        bytes: (0u8..40).collect(),
    }
}

pub fn sample_stack() -> StackWindow {
    StackWindow {
        sp: 0x7ff8,
        entries: vec![
            StackEntry { address: 0x7ff0, value: 1 },
            StackEntry { address: 0x7ff4, value: 2 },
            StackEntry { address: 0x7ff8, value: 3 },
        ],
    }
}

/// Three instructions at 0x1000, 0x1004, 0x1008 with breakpoints at `breakpoints`.
pub fn sample_disassembly(pc: u32, breakpoints: &[u32]) -> DisassemblyWindow {
    DisassemblyWindow {
        pc,
        instructions: [0x1000u32, 0x1004, 0x1008]
            .into_iter()
            .map(|address| DisassembledInstruction {
                has_breakpoint: breakpoints.contains(&address),
                address,
                encoded: 0xe3a0_0000 | address,
                text: format!("mov r0, #{address:#x}"),
            })
            .collect(),
    }
}

pub fn loaded_reply(command: &EngineCommand) -> Result<CommandReply, EngineError> {
    Ok(match command {
        EngineCommand::Load { .. } | EngineCommand::GetSession => {
            CommandReply::Session(sample_session())
        }
        EngineCommand::GetRegisters => CommandReply::Registers(sample_registers()),
        EngineCommand::GetMemory { .. } => CommandReply::Memory(sample_memory()),
        EngineCommand::GetFlags => CommandReply::Flags(FlagSet {
            z: true,
            ..FlagSet::default()
        }),
        EngineCommand::GetStack => CommandReply::Stack(sample_stack()),
        EngineCommand::GetDisassembly => CommandReply::Disassembly(sample_disassembly(0x1000, &[])),
        EngineCommand::GetStatus => CommandReply::Status(RunStatus::default()),
        _ => CommandReply::Ack,
    })
}
