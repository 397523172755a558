//! Command gateway: the only path by which the core issues requests to the engine.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{
        Address, DisassemblyWindow, FlagSet, MemorySnapshot, RegisterFile, RunStatus, Session,
        StackWindow,
    },
    error::EngineError,
    protocol::{CommandReply, EngineCommand},
};
use tracing::debug;

/// Invokes one engine command and resolves with its reply.
///
/// No timeout is applied here; callers that need liveness impose their own.
#[async_trait]
pub trait CommandGateway: Send + Sync {
    async fn invoke(&self, command: EngineCommand) -> Result<CommandReply, EngineError>;
}

macro_rules! expect_reply {
    ($reply:expr, $variant:path, $command:expr) => {
        match $reply {
            $variant(value) => Ok(value),
            other => Err(unexpected_reply($command, &other)),
        }
    };
}

fn unexpected_reply(command: &str, reply: &CommandReply) -> EngineError {
    EngineError::ProtocolViolation(format!(
        "{command} answered with a {} reply",
        reply.kind()
    ))
}

/// Typed surface over a [`CommandGateway`].
#[derive(Clone)]
pub struct EngineClient {
    gateway: Arc<dyn CommandGateway>,
}

impl EngineClient {
    pub fn new(gateway: Arc<dyn CommandGateway>) -> Self {
        Self { gateway }
    }

    async fn call(&self, command: EngineCommand) -> Result<CommandReply, EngineError> {
        let name = command.name();
        debug!(command = name, "invoking engine command");
        let result = self.gateway.invoke(command).await;
        if let Err(err) = &result {
            debug!(command = name, error = %err, "engine command failed");
        }
        result
    }

    /// Side-effecting commands carry no meaningful payload; any reply counts as success.
    async fn call_void(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.call(command).await.map(|_| ())
    }

    pub async fn load(&self, path: &str) -> Result<Session, EngineError> {
        let reply = self
            .call(EngineCommand::Load {
                path: path.to_string(),
            })
            .await?;
        expect_reply!(reply, CommandReply::Session, "load")
    }

    pub async fn get_session(&self) -> Result<Session, EngineError> {
        let reply = self.call(EngineCommand::GetSession).await?;
        expect_reply!(reply, CommandReply::Session, "get_session")
    }

    pub async fn get_registers(&self) -> Result<RegisterFile, EngineError> {
        let reply = self.call(EngineCommand::GetRegisters).await?;
        expect_reply!(reply, CommandReply::Registers, "get_registers")
    }

    pub async fn get_memory(&self, offset: Option<Address>) -> Result<MemorySnapshot, EngineError> {
        let reply = self.call(EngineCommand::GetMemory { offset }).await?;
        expect_reply!(reply, CommandReply::Memory, "get_memory")
    }

    pub async fn get_flags(&self) -> Result<FlagSet, EngineError> {
        let reply = self.call(EngineCommand::GetFlags).await?;
        expect_reply!(reply, CommandReply::Flags, "get_flags")
    }

    pub async fn get_stack(&self) -> Result<StackWindow, EngineError> {
        let reply = self.call(EngineCommand::GetStack).await?;
        expect_reply!(reply, CommandReply::Stack, "get_stack")
    }

    pub async fn get_disassembly(&self) -> Result<DisassemblyWindow, EngineError> {
        let reply = self.call(EngineCommand::GetDisassembly).await?;
        expect_reply!(reply, CommandReply::Disassembly, "get_disassembly")
    }

    pub async fn get_status(&self) -> Result<RunStatus, EngineError> {
        let reply = self.call(EngineCommand::GetStatus).await?;
        expect_reply!(reply, CommandReply::Status, "get_status")
    }

    pub async fn run(&self) -> Result<(), EngineError> {
        self.call_void(EngineCommand::Run).await
    }

    pub async fn step(&self) -> Result<(), EngineError> {
        self.call_void(EngineCommand::Step).await
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.call_void(EngineCommand::Stop).await
    }

    pub async fn reset(&self, path: &str) -> Result<(), EngineError> {
        self.call_void(EngineCommand::Reset {
            path: path.to_string(),
        })
        .await
    }

    pub async fn toggle_trace(&self) -> Result<(), EngineError> {
        self.call_void(EngineCommand::ToggleTrace).await
    }

    pub async fn toggle_breakpoint(&self, address: Address) -> Result<(), EngineError> {
        self.call_void(EngineCommand::ToggleBreakpoint { address })
            .await
    }

    pub async fn add_breakpoint(&self, address: Address) -> Result<(), EngineError> {
        self.call_void(EngineCommand::AddBreakpoint { address }).await
    }

    pub async fn remove_breakpoint(&self, address: Address) -> Result<(), EngineError> {
        self.call_void(EngineCommand::RemoveBreakpoint { address })
            .await
    }

    pub async fn terminal_interrupt(&self, char_code: u32) -> Result<(), EngineError> {
        self.call_void(EngineCommand::TerminalInterrupt { char_code })
            .await
    }

    pub async fn terminal_prompt_submit(&self, line: &str) -> Result<(), EngineError> {
        self.call_void(EngineCommand::TerminalPromptSubmit {
            line: line.to_string(),
        })
        .await
    }
}
