//! Line commands read from stdin and their execution against a session.

use std::sync::Arc;

use client_core::{CoreError, DebuggerSession, DispatchOutcome, Key};
use thiserror::Error;
use tracing::warn;

use crate::render::render_view;

pub const HELP: &str = "commands: run | step | stop | reset | trace | load <path> | break <hex> \
| key <chord> | goto <hex> | type <text> | enter | backspace | show | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Run,
    Step,
    Stop,
    Reset,
    Trace,
    Load(String),
    Break(String),
    Key(String),
    Goto(String),
    Type(String),
    Enter,
    Backspace,
    Show,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
}

/// Parses one input line; blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let argument = |name: &'static str| {
        if rest.is_empty() {
            Err(ParseError::MissingArgument(name))
        } else {
            Ok(rest.to_string())
        }
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "run" => ConsoleCommand::Run,
        "step" => ConsoleCommand::Step,
        "stop" => ConsoleCommand::Stop,
        "reset" => ConsoleCommand::Reset,
        "trace" => ConsoleCommand::Trace,
        "load" => ConsoleCommand::Load(argument("load")?),
        "break" => ConsoleCommand::Break(argument("break")?),
        "key" => ConsoleCommand::Key(argument("key")?),
        "goto" => ConsoleCommand::Goto(argument("goto")?),
        "type" => ConsoleCommand::Type(argument("type")?),
        "enter" => ConsoleCommand::Enter,
        "backspace" | "bs" => ConsoleCommand::Backspace,
        "show" => ConsoleCommand::Show,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

fn report(result: Result<(), CoreError>) {
    if let Err(err) = result {
        println!("error: {err}");
    }
}

/// Runs `command`. Run, step and reset are spawned so that `stop` can be
/// issued while they are in flight.
pub async fn execute(session: &Arc<DebuggerSession>, command: ConsoleCommand) -> Flow {
    let dispatcher = Arc::clone(&session.dispatcher);
    match command {
        ConsoleCommand::Run => {
            tokio::spawn(async move { report(dispatcher.run().await) });
        }
        ConsoleCommand::Step => {
            tokio::spawn(async move { report(dispatcher.step().await) });
        }
        ConsoleCommand::Reset => {
            tokio::spawn(async move { report(dispatcher.reset().await) });
        }
        ConsoleCommand::Stop => report(dispatcher.stop().await),
        ConsoleCommand::Trace => report(dispatcher.toggle_trace().await),
        ConsoleCommand::Load(path) => report(dispatcher.load(&path).await.map(|_| ())),
        ConsoleCommand::Break(address) => {
            report(dispatcher.add_breakpoint_from_input(&address).await.map(|_| ()))
        }
        ConsoleCommand::Goto(offset) => report(dispatcher.go_to_address(&offset).await.map(|_| ())),
        ConsoleCommand::Key(chord) => match dispatcher.handle_chord(&chord).await {
            Ok(DispatchOutcome::LoadDialogRequested) => println!("usage: load <path>"),
            Ok(DispatchOutcome::Ignored) => println!("'{chord}' does nothing right now"),
            Ok(DispatchOutcome::BreakpointToggled { address, present }) => {
                println!(
                    "breakpoint {address:08x} {}",
                    if present { "set" } else { "cleared" }
                )
            }
            Ok(DispatchOutcome::Completed) => {}
            Err(err) => println!("error: {err}"),
        },
        ConsoleCommand::Type(text) => {
            for c in text.chars() {
                if let Err(err) = session.terminal.key(Key::Char(c)).await {
                    warn!(error = %err, "terminal key failed");
                    println!("error: {err}");
                    break;
                }
            }
        }
        ConsoleCommand::Enter => {
            if let Err(err) = session.terminal.key(Key::Enter).await {
                println!("error: {err}");
            }
        }
        ConsoleCommand::Backspace => {
            if let Err(err) = session.terminal.key(Key::Backspace).await {
                println!("error: {err}");
            }
        }
        ConsoleCommand::Show => {
            let view = session.store.snapshot().await;
            print!("{}", render_view(&view));
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(parse("  run ").expect("run"), Some(ConsoleCommand::Run));
        assert_eq!(
            parse("load  /tmp/a.elf").expect("load"),
            Some(ConsoleCommand::Load("/tmp/a.elf".into()))
        );
        assert_eq!(
            parse("type hello world").expect("type"),
            Some(ConsoleCommand::Type("hello world".into()))
        );
        assert_eq!(
            parse("KEY ctrl+b").expect("key"),
            Some(ConsoleCommand::Key("ctrl+b".into()))
        );
        assert_eq!(parse("").expect("blank"), None);
        assert_eq!(
            parse("backspace").expect("backspace"),
            Some(ConsoleCommand::Backspace)
        );
        assert_eq!(parse("bs").expect("bs"), Some(ConsoleCommand::Backspace));
    }

    #[test]
    fn rejects_unknown_and_incomplete_commands() {
        assert_eq!(parse("jump 10"), Err(ParseError::Unknown("jump".into())));
        assert_eq!(parse("break"), Err(ParseError::MissingArgument("break")));
        assert_eq!(parse("goto   "), Err(ParseError::MissingArgument("goto")));
    }
}
