use super::*;
use crate::{
    events::EventBus,
    store::StateStore,
    test_support::{loaded_reply, StubGateway},
};
use shared::{error::EngineError, protocol::EngineCommand};

struct Harness {
    gateway: Arc<StubGateway>,
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    terminal: Arc<TerminalController>,
}

async fn attached() -> Harness {
    let gateway = StubGateway::loaded();
    let store = StateStore::new();
    let bus = EventBus::new();
    let terminal = TerminalController::new(gateway.client(), Arc::clone(&store), Arc::clone(&bus));
    terminal.attach().await;
    Harness {
        gateway,
        store,
        bus,
        terminal,
    }
}

async fn request_prompt(h: &Harness, max_length: u32) {
    h.bus
        .dispatch(&EngineEvent::TerminalPromptRequested { max_length })
        .await;
}

#[tokio::test]
async fn normal_mode_forwards_each_key_as_an_interrupt() {
    let h = attached().await;

    assert_eq!(h.terminal.mode().await, TerminalMode::Normal);
    assert_eq!(
        h.terminal.key(Key::Char('a')).await.expect("char"),
        KeyOutcome::Forwarded(97)
    );
    assert_eq!(
        h.terminal.key(Key::Backspace).await.expect("backspace"),
        KeyOutcome::Forwarded(BACKSPACE_CODE)
    );
    assert_eq!(
        h.terminal.key(Key::Enter).await.expect("enter"),
        KeyOutcome::Forwarded(ENTER_CODE)
    );

    assert_eq!(
        h.gateway.calls(),
        vec![
            EngineCommand::TerminalInterrupt { char_code: 97 },
            EngineCommand::TerminalInterrupt { char_code: 8 },
            EngineCommand::TerminalInterrupt { char_code: 10 },
        ]
    );
}

#[tokio::test]
async fn prompt_collects_a_bounded_line_and_submits_once() {
    let h = attached().await;
    request_prompt(&h, 5).await;
    assert_eq!(
        h.terminal.mode().await,
        TerminalMode::PromptActive { max_length: 5 }
    );

    for c in "hello".chars() {
        assert_eq!(
            h.terminal.key(Key::Char(c)).await.expect("buffer"),
            KeyOutcome::Buffered
        );
    }
    assert_eq!(
        h.terminal.key(Key::Char('!')).await.expect("overflow"),
        KeyOutcome::Dropped
    );
    assert_eq!(
        h.store.read(|view| view.terminal.prompt_input().to_string()).await,
        "hello"
    );

    let outcome = h.terminal.key(Key::Enter).await.expect("submit");

    assert_eq!(outcome, KeyOutcome::Submitted("hello".into()));
    assert_eq!(h.gateway.count("terminal_interrupt"), 0);
    assert_eq!(
        h.gateway.calls(),
        vec![EngineCommand::TerminalPromptSubmit {
            line: "hello".into()
        }]
    );
    assert_eq!(h.terminal.mode().await, TerminalMode::Normal);
}

#[tokio::test]
async fn backspace_edits_the_prompt_line_locally() {
    let h = attached().await;
    request_prompt(&h, 8).await;

    assert_eq!(
        h.terminal.key(Key::Backspace).await.expect("empty"),
        KeyOutcome::Dropped
    );
    h.terminal.key(Key::Char('o')).await.expect("o");
    h.terminal.key(Key::Char('k')).await.expect("k");
    h.terminal.key(Key::Backspace).await.expect("erase");

    assert_eq!(
        h.store.read(|view| view.terminal.prompt_input().to_string()).await,
        "o"
    );
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn submit_without_prompt_is_rejected() {
    let h = attached().await;
    assert_eq!(h.terminal.submit().await, Err(CoreError::NoPrompt));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn failed_submit_keeps_the_prompt() {
    let h = attached().await;
    h.gateway.set_responder(|command| match command {
        EngineCommand::TerminalPromptSubmit { .. } => {
            Err(EngineError::RemoteRejected("input not expected".into()))
        }
        other => loaded_reply(other),
    });
    request_prompt(&h, 4).await;
    h.terminal.key(Key::Char('4')).await.expect("char");
    h.terminal.key(Key::Char('2')).await.expect("char");

    let err = h.terminal.key(Key::Enter).await.expect_err("submit fails");

    assert!(matches!(err, CoreError::Engine(EngineError::RemoteRejected(_))));
    assert_eq!(
        h.terminal.mode().await,
        TerminalMode::PromptActive { max_length: 4 }
    );
    assert_eq!(
        h.store.read(|view| view.terminal.prompt_input().to_string()).await,
        "42"
    );
}

#[tokio::test]
async fn prompt_reopened_during_submit_stays_active() {
    let h = attached().await;
    request_prompt(&h, 4).await;
    h.terminal.key(Key::Char('a')).await.expect("char");
    let gate = h.gateway.hold("terminal_prompt_submit");

    let terminal = Arc::clone(&h.terminal);
    let submitting = tokio::spawn(async move { terminal.submit().await });
    gate.entered().await;
    request_prompt(&h, 3).await;
    gate.release();

    assert_eq!(submitting.await.expect("join").expect("submit"), "a");
    assert_eq!(
        h.terminal.mode().await,
        TerminalMode::PromptActive { max_length: 3 }
    );
    assert_eq!(
        h.terminal.key(Key::Char('b')).await.expect("char"),
        KeyOutcome::Buffered
    );
    assert_eq!(h.gateway.count("terminal_interrupt"), 0);
    assert_eq!(
        h.store.read(|view| view.terminal.prompt_input().to_string()).await,
        "b"
    );
}

#[tokio::test]
async fn append_and_clear_update_the_buffer() {
    let h = attached().await;

    h.bus
        .dispatch(&EngineEvent::TerminalAppend {
            text: "hello ".into(),
        })
        .await;
    h.bus
        .dispatch(&EngineEvent::TerminalAppend {
            text: "world".into(),
        })
        .await;
    assert_eq!(
        h.store.read(|view| view.terminal.buffer.clone()).await,
        "hello world"
    );

    h.bus.dispatch(&EngineEvent::TerminalClear).await;
    assert!(h.store.read(|view| view.terminal.buffer.is_empty()).await);
}

#[tokio::test]
async fn detach_stops_terminal_updates() {
    let h = attached().await;
    h.terminal.detach().await;

    let delivered = h
        .bus
        .dispatch(&EngineEvent::TerminalAppend { text: "x".into() })
        .await;

    assert_eq!(delivered, 0);
    assert!(h.store.read(|view| view.terminal.buffer.is_empty()).await);
}
