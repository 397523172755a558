use super::*;
use crate::test_support::{loaded_reply, StubGateway};
use shared::protocol::{EngineCommand, EngineEvent, EventName};

#[tokio::test]
async fn attach_wires_every_controller_to_one_store() {
    let gateway = StubGateway::loaded();
    let bus = EventBus::new();

    let session = DebuggerSession::attach(gateway.clone(), Arc::clone(&bus), SessionOptions::default())
        .await
        .expect("attach");

    assert_eq!(session.sync.state().await, SyncState::Synced);
    assert!(session.store.read(|view| view.loaded()).await);
    assert_eq!(bus.handler_count(EventName::TerminalAppend).await, 1);
    assert_eq!(bus.handler_count(EventName::StatusChanged).await, 1);

    bus.dispatch(&EngineEvent::TerminalAppend { text: "> ".into() })
        .await;
    assert_eq!(
        session.store.read(|view| view.terminal.buffer.clone()).await,
        "> "
    );
}

#[tokio::test]
async fn teardown_releases_subscriptions_and_bindings() {
    let gateway = StubGateway::loaded();
    let bus = EventBus::new();
    let session = DebuggerSession::attach(gateway.clone(), Arc::clone(&bus), SessionOptions::default())
        .await
        .expect("attach");

    session.teardown().await;

    for name in EventName::ALL {
        assert_eq!(bus.handler_count(name).await, 0, "{name} still subscribed");
    }
    assert!(session.dispatcher.keymap().await.is_empty());
    assert!(!session.store.read(|view| view.loaded()).await);
}

#[tokio::test]
async fn attach_failure_leaves_no_subscriptions() {
    let gateway = StubGateway::loaded();
    gateway.set_responder(|command| match command {
        EngineCommand::GetSession => Err(EngineError::Transport("refused".into())),
        other => loaded_reply(other),
    });
    let bus = EventBus::new();

    let result = DebuggerSession::attach(gateway, Arc::clone(&bus), SessionOptions::default()).await;

    assert!(matches!(result, Err(EngineError::Transport(_))));
    for name in EventName::ALL {
        assert_eq!(bus.handler_count(name).await, 0);
    }
}
