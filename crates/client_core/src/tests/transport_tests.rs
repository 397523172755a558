use super::*;
use crate::{
    events::handler_fn,
    gateway::EngineClient,
    test_support::{loaded_reply, sample_session},
    DebuggerSession, SessionOptions,
};
use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use shared::{
    domain::{RunMode, RunStatus},
    error::{EngineFailure, ErrorCode},
    protocol::{EngineEvent, EventName},
};
use tokio::net::TcpListener;

/// Frames the fake engine sends back for one command; `None` closes the socket.
fn respond(id: u64, command: EngineCommand) -> Option<Vec<EngineFrame>> {
    match command {
        EngineCommand::Stop => None,
        EngineCommand::Run => Some(vec![
            EngineFrame::Event(EngineEvent::StatusChanged(RunStatus {
                mode: RunMode::Running,
                trace: false,
            })),
            EngineFrame::Reply {
                id,
                reply: CommandReply::Ack,
            },
        ]),
        EngineCommand::Load { path } if path == "bad.bin" => Some(vec![EngineFrame::Failure {
            id,
            error: EngineFailure::new(ErrorCode::InvalidBinary, "bad magic"),
        }]),
        other => Some(vec![match loaded_reply(&other) {
            Ok(reply) => EngineFrame::Reply { id, reply },
            Err(err) => EngineFrame::Failure {
                id,
                error: err.into(),
            },
        }]),
    }
}

async fn fake_engine(socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    while let Some(Ok(message)) = receiver.next().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        let Ok(ClientFrame::Invoke { id, command }) = serde_json::from_str::<ClientFrame>(&text)
        else {
            continue;
        };
        let Some(frames) = respond(id, command) else {
            let _ = sender.send(WsMessage::Close(None)).await;
            return;
        };
        for frame in frames {
            let text = serde_json::to_string(&frame).expect("encode frame");
            if sender.send(WsMessage::Text(text)).await.is_err() {
                return;
            }
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(fake_engine)
}

async fn spawn_engine() -> String {
    let app = Router::new().route("/", get(ws_handler));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

#[test]
fn engine_url_is_normalized_to_websocket() {
    assert_eq!(
        engine_ws_url("http://127.0.0.1:7878").expect("http").as_str(),
        "ws://127.0.0.1:7878/"
    );
    assert_eq!(
        engine_ws_url("https://engine.local/dbg").expect("https").scheme(),
        "wss"
    );
    assert_eq!(
        engine_ws_url("ws://localhost:9000").expect("ws").port(),
        Some(9000)
    );
    assert!(engine_ws_url("ftp://engine").is_err());
    assert!(engine_ws_url("ws://").is_err());
}

#[tokio::test]
async fn replies_are_routed_to_their_request() {
    let url = spawn_engine().await;
    let connection = WsEngineConnection::connect(&url, EventBus::new())
        .await
        .expect("connect");
    let engine = EngineClient::new(connection.clone());

    let (session, registers) = tokio::join!(engine.get_session(), engine.get_registers());

    assert_eq!(session.expect("session"), sample_session());
    assert_eq!(registers.expect("registers").len(), 16);
    connection.close().await;
}

#[tokio::test]
async fn failure_frames_become_engine_errors() {
    let url = spawn_engine().await;
    let connection = WsEngineConnection::connect(&url, EventBus::new())
        .await
        .expect("connect");
    let engine = EngineClient::new(connection);

    let err = engine.load("bad.bin").await.expect_err("load fails");

    assert_eq!(err, EngineError::InvalidBinary("bad magic".into()));
}

#[tokio::test]
async fn events_are_dispatched_before_the_reply_that_follows_them() {
    let url = spawn_engine().await;
    let bus = EventBus::new();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    bus.subscribe(
        EventName::StatusChanged,
        handler_fn(move |event| {
            recorder.lock().expect("seen lock").push(event.clone());
            Ok(())
        }),
    )
    .await;
    let connection = WsEngineConnection::connect(&url, bus).await.expect("connect");
    let engine = EngineClient::new(connection);

    engine.run().await.expect("run");

    assert_eq!(
        *seen.lock().expect("seen lock"),
        vec![EngineEvent::StatusChanged(RunStatus {
            mode: RunMode::Running,
            trace: false
        })]
    );
}

#[tokio::test]
async fn closed_connection_fails_pending_and_later_requests() {
    let url = spawn_engine().await;
    let connection = WsEngineConnection::connect(&url, EventBus::new())
        .await
        .expect("connect");
    let engine = EngineClient::new(connection.clone());

    let err = engine.stop().await.expect_err("socket closed");
    assert!(matches!(err, EngineError::Transport(_)));
    assert!(connection.is_closed());

    let err = engine.step().await.expect_err("still closed");
    assert!(matches!(err, EngineError::Transport(_)));
}

#[tokio::test]
async fn session_attaches_over_websocket() {
    let url = spawn_engine().await;
    let bus = EventBus::new();
    let connection = WsEngineConnection::connect(&url, Arc::clone(&bus))
        .await
        .expect("connect");

    let session = DebuggerSession::attach(connection.clone(), bus, SessionOptions::default())
        .await
        .expect("attach");

    let view = session.store.snapshot().await;
    assert!(view.loaded());
    assert_eq!(view.memory.window.cell_count(), 40);
    assert_eq!(view.disassembly.instructions.len(), 3);

    session.dispatcher.run().await.expect("run");
    assert_eq!(session.store.read(|view| view.mode()).await, RunMode::Idle);
    session.teardown().await;
    connection.close().await;
}
