use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::task::events::TaskEvent;
use crate::task::orchestrator::TaskOrchestrator;
use crate::task::record::{CrawlResult, TaskStatus as RecordStatus};

/// Control messages a client may send
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Ping,
    SubscribeTask { task_id: String },
    UnsubscribeTask { task_id: String },
    GetStatus { task_id: String },
}

/// Messages the relay sends to a client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong {
        message: String,
    },
    Subscribed {
        task_id: String,
        message: String,
    },
    Unsubscribed {
        task_id: String,
        message: String,
    },
    TaskUpdate {
        task_id: String,
        status: RecordStatus,
        progress: f64,
        updated_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: String,
        result: Box<CrawlResult>,
    },
    TaskError {
        task_id: String,
        error: String,
    },
    TaskStatus {
        task_id: String,
        status: RecordStatus,
        progress: f64,
        updated_at: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

/// Wire envelope: `{type, data, timestamp}`
#[derive(Serialize)]
struct Outgoing<'a> {
    #[serde(flatten)]
    message: &'a ServerMessage,
    timestamp: DateTime<Utc>,
}

fn envelope(message: &ServerMessage) -> String {
    serde_json::to_string(&Outgoing {
        message,
        timestamp: Utc::now(),
    })
    .unwrap_or_default()
}

/// How an incoming frame failed to parse
#[derive(Debug, PartialEq)]
enum ParseFailure {
    /// Not JSON at all; dropped with a warning, connection stays open
    Malformed,

    /// Known message type with a bad or missing payload
    BadPayload,

    /// Unrecognized message type
    UnknownType(String),
}

fn parse_command(raw: &str) -> Result<ClientCommand, ParseFailure> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ParseFailure::Malformed)?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let task_id = value
        .get("data")
        .and_then(|data| data.get("task_id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    match kind.as_str() {
        "ping" => Ok(ClientCommand::Ping),
        "subscribe_task" => task_id
            .map(|task_id| ClientCommand::SubscribeTask { task_id })
            .ok_or(ParseFailure::BadPayload),
        "unsubscribe_task" => task_id
            .map(|task_id| ClientCommand::UnsubscribeTask { task_id })
            .ok_or(ParseFailure::BadPayload),
        "get_status" => task_id
            .map(|task_id| ClientCommand::GetStatus { task_id })
            .ok_or(ParseFailure::BadPayload),
        _ => Err(ParseFailure::UnknownType(kind)),
    }
}

/// Translate a task event into the push message for subscribers
fn event_message(event: TaskEvent) -> ServerMessage {
    match event {
        TaskEvent::Updated {
            task_id,
            status,
            progress,
            updated_at,
        } => ServerMessage::TaskUpdate {
            task_id,
            status,
            progress,
            updated_at,
        },
        TaskEvent::Completed { task_id, result } => {
            ServerMessage::TaskCompleted { task_id, result }
        }
        TaskEvent::Failed { task_id, error } => ServerMessage::TaskError { task_id, error },
    }
}

/// Handle one decoded client frame. Returns the reply to send, if any.
async fn handle_client_message(
    orchestrator: &TaskOrchestrator,
    subscriptions: &mut HashSet<String>,
    raw: &str,
) -> Option<ServerMessage> {
    match parse_command(raw) {
        Ok(ClientCommand::Ping) => Some(ServerMessage::Pong {
            message: "Server is alive".to_string(),
        }),
        Ok(ClientCommand::SubscribeTask { task_id }) => {
            subscriptions.insert(task_id.clone());
            Some(ServerMessage::Subscribed {
                message: format!("Subscribed to task {task_id}"),
                task_id,
            })
        }
        Ok(ClientCommand::UnsubscribeTask { task_id }) => {
            subscriptions.remove(&task_id);
            Some(ServerMessage::Unsubscribed {
                message: format!("Unsubscribed from task {task_id}"),
                task_id,
            })
        }
        Ok(ClientCommand::GetStatus { task_id }) => match orchestrator.get(&task_id).await {
            Ok(record) => Some(ServerMessage::TaskStatus {
                task_id,
                status: record.status,
                progress: record.progress,
                updated_at: record.updated_at,
            }),
            Err(_) => Some(ServerMessage::Error {
                message: format!("Task {task_id} not found"),
            }),
        },
        Err(ParseFailure::Malformed) => {
            warn!("Dropping malformed WebSocket frame");
            None
        }
        Err(ParseFailure::BadPayload) => Some(ServerMessage::Error {
            message: "task_id is required".to_string(),
        }),
        Err(ParseFailure::UnknownType(kind)) => Some(ServerMessage::Error {
            message: format!("Unknown message type: {kind}"),
        }),
    }
}

/// GET /ws - upgrade to the notification channel
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

/// One task per connection. The subscription set lives here, so nothing is
/// shared between clients and teardown is just dropping the task.
async fn client_session(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    info!("WebSocket client {} connected", client_id);
    state.metrics.client_connected().await;

    let (mut sink, mut stream) = socket.split();
    let mut subscriptions: HashSet<String> = HashSet::new();
    let mut events = state.orchestrator.subscribe();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(
                            &state.orchestrator,
                            &mut subscriptions,
                            &text,
                        )
                        .await;

                        if let Some(reply) = reply {
                            if sink.send(Message::Text(envelope(&reply))).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary and pong frames are ignored
                    Some(Err(e)) => {
                        debug!("WebSocket receive error for {}: {}", client_id, e);
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) if subscriptions.contains(event.task_id()) => {
                        let message = event_message(event);
                        if sink.send(Message::Text(envelope(&message))).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {} // not subscribed to this task
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "WebSocket client {} lagged behind by {} events",
                            client_id, skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    state.metrics.client_disconnected().await;
    info!("WebSocket client {} disconnected", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cli::config::TaskSettings;
    use crate::engine::client::{EngineResponse, MockCrawlEngine};
    use crate::task::config::CrawlConfig;
    use crate::task::store::InMemoryTaskStore;
    use crate::utils::metrics::MetricsCollector;

    fn orchestrator() -> TaskOrchestrator {
        let mut engine = MockCrawlEngine::new();
        engine.expect_crawl().returning(|request| {
            Ok(EngineResponse {
                success: true,
                url: request.url,
                title: Some("Example Domain".to_string()),
                markdown: Some("# Example Domain".to_string()),
                html: None,
                text: None,
                extracted_content: None,
                screenshot: None,
                links: vec![],
                images: vec![],
                metadata: serde_json::json!({}),
                error: None,
            })
        });

        TaskOrchestrator::new(
            InMemoryTaskStore::new(),
            Arc::new(engine),
            TaskSettings {
                max_concurrent_crawls: 2,
                max_batch_urls: 10,
                event_buffer: 64,
                default_quick_timeout_secs: 60,
            },
            MetricsCollector::new(),
        )
    }

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(parse_command(r#"{"type": "ping"}"#), Ok(ClientCommand::Ping));
        assert_eq!(
            parse_command(r#"{"type": "ping", "data": {}}"#),
            Ok(ClientCommand::Ping)
        );

        assert_eq!(
            parse_command(r#"{"type": "subscribe_task", "data": {"task_id": "t-1"}}"#),
            Ok(ClientCommand::SubscribeTask {
                task_id: "t-1".to_string()
            })
        );

        assert_eq!(
            parse_command(r#"{"type": "get_status", "data": {"task_id": "t-2"}}"#),
            Ok(ClientCommand::GetStatus {
                task_id: "t-2".to_string()
            })
        );
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(parse_command("not json at all"), Err(ParseFailure::Malformed));

        assert_eq!(
            parse_command(r#"{"type": "subscribe_task", "data": {}}"#),
            Err(ParseFailure::BadPayload)
        );

        assert_eq!(
            parse_command(r#"{"type": "reboot"}"#),
            Err(ParseFailure::UnknownType("reboot".to_string()))
        );
    }

    #[test]
    fn test_envelope_shape() {
        let message = ServerMessage::Pong {
            message: "Server is alive".to_string(),
        };

        let raw = envelope(&message);
        let value: Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["type"], "pong");
        assert_eq!(value["data"]["message"], "Server is alive");
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_subscribe_then_status_flow() {
        let orchestrator = orchestrator();
        let mut subscriptions = HashSet::new();

        let record = orchestrator
            .create("https://example.com", CrawlConfig::default())
            .await
            .unwrap();

        let subscribe = format!(
            r#"{{"type": "subscribe_task", "data": {{"task_id": "{}"}}}}"#,
            record.task_id
        );
        let reply = handle_client_message(&orchestrator, &mut subscriptions, &subscribe)
            .await
            .unwrap();
        assert!(matches!(reply, ServerMessage::Subscribed { .. }));
        assert!(subscriptions.contains(&record.task_id));

        let status = format!(
            r#"{{"type": "get_status", "data": {{"task_id": "{}"}}}}"#,
            record.task_id
        );
        let reply = handle_client_message(&orchestrator, &mut subscriptions, &status)
            .await
            .unwrap();
        assert!(matches!(reply, ServerMessage::TaskStatus { .. }));

        let unsubscribe = format!(
            r#"{{"type": "unsubscribe_task", "data": {{"task_id": "{}"}}}}"#,
            record.task_id
        );
        handle_client_message(&orchestrator, &mut subscriptions, &unsubscribe)
            .await
            .unwrap();
        assert!(subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_get_status_for_unknown_task_is_error_message() {
        let orchestrator = orchestrator();
        let mut subscriptions = HashSet::new();

        let reply = handle_client_message(
            &orchestrator,
            &mut subscriptions,
            r#"{"type": "get_status", "data": {"task_id": "missing"}}"#,
        )
        .await
        .unwrap();

        match reply {
            ServerMessage::Error { message } => assert!(message.contains("missing")),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped_silently() {
        let orchestrator = orchestrator();
        let mut subscriptions = HashSet::new();

        let reply = handle_client_message(&orchestrator, &mut subscriptions, "{{{").await;
        assert!(reply.is_none());
    }

    /// A subscribed client sees exactly one terminal push for its task and
    /// nothing for tasks it is not subscribed to.
    #[tokio::test]
    async fn test_events_filtered_by_subscription() {
        let orchestrator = orchestrator();
        let mut events = orchestrator.subscribe();

        let watched = orchestrator
            .create("https://example.com/watched", CrawlConfig::default())
            .await
            .unwrap();
        orchestrator
            .create("https://example.com/unrelated", CrawlConfig::default())
            .await
            .unwrap();

        let mut subscriptions = HashSet::new();
        subscriptions.insert(watched.task_id.clone());

        let mut completed_pushes = 0;
        let mut terminal_seen = 0;

        let collect = async {
            while terminal_seen < 2 {
                let Ok(event) = events.recv().await else { break };
                if event.is_terminal() {
                    terminal_seen += 1;
                }

                // Mirror the session loop's filter
                if subscriptions.contains(event.task_id()) {
                    if let ServerMessage::TaskCompleted { task_id, .. } = event_message(event) {
                        assert_eq!(task_id, watched.task_id);
                        completed_pushes += 1;
                    }
                }
            }
        };

        tokio::time::timeout(std::time::Duration::from_secs(30), collect)
            .await
            .expect("tasks did not finish");

        assert_eq!(completed_pushes, 1);
    }
}
