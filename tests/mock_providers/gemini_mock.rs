//! WebSocket mock of the Gemini Live endpoint
//!
//! Accepts one connection, records every client message and plays a script
//! of server steps.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// One scripted server action.
#[derive(Debug, Clone)]
pub enum ServerStep {
    /// Send a JSON text frame
    Send(Value),
    /// Read client messages until one has this top-level key
    WaitFor(&'static str),
    /// Send a close frame with this reason and stop the script
    Close(String),
}

pub struct MockGeminiServer {
    pub url: String,
    received: Arc<Mutex<Vec<Value>>>,
    request_query: Arc<Mutex<Option<String>>>,
    task: JoinHandle<()>,
}

impl MockGeminiServer {
    /// Bind to an ephemeral local port and serve one connection.
    pub async fn start(script: Vec<ServerStep>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let request_query = Arc::new(Mutex::new(None));

        let task = {
            let received = received.clone();
            let request_query = request_query.clone();
            tokio::spawn(async move {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };

                let capture_query = request_query.clone();
                let callback = move |request: &Request,
                                     response: Response|
                      -> Result<Response, ErrorResponse> {
                    *capture_query.lock() = request.uri().query().map(str::to_string);
                    Ok(response)
                };
                let Ok(ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };
                let (mut write, mut read) = ws.split();

                let record = |text: &str| -> Option<Value> {
                    let value: Value = serde_json::from_str(text).ok()?;
                    received.lock().push(value.clone());
                    Some(value)
                };

                for step in script {
                    match step {
                        ServerStep::Send(value) => {
                            if write
                                .send(Message::Text(value.to_string().into()))
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                        ServerStep::WaitFor(key) => loop {
                            match read.next().await {
                                Some(Ok(Message::Text(text))) => {
                                    if let Some(value) = record(text.as_str())
                                        && value.get(key).is_some()
                                    {
                                        break;
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                                Some(Ok(_)) => {}
                            }
                        },
                        ServerStep::Close(reason) => {
                            let frame = CloseFrame {
                                code: CloseCode::Policy,
                                reason: reason.into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                            return;
                        }
                    }
                }

                // Script done: keep recording until the client goes away.
                while let Some(Ok(message)) = read.next().await {
                    match message {
                        Message::Text(text) => {
                            record(text.as_str());
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            })
        };

        Self {
            url: format!("ws://{addr}/ws"),
            received,
            request_query,
            task,
        }
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    pub fn request_query(&self) -> Option<String> {
        self.request_query.lock().clone()
    }

    /// Poll until a recorded client message has `key`, or give up after `timeout`.
    pub async fn wait_for(&self, key: &str, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self
                .received
                .lock()
                .iter()
                .find(|v| v.get(key).is_some())
                .cloned()
            {
                return Some(found);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait for the server task to finish.
    pub async fn finished(self) {
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}
