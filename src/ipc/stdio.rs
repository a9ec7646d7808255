//! Line-delimited JSON-RPC engine over stdin/stdout.
//!
//! Each input line is handled on its own task, so a slow tool never blocks
//! reading. Responses go through a single writer task and are written in
//! completion order. Diagnostics never touch the output stream.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::sync::CancellationToken;

use super::protocol::{Message, MessageHandler, Response};
use crate::error::SERVER_ERROR;

/// Set by the supervisor in the child's environment.
pub const SUPERVISED_ENV: &str = "NEXUSHUB_SUPERVISED";

/// Resolves on SIGINT or SIGTERM (Ctrl-C elsewhere).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received"),
                    _ = term.recv() => tracing::info!("SIGTERM received"),
                }
            }
            Err(e) => {
                tracing::warn!("Cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Ctrl-C received");
    }
}

/// Run the engine on the process's stdin/stdout until EOF or a shutdown signal.
pub async fn run_stdio<H: MessageHandler>(handler: Arc<H>) -> Result<()> {
    let supervised = std::env::var_os(SUPERVISED_ENV).is_some();
    tracing::info!("Stdio engine started (supervised: {})", supervised);

    serve_lines(
        handler,
        tokio::io::stdin(),
        tokio::io::stdout(),
        shutdown_signal(),
    )
    .await?;

    tracing::info!("Stdio engine stopped");
    Ok(())
}

/// Serve newline-delimited messages from `reader`, writing responses to `writer`.
///
/// Returns the writer once input is exhausted and in-flight calls have
/// completed, or immediately when `shutdown` resolves (pending calls are
/// abandoned and nothing further is written).
pub async fn serve_lines<H, R, W, S>(handler: Arc<H>, reader: R, writer: W, shutdown: S) -> Result<W>
where
    H: MessageHandler,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let (write_tx, write_rx) = mpsc::channel::<String>(64);
    let cancel = CancellationToken::new();
    let writer_handle = tokio::spawn(write_loop(writer, write_rx, cancel.clone()));

    let mut lines = FramedRead::new(reader, line_codec());
    let mut tasks: JoinSet<()> = JoinSet::new();
    tokio::pin!(shutdown);

    let mut interrupted = loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break true,

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),

            next = lines.next() => match next {
                Some(Ok(bytes)) => {
                    let Ok(line) = std::str::from_utf8(&bytes) else {
                        tracing::warn!("Dropping non-UTF-8 line ({} bytes)", bytes.len());
                        continue;
                    };
                    if let Some(message) = decode_line(line, &write_tx).await {
                        let handler = Arc::clone(&handler);
                        let tx = write_tx.clone();
                        tasks.spawn(async move {
                            if let Some(response) = handler.handle(message).await {
                                send_response(&tx, &response).await;
                            }
                        });
                    }
                }
                None => {
                    tracing::debug!("stdin closed");
                    break false;
                }
                Some(Err(e)) => {
                    tracing::error!("stdin read error: {}", e);
                    break false;
                }
            },
        }
    };

    if !interrupted && !tasks.is_empty() {
        tracing::debug!("Waiting for {} in-flight calls", tasks.len());
        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        };
        tokio::select! {
            biased;
            _ = &mut shutdown => interrupted = true,
            _ = drain => {}
        }
    }

    if interrupted {
        tracing::info!("Shutdown requested, abandoning {} in-flight calls", tasks.len());
        tasks.abort_all();
        cancel.cancel();
    }

    drop(write_tx);
    let writer = writer_handle.await?;
    Ok(writer)
}

/// Newline-delimited raw frames; UTF-8 is checked per line so one bad line
/// does not end the stream.
pub(crate) fn line_codec() -> AnyDelimiterCodec {
    AnyDelimiterCodec::new(b"\n".to_vec(), Vec::new())
}

/// Decode one line. Malformed input yields an error response when an id can be
/// salvaged and is otherwise only logged.
async fn decode_line(line: &str, tx: &mpsc::Sender<String>) -> Option<Message> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match Message::from_line(trimmed) {
        Ok(message) => Some(message),
        Err(malformed) => {
            match malformed.id {
                Some(id) => {
                    tracing::warn!("Malformed request (id {}): {}", id, malformed.reason);
                    let response = Response::error(
                        Some(id),
                        SERVER_ERROR,
                        format!("Error processing request: {}", malformed.reason),
                    );
                    send_response(tx, &response).await;
                }
                None => {
                    tracing::warn!(
                        "Dropping malformed line without id: {} ({} bytes)",
                        malformed.reason,
                        trimmed.len()
                    );
                }
            }
            None
        }
    }
}

async fn send_response(tx: &mpsc::Sender<String>, response: &Response) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if tx.send(line).await.is_err() {
                tracing::debug!("Writer closed, response for id {:?} discarded", response.id);
            }
        }
        Err(e) => tracing::error!("Failed to serialize response for id {:?}: {}", response.id, e),
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<String>, cancel: CancellationToken) -> W
where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(line) => line,
                None => break,
            },
        };

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = written {
            tracing::error!("Write error: {}", e);
            break;
        }
    }
    writer
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!("Request task panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::protocol::Method;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Minimal router: `slow` sleeps, `notifications/*` are silent, everything else echoes.
    struct TestHandler;

    #[async_trait]
    impl MessageHandler for TestHandler {
        async fn handle(&self, message: Message) -> Option<Response> {
            match message.kind() {
                Method::Notification(_) => None,
                Method::Unknown(m) if m == "slow" => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Some(Response::success(message.id, json!("slow")))
                }
                _ => Some(Response::success(message.id, json!(message.method))),
            }
        }
    }

    async fn run(input: &str) -> Vec<Value> {
        run_bytes(input.as_bytes()).await
    }

    async fn run_bytes(input: &[u8]) -> Vec<Value> {
        let out = serve_lines(
            Arc::new(TestHandler),
            input,
            Vec::new(),
            std::future::pending::<()>(),
        )
        .await
        .unwrap();

        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_one_response_per_request() {
        let out = run("{\"id\":1,\"method\":\"initialize\"}\n\n   \n{\"id\":2,\"method\":\"tools/list\"}\n").await;
        assert_eq!(out.len(), 2);
        let ids: Vec<Value> = out.iter().map(|r| r["id"].clone()).collect();
        assert!(ids.contains(&json!(1)) && ids.contains(&json!(2)));
    }

    #[tokio::test]
    async fn test_garbage_without_id_is_silent() {
        let out = run("not json at all\n{\"method\":\"x\",\"params\":[\n").await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_with_id_gets_error() {
        let out = run("{\"id\":7,\"params\":{}}\n").await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], json!(7));
        assert_eq!(out[0]["error"]["code"], json!(SERVER_ERROR));
        assert!(out[0]["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Error processing request: "));
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_skipped() {
        let out = run_bytes(b"\xff\xfe garbage\n{\"id\":1,\"method\":\"initialize\"}\n").await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], json!(1));
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let out = run("{\"id\":4,\"method\":\"initialize\"}").await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], json!(4));
    }

    #[tokio::test]
    async fn test_notification_gets_nothing() {
        let out = run("{\"method\":\"notifications/initialized\"}\n").await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_completion_order_not_arrival_order() {
        let out = run("{\"id\":\"s\",\"method\":\"slow\"}\n{\"id\":\"f\",\"method\":\"fast\"}\n").await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["id"], json!("f"));
        assert_eq!(out[1]["id"], json!("s"));
        assert_eq!(out[1]["result"], json!("slow"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_without_output() {
        // Keep the input side open so only the shutdown future can end the engine.
        let (_input_keepalive, input) = tokio::io::duplex(64);
        let out = serve_lines(Arc::new(TestHandler), input, Vec::new(), async {})
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_abandons_in_flight_calls() {
        let (mut client, input) = tokio::io::duplex(256);
        client
            .write_all(b"{\"id\":1,\"method\":\"slow\"}\n")
            .await
            .unwrap();

        let shutdown = tokio::time::sleep(Duration::from_millis(20));
        let out = serve_lines(Arc::new(TestHandler), input, Vec::new(), shutdown)
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
