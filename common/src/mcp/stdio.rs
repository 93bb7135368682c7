//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! Each line is dispatched on its own task so a slow tool call does not block
//! later requests. Responses are funnelled through one writer task; stdout
//! carries protocol traffic only, logs go to stderr.

use std::future::Future;
use std::io::BufRead;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::handler::{handle_message, McpHandler};
use super::protocol::{JsonRpcResponse, PARSE_ERROR};

/// One raw line, or the read error that ended the input.
type Incoming = std::io::Result<Vec<u8>>;

const INCOMING_CAPACITY: usize = 64;

/// 在进程标准输入输出上提供服务，直到 stdin 关闭或 `shutdown` 完成
///
/// stdin 在独立线程上阻塞读取，关闭时不会等待这次读取结束。
pub async fn serve_stdio<F>(handler: Arc<dyn McpHandler>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let (tx, rx) = mpsc::channel::<Incoming>(INCOMING_CAPACITY);
    std::thread::Builder::new()
        .name("mcp-stdin".into())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            loop {
                let mut line = Vec::new();
                match stdin.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.blocking_send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
        })?;

    serve_incoming(handler, rx, tokio::io::stdout(), shutdown).await?;
    Ok(())
}

/// 基于任意按行读取器与写入器提供服务
///
/// # Arguments
/// * `handler` - MCP 请求处理器
/// * `reader` - 每行一条 JSON-RPC 消息
/// * `writer` - 响应输出，每行一条
/// * `shutdown` - 完成后停止读取新消息
///
/// # Returns
/// 所有进行中的请求都已应答后返回 `writer`。读取错误会在排空之后返回。
pub async fn serve_lines<R, W, F>(
    handler: Arc<dyn McpHandler>,
    mut reader: R,
    writer: W,
    shutdown: F,
) -> std::io::Result<W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()>,
{
    let (tx, rx) = mpsc::channel::<Incoming>(INCOMING_CAPACITY);
    let reader_task = tokio::spawn(async move {
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(Ok(line)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });

    let served = serve_incoming(handler, rx, writer, shutdown).await;
    reader_task.abort();
    served
}

async fn serve_incoming<W, F>(
    handler: Arc<dyn McpHandler>,
    mut incoming: mpsc::Receiver<Incoming>,
    writer: W,
    shutdown: F,
) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<W, std::io::Error>(writer)
    });

    let mut in_flight = JoinSet::new();
    let mut read_error = None;
    tokio::pin!(shutdown);

    loop {
        let next = tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, no longer reading input");
                break;
            }
            next = incoming.recv() => next,
        };
        let line = match next {
            None => break,
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::error!(error = %e, "failed to read input");
                read_error = Some(e);
                break;
            }
        };

        // 非法 UTF-8 与非法 JSON 一样按解析错误应答
        let message: Value = match std::str::from_utf8(&line) {
            Ok(text) if text.trim().is_empty() => continue,
            Ok(text) => match serde_json::from_str(text.trim()) {
                Ok(v) => v,
                Err(e) => {
                    parse_error(&tx, e.to_string());
                    continue;
                }
            },
            Err(e) => {
                parse_error(&tx, e.to_string());
                continue;
            }
        };

        let handler = handler.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            if let Some(resp) = handle_message(handler.as_ref(), message).await {
                match serde_json::to_string(&resp) {
                    Ok(text) => {
                        let _ = tx.send(text);
                    }
                    Err(e) => tracing::error!(error = %e, "failed to encode response"),
                }
            }
        });
    }

    tracing::info!(pending = in_flight.len(), "draining in-flight requests");
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "request task panicked");
        }
    }
    drop(tx);

    let writer = writer_task
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
    match read_error {
        Some(e) => Err(e),
        None => Ok(writer),
    }
}

fn parse_error(tx: &mpsc::UnboundedSender<String>, detail: String) {
    tracing::warn!(error = %detail, "unparseable message on stdin");
    let resp = JsonRpcResponse::error(None, PARSE_ERROR, format!("parse error: {}", detail));
    if let Ok(text) = serde_json::to_string(&resp) {
        let _ = tx.send(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppResult;
    use crate::mcp::protocol::{ServerInfo, ToolDefinition, ToolOutput};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Minimal;

    #[async_trait]
    impl McpHandler for Minimal {
        fn server_info(&self) -> ServerInfo {
            ServerInfo {
                name: "minimal".into(),
                version: "0".into(),
                title: None,
            }
        }

        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::no_arguments("slow", "Answers after 100ms")]
        }

        async fn call_tool(&self, _name: &str, _arguments: Value) -> AppResult<ToolOutput> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(ToolOutput::json(Value::Null))
        }
    }

    fn parse_responses(out: Vec<u8>) -> Vec<Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_lines_are_answered_and_notifications_are_silent() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            "not json\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let out = serve_lines(Arc::new(Minimal), input.as_bytes(), Vec::new(), std::future::pending())
            .await
            .unwrap();
        let responses = parse_responses(out);

        assert_eq!(responses.len(), 3);
        assert!(responses.iter().any(|r| r["id"] == 1));
        assert!(responses.iter().any(|r| r["id"] == 2));
        assert!(responses
            .iter()
            .any(|r| r["error"]["code"] == PARSE_ERROR));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_parse_error() {
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n");
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n");

        let out = serve_lines(
            Arc::new(Minimal),
            std::io::Cursor::new(input),
            Vec::new(),
            std::future::pending(),
        )
            .await
            .unwrap();
        let responses = parse_responses(out);

        assert_eq!(responses.len(), 3);
        assert!(responses.iter().any(|r| r["id"] == 1));
        assert!(responses.iter().any(|r| r["id"] == 2));
        assert!(responses
            .iter()
            .any(|r| r["error"]["code"] == PARSE_ERROR));
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight_calls() {
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"tools/call\",\"params\":{\"name\":\"slow\"}}\n")
            .await
            .unwrap();

        // stdin stays open, only the shutdown signal ends the loop
        let shutdown = tokio::time::sleep(Duration::from_millis(20));
        let out = serve_lines(
            Arc::new(Minimal),
            tokio::io::BufReader::new(server),
            Vec::new(),
            shutdown,
        )
        .await
        .unwrap();
        drop(client);

        let responses = parse_responses(out);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 7);
        assert_eq!(responses[0]["result"]["isError"], false);
    }
}
