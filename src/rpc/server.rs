//! RPC 服务器实现
//!
//! 通过 stdin/stdout 实现 JSON-RPC 2.0 通信，每行一个请求、一个响应。

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::methods::RpcMethods;
use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// RPC 服务器
pub struct RpcServer {
    methods: Mutex<RpcMethods>,
}

impl RpcServer {
    /// 创建新的 RPC 服务器
    pub fn new() -> Self {
        Self {
            methods: Mutex::new(RpcMethods::new()),
        }
    }

    /// 运行 RPC 服务器，直到 stdin 关闭
    pub async fn run(&self) -> anyhow::Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        self.serve(reader, tokio::io::stdout()).await
    }

    /// 在给定的输入输出上处理请求
    ///
    /// 输入结束时关闭所有会话后返回。
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                // EOF，退出
                tracing::info!("stdin 关闭，退出");
                break;
            }

            let line_trimmed = line.trim();
            if line_trimmed.is_empty() {
                continue;
            }

            let response = self.handle_request(line_trimmed).await;

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(response_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        self.methods.lock().await.shutdown().await;
        Ok(())
    }

    /// 处理单个请求
    async fn handle_request(&self, line: &str) -> JsonRpcResponse {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                return JsonRpcResponse::error(
                    serde_json::Value::Null,
                    JsonRpcError::parse_error(format!("JSON 解析错误: {}", e)),
                );
            }
        };

        // 验证 JSON-RPC 版本
        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("无效的 JSON-RPC 版本"),
            );
        }

        let mut methods = self.methods.lock().await;
        methods.call(&request.method, request.params, request.id).await
    }
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}
