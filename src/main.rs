//! SFTP Plugin CLI 入口点
//!
//! 该程序作为独立进程运行，通过 stdin/stdout 与调用方进行 JSON-RPC 通信。
//! 主要功能：
//! - SSH/SFTP 远程会话管理
//! - 远程文件上传、下载、读写和目录操作
//! - JSON-RPC 2.0 协议通信

mod rpc;
mod sftp;
mod ssh;
mod utils;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::rpc::server::RpcServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统，输出到 stderr 避免干扰 JSON-RPC 通信
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    tracing::info!("SFTP Plugin 启动");

    // 创建并运行 RPC 服务器
    let server = RpcServer::new();
    server.run().await?;

    Ok(())
}
