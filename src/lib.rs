//! SFTP Plugin 库
//!
//! 提供远程文件会话及其 JSON-RPC 接口。

pub mod rpc;
pub mod sftp;
pub mod ssh;
pub mod utils;
