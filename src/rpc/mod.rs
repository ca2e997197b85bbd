//! RPC 通信模块
//!
//! 实现 JSON-RPC 2.0 协议的服务器端，通过 stdin/stdout 与调用方通信。

pub mod methods;
pub mod server;
pub mod types;

pub use server::RpcServer;
pub use types::*;
