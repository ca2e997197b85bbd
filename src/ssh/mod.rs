//! SSH 连接模块
//!
//! 负责 SSH 连接的建立、认证和主机密钥验证。

pub mod auth;
pub mod client;
pub mod host_key;

pub use auth::Credential;
pub use client::{SshClient, SshClientConfig};
pub use host_key::HostKeyPolicy;
