//! 错误类型定义
//!
//! 定义 SFTP 插件的错误类型，提供描述性错误消息。
//!
//! ## 功能
//! - 定义 SftpError 枚举，涵盖连接、认证、本地 IO 和远程 IO 错误
//! - 实现错误转换（From trait）
//! - 提供错误分类和辅助方法
//! - 支持转换为 JSON-RPC 错误格式

use thiserror::Error;
use crate::rpc::types::JsonRpcError;

/// SFTP 错误类型
#[derive(Debug, Error)]
pub enum SftpError {
    /// SSH 连接失败
    #[error("SSH 连接失败: {0}")]
    SshConnectionFailed(String),

    /// 主机解析失败
    #[error("主机解析失败: {0}")]
    HostResolutionFailed(String),

    /// 连接超时
    #[error("连接超时: {0}")]
    ConnectionTimeout(String),

    /// 主机密钥被拒绝
    #[error("主机密钥验证失败: {0}")]
    HostKeyRejected(String),

    /// 认证失败
    #[error("认证失败: {0}")]
    AuthenticationFailed(String),

    /// 私钥加载失败
    #[error("私钥加载失败: {0}")]
    PrivateKeyLoadFailed(String),

    /// SSH 协议错误
    #[error("SSH 错误: {0}")]
    SshError(String),

    /// SFTP 子系统初始化失败
    #[error("SFTP 初始化失败: {0}")]
    SubsystemFailed(String),

    /// 本地文件操作失败
    #[error("本地 IO 错误: {0}")]
    LocalIo(String),

    /// 远程文件操作失败
    #[error("远程 IO 错误: {0}")]
    RemoteIo(String),

    /// 远程路径不存在
    #[error("路径不存在: {0}")]
    NotFound(String),

    /// 关闭会话时出错
    #[error("关闭会话失败: {0}")]
    CloseFailed(String),

    /// 会话已关闭
    #[error("会话已关闭: {0}")]
    SessionClosed(String),

    /// 会话不存在
    #[error("会话不存在: {0}")]
    SessionNotFound(String),

    /// 无效的请求
    #[error("无效的请求: {0}")]
    InvalidRequest(String),
}

impl From<russh::Error> for SftpError {
    fn from(err: russh::Error) -> Self {
        // 将 russh 错误转换为更友好的错误消息
        let message = match &err {
            russh::Error::Disconnect => "服务器断开连接".to_string(),
            russh::Error::NoCommonKexAlgo => "无法协商密钥交换算法".to_string(),
            russh::Error::NoCommonCipher => "无法协商加密算法".to_string(),
            russh::Error::NoCommonCompression => "无法协商压缩算法".to_string(),
            russh::Error::NoCommonMac => "无法协商 MAC 算法".to_string(),
            russh::Error::NoCommonKeyAlgo => "无法协商密钥算法".to_string(),
            russh::Error::UnknownKey => "服务器密钥未被接受".to_string(),
            _ => err.to_string(),
        };
        SftpError::SshError(message)
    }
}

impl From<SftpError> for JsonRpcError {
    fn from(err: SftpError) -> Self {
        // 使用应用特定的错误码范围 (-32000 到 -32099)
        let code = match &err {
            SftpError::SessionNotFound(_) => -32001,
            SftpError::SessionClosed(_) => -32002,
            SftpError::InvalidRequest(_) => -32602,
            SftpError::SshConnectionFailed(_) => -32020,
            SftpError::AuthenticationFailed(_) => -32021,
            SftpError::ConnectionTimeout(_) => -32022,
            SftpError::HostResolutionFailed(_) => -32023,
            SftpError::PrivateKeyLoadFailed(_) => -32024,
            SftpError::SshError(_) => -32025,
            SftpError::HostKeyRejected(_) => -32026,
            SftpError::SubsystemFailed(_) => -32027,
            SftpError::NotFound(_) => -32030,
            SftpError::RemoteIo(_) => -32031,
            SftpError::LocalIo(_) => -32032,
            SftpError::CloseFailed(_) => -32033,
        };

        JsonRpcError {
            code,
            message: err.to_string(),
            data: Some(serde_json::json!({
                "error_type": err.error_type(),
                "error_code": err.code(),
                "recoverable": err.is_recoverable(),
            })),
        }
    }
}

impl SftpError {
    /// 获取错误码
    pub fn code(&self) -> i32 {
        match self {
            SftpError::SshConnectionFailed(_) => 1002,
            SftpError::SessionNotFound(_) => 1003,
            SftpError::InvalidRequest(_) => 1004,
            SftpError::AuthenticationFailed(_) => 1007,
            SftpError::ConnectionTimeout(_) => 1008,
            SftpError::SessionClosed(_) => 1009,
            SftpError::SshError(_) => 1010,
            SftpError::HostResolutionFailed(_) => 1012,
            SftpError::PrivateKeyLoadFailed(_) => 1013,
            SftpError::HostKeyRejected(_) => 1014,
            SftpError::SubsystemFailed(_) => 1015,
            SftpError::LocalIo(_) => 1020,
            SftpError::RemoteIo(_) => 1021,
            SftpError::NotFound(_) => 1022,
            SftpError::CloseFailed(_) => 1023,
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            SftpError::SshConnectionFailed(_) => "ssh_connection_failed",
            SftpError::HostResolutionFailed(_) => "host_resolution_failed",
            SftpError::ConnectionTimeout(_) => "connection_timeout",
            SftpError::HostKeyRejected(_) => "host_key_rejected",
            SftpError::AuthenticationFailed(_) => "authentication_failed",
            SftpError::PrivateKeyLoadFailed(_) => "private_key_load_failed",
            SftpError::SshError(_) => "ssh_error",
            SftpError::SubsystemFailed(_) => "subsystem_failed",
            SftpError::LocalIo(_) => "local_io",
            SftpError::RemoteIo(_) => "remote_io",
            SftpError::NotFound(_) => "not_found",
            SftpError::CloseFailed(_) => "close_failed",
            SftpError::SessionClosed(_) => "session_closed",
            SftpError::SessionNotFound(_) => "session_not_found",
            SftpError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// 检查是否为可恢复错误
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SftpError::ConnectionTimeout(_)
                | SftpError::HostResolutionFailed(_)
                | SftpError::AuthenticationFailed(_)
        )
    }

    /// 检查是否为"路径不存在"
    pub fn is_not_found(&self) -> bool {
        matches!(self, SftpError::NotFound(_))
    }

    // ============ 连接错误构造辅助方法 ============

    /// 创建 SSH 连接失败错误（包含主机信息）
    pub fn ssh_connection_failed(host: &str, port: u16, reason: &str) -> Self {
        SftpError::SshConnectionFailed(format!(
            "无法连接到 {}:{} - {}",
            host, port, reason
        ))
    }

    /// 创建认证失败错误（包含认证方式）
    pub fn auth_failed(method: &str, reason: &str) -> Self {
        SftpError::AuthenticationFailed(format!(
            "{}认证失败: {}",
            method, reason
        ))
    }

    /// 创建密码认证失败错误
    pub fn password_auth_failed(reason: &str) -> Self {
        Self::auth_failed("密码", reason)
    }

    /// 创建私钥认证失败错误
    pub fn key_auth_failed(key_path: &str, reason: &str) -> Self {
        SftpError::AuthenticationFailed(format!(
            "私钥认证失败 ({}): {}",
            key_path, reason
        ))
    }

    /// 创建私钥加载失败错误
    pub fn key_load_failed(key_path: &str, reason: &str) -> Self {
        SftpError::PrivateKeyLoadFailed(format!(
            "无法加载私钥 {}: {}",
            key_path, reason
        ))
    }

    /// 创建主机解析失败错误
    pub fn host_resolution_failed(host: &str, reason: &str) -> Self {
        SftpError::HostResolutionFailed(format!(
            "无法解析主机 {}: {}",
            host, reason
        ))
    }

    /// 创建连接超时错误
    pub fn connection_timeout(host: &str, port: u16, timeout_secs: u64) -> Self {
        SftpError::ConnectionTimeout(format!(
            "连接 {}:{} 超时 ({}秒)",
            host, port, timeout_secs
        ))
    }

    /// 创建主机密钥拒绝错误
    pub fn host_key_rejected(host: &str, port: u16, reason: &str) -> Self {
        SftpError::HostKeyRejected(format!(
            "{}:{} - {}",
            host, port, reason
        ))
    }

    // ============ 文件操作错误构造辅助方法 ============

    /// 创建本地 IO 错误
    pub fn local_io(operation: &str, path: &std::path::Path, err: &std::io::Error) -> Self {
        SftpError::LocalIo(format!(
            "{} {} 失败: {}",
            operation,
            path.display(),
            err
        ))
    }

    /// 创建远程 IO 错误
    pub fn remote_io(operation: &str, path: &str, reason: &str) -> Self {
        SftpError::RemoteIo(format!(
            "{} {} 失败: {}",
            operation, path, reason
        ))
    }

    /// 创建路径不存在错误
    pub fn not_found(operation: &str, path: &str) -> Self {
        SftpError::NotFound(format!("{} {}", operation, path))
    }

    /// 创建会话关闭错误
    pub fn session_closed(session: &str) -> Self {
        SftpError::SessionClosed(format!("会话 {} 已关闭", session))
    }
}
