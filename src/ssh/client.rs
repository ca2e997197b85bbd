//! SSH 客户端
//!
//! 使用 russh 建立 SSH 连接，支持密码和私钥认证，并打开 SFTP 子系统通道。

use std::sync::Arc;
use std::time::Duration;

use russh::client::{Config, Handle, Handler, Msg};
use russh::keys::key::PublicKey;
use russh::{Channel, ChannelId, Disconnect};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::utils::error::SftpError;

use super::auth::{Credential, ResolvedCredential};
use super::host_key::HostKeyPolicy;

/// 默认 SSH 端口
pub const DEFAULT_PORT: u16 = 22;

/// 默认连接超时（秒）
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 30;

/// SSH 客户端配置
#[derive(Debug, Clone)]
pub struct SshClientConfig {
    /// 远程主机地址
    pub host: String,
    /// 远程端口（默认 22）
    pub port: u16,
    /// 用户名
    pub user: String,
    /// 连接超时（秒），作为同一个截止时间覆盖拨号、握手、认证和 SFTP 初始化
    pub connect_timeout: u64,
    /// 主机密钥验证策略
    pub host_key_policy: HostKeyPolicy,
}

impl Default for SshClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            host_key_policy: HostKeyPolicy::default(),
        }
    }
}

impl SshClientConfig {
    /// 从 `host:port` 形式的地址创建配置
    ///
    /// 支持 `host`、`host:port` 以及 `[ipv6]:port`，未指定端口时使用 22。
    pub fn from_address(address: &str, user: &str) -> Result<Self, SftpError> {
        let (host, port) = parse_address(address)?;
        Ok(Self {
            host,
            port,
            user: user.to_string(),
            ..Self::default()
        })
    }

    /// 设置主机密钥验证策略
    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// 设置连接超时（秒）
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout = secs;
        self
    }

    /// `host:port` 形式的地址
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// 解析地址为 (主机, 端口)
fn parse_address(address: &str) -> Result<(String, u16), SftpError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(SftpError::host_resolution_failed(address, "地址为空"));
    }

    let invalid_port = |port: &str| {
        SftpError::host_resolution_failed(address, &format!("无效的端口: {}", port))
    };

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| SftpError::host_resolution_failed(address, "缺少 ']'"))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => port.parse().map_err(|_| invalid_port(port))?,
            None if tail.is_empty() => DEFAULT_PORT,
            None => return Err(invalid_port(tail)),
        };
        return Ok((host.to_string(), port));
    }

    match address.rsplit_once(':') {
        // 多个冒号且无方括号：视为裸 IPv6 地址
        Some((host, _)) if host.contains(':') => Ok((address.to_string(), DEFAULT_PORT)),
        Some((host, port)) => {
            let port = port.parse().map_err(|_| invalid_port(port))?;
            Ok((host.to_string(), port))
        }
        None => Ok((address.to_string(), DEFAULT_PORT)),
    }
}

/// SSH 客户端事件处理器
pub struct SshClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl SshClientHandler {
    pub fn new(host: String, port: u16, policy: HostKeyPolicy) -> Self {
        Self { host, port, policy }
    }
}

/// 实现 russh 的 Handler trait
#[async_trait::async_trait]
impl Handler for SshClientHandler {
    type Error = SftpError;

    /// 检查服务器公钥
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        if self.policy.verify(&self.host, self.port, server_public_key)? {
            tracing::debug!("服务器密钥已验证: {}:{}", self.host, self.port);
            return Ok(true);
        }

        tracing::warn!(
            "拒绝未知的服务器密钥: {}:{} SHA256:{}",
            self.host,
            self.port,
            server_public_key.fingerprint()
        );
        Err(SftpError::host_key_rejected(
            &self.host,
            self.port,
            &format!("未知的主机密钥 SHA256:{}", server_public_key.fingerprint()),
        ))
    }

    /// 处理通道关闭
    async fn channel_close(
        &mut self,
        _channel: ChannelId,
        _session: &mut russh::client::Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("SSH 通道已关闭");
        Ok(())
    }
}

/// SSH 客户端
///
/// 封装 russh 客户端连接，提供连接、认证、打开 SFTP 通道和断开功能。
pub struct SshClient {
    /// 客户端配置
    config: SshClientConfig,
    /// SSH 会话句柄
    handle: Option<Handle<SshClientHandler>>,
}

impl SshClient {
    /// 创建新的 SSH 客户端
    pub fn new(config: SshClientConfig) -> Self {
        Self {
            config,
            handle: None,
        }
    }

    /// 连接到远程服务器并认证
    ///
    /// 凭据在拨号前解析（私钥在此时读取），连接成功后即被丢弃。
    /// 认证失败时已建立的传输会被断开，不会留下半开的连接。
    pub async fn connect(&mut self, credential: Credential) -> Result<(), SftpError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.connect_timeout);
        self.connect_until(credential, deadline).await
    }

    /// 在给定截止时间前完成连接和认证
    ///
    /// 调用方可以用同一个截止时间约束后续的子系统初始化。
    pub async fn connect_until(
        &mut self,
        credential: Credential,
        deadline: Instant,
    ) -> Result<(), SftpError> {
        tracing::info!(
            "连接到 SSH 服务器: {}@{}:{} ({})",
            self.config.user,
            self.config.host,
            self.config.port,
            credential.method_name()
        );

        let credential = ResolvedCredential::resolve(credential)?;

        let handle = tokio::time::timeout_at(deadline, self.establish(credential))
            .await
            .map_err(|_| self.timeout_error())??;

        self.handle = Some(handle);

        tracing::info!("SSH 连接成功: {}@{}", self.config.user, self.config.host);
        Ok(())
    }

    /// 连接阶段超时错误
    pub fn timeout_error(&self) -> SftpError {
        SftpError::connection_timeout(
            &self.config.host,
            self.config.port,
            self.config.connect_timeout,
        )
    }

    /// 建立 TCP 连接、完成握手并认证
    async fn establish(
        &self,
        credential: ResolvedCredential,
    ) -> Result<Handle<SshClientHandler>, SftpError> {
        let host = &self.config.host;
        let port = self.config.port;

        // 解析地址
        let addr = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| SftpError::host_resolution_failed(host, &e.to_string()))?
            .next()
            .ok_or_else(|| SftpError::host_resolution_failed(host, "无法解析为有效地址"))?;

        // 建立 TCP 连接
        let tcp = TcpStream::connect(addr).await.map_err(|e| {
            SftpError::ssh_connection_failed(host, port, &format!("TCP 连接失败: {}", e))
        })?;

        let ssh_config = Arc::new(Config::default());
        let handler =
            SshClientHandler::new(host.clone(), port, self.config.host_key_policy.clone());

        // 建立 SSH 连接
        let mut handle = russh::client::connect_stream(ssh_config, tcp, handler)
            .await
            .map_err(|e| match e {
                SftpError::HostKeyRejected(_) => e,
                other => SftpError::ssh_connection_failed(
                    host,
                    port,
                    &format!("SSH 握手失败: {}", other),
                ),
            })?;

        if let Err(e) = self.authenticate(&mut handle, credential).await {
            if let Err(disconnect_err) = handle
                .disconnect(Disconnect::ByApplication, "Authentication failed", "en")
                .await
            {
                tracing::debug!("认证失败后断开连接出错: {}", disconnect_err);
            }
            return Err(e);
        }

        Ok(handle)
    }

    /// 执行认证
    async fn authenticate(
        &self,
        handle: &mut Handle<SshClientHandler>,
        credential: ResolvedCredential,
    ) -> Result<(), SftpError> {
        let user = &self.config.user;

        match credential {
            ResolvedCredential::Password(password) => {
                tracing::debug!("使用密码认证");
                let auth_result = handle
                    .authenticate_password(user, password)
                    .await
                    .map_err(|e| {
                        SftpError::password_auth_failed(&format!("认证请求失败: {}", e))
                    })?;

                if !auth_result {
                    return Err(SftpError::password_auth_failed("密码被服务器拒绝"));
                }
            }
            ResolvedCredential::Key { path, key } => {
                tracing::debug!("使用私钥认证: {}", path);
                let auth_result = handle
                    .authenticate_publickey(user, key)
                    .await
                    .map_err(|e| {
                        SftpError::key_auth_failed(&path, &format!("认证请求失败: {}", e))
                    })?;

                if !auth_result {
                    return Err(SftpError::key_auth_failed(&path, "私钥被服务器拒绝"));
                }
            }
        }

        tracing::info!("SSH 认证成功");
        Ok(())
    }

    /// 打开会话通道并请求 sftp 子系统
    pub async fn open_sftp_channel(&self) -> Result<Channel<Msg>, SftpError> {
        let handle = self.handle.as_ref().ok_or_else(|| {
            SftpError::ssh_connection_failed(&self.config.host, self.config.port, "未建立连接")
        })?;

        let channel = handle.channel_open_session().await.map_err(|e| {
            SftpError::SubsystemFailed(format!("打开会话通道失败: {}", e))
        })?;

        channel
            .request_subsystem(false, "sftp")
            .await
            .map_err(|e| SftpError::SubsystemFailed(format!("请求 sftp 子系统失败: {}", e)))?;

        Ok(channel)
    }

    /// 获取配置
    pub fn config(&self) -> &SshClientConfig {
        &self.config
    }

    /// 检查是否已连接
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// 断开连接
    ///
    /// 未连接时直接返回成功。
    pub async fn disconnect(&mut self) -> Result<(), SftpError> {
        if let Some(handle) = self.handle.take() {
            tracing::info!("断开 SSH 连接: {}", self.config.host);
            handle
                .disconnect(Disconnect::ByApplication, "Client disconnecting", "en")
                .await
                .map_err(|e| {
                    SftpError::SshConnectionFailed(format!("断开连接失败: {}", e))
                })?;
        }
        Ok(())
    }
}

impl Drop for SshClient {
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::warn!("SSH 客户端被丢弃但未断开连接");
        }
    }
}
