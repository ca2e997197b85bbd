//! 主机密钥验证策略
//!
//! 默认使用 OpenSSH known_hosts 文件，拒绝未知或已变更的主机密钥。

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use russh_keys::key::PublicKey;

use crate::utils::error::SftpError;

/// 自定义验证回调：(主机, 端口, 公钥) -> 是否信任
pub type HostKeyCallback = Arc<dyn Fn(&str, u16, &PublicKey) -> bool + Send + Sync>;

/// 主机密钥验证策略
#[derive(Clone, Default)]
pub enum HostKeyPolicy {
    /// 根据 known_hosts 文件验证（默认 ~/.ssh/known_hosts）
    #[default]
    KnownHosts,
    /// 根据指定的 known_hosts 文件验证
    KnownHostsFile(PathBuf),
    /// 只接受给定的 SHA256 指纹
    Fingerprints(Vec<String>),
    /// 自定义回调
    Custom(HostKeyCallback),
    /// 接受任何主机密钥（仅用于测试或开发环境）
    AcceptAny,
}

impl fmt::Debug for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KnownHosts => f.write_str("KnownHosts"),
            Self::KnownHostsFile(path) => f.debug_tuple("KnownHostsFile").field(path).finish(),
            Self::Fingerprints(list) => f.debug_tuple("Fingerprints").field(list).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::AcceptAny => f.write_str("AcceptAny"),
        }
    }
}

impl HostKeyPolicy {
    /// 验证服务器公钥
    ///
    /// 返回 `Ok(true)` 表示信任；未知主机返回 `Ok(false)`；
    /// known_hosts 中记录的密钥与服务器不一致时返回错误。
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> Result<bool, SftpError> {
        match self {
            Self::KnownHosts => russh_keys::check_known_hosts(host, port, key)
                .map_err(|e| SftpError::host_key_rejected(host, port, &e.to_string())),
            Self::KnownHostsFile(path) => {
                russh_keys::check_known_hosts_path(host, port, key, path)
                    .map_err(|e| SftpError::host_key_rejected(host, port, &e.to_string()))
            }
            Self::Fingerprints(allowed) => {
                let fingerprint = key.fingerprint();
                Ok(allowed
                    .iter()
                    .any(|f| f.strip_prefix("SHA256:").unwrap_or(f) == fingerprint))
            }
            Self::Custom(callback) => Ok(callback(host, port, key)),
            Self::AcceptAny => {
                tracing::warn!(
                    "接受服务器密钥（未验证）: {}:{} SHA256:{}",
                    host,
                    port,
                    key.fingerprint()
                );
                Ok(true)
            }
        }
    }
}
