//! SSH 认证
//!
//! 支持密码和私钥认证方式。凭据只在连接时使用，不会保存在会话中。

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use russh_keys::key::KeyPair;

use crate::utils::error::SftpError;

/// 连接凭据
#[derive(Clone)]
pub enum Credential {
    /// 密码认证
    Password(String),
    /// 私钥认证
    PrivateKey {
        /// 私钥文件路径
        path: String,
        /// 私钥密码（可选）
        passphrase: Option<String>,
    },
}

impl Credential {
    /// 私钥凭据（无密码）
    pub fn private_key(path: impl Into<String>) -> Self {
        Self::PrivateKey {
            path: path.into(),
            passphrase: None,
        }
    }

    /// 认证方式名称，用于日志
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::PrivateKey { .. } => "publickey",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(***)"),
            Self::PrivateKey { path, passphrase } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

/// 已解析的凭据
///
/// 私钥在建立网络连接之前加载，任何读取或解析错误都会在拨号前返回。
pub(crate) enum ResolvedCredential {
    Password(String),
    Key { path: String, key: Arc<KeyPair> },
}

impl ResolvedCredential {
    pub(crate) fn resolve(credential: Credential) -> Result<Self, SftpError> {
        match credential {
            Credential::Password(password) => Ok(Self::Password(password)),
            Credential::PrivateKey { path, passphrase } => {
                let key = load_private_key(&path, passphrase.as_deref())?;
                Ok(Self::Key {
                    path,
                    key: Arc::new(key),
                })
            }
        }
    }
}

/// 加载私钥文件
///
/// 支持 OpenSSH 格式和 PEM 格式的私钥。
///
/// # 参数
/// - `path`: 私钥文件路径
/// - `passphrase`: 私钥密码（如果私钥已加密）
pub fn load_private_key(path: &str, passphrase: Option<&str>) -> Result<KeyPair, SftpError> {
    let path = expand_tilde(path);
    let key_path = Path::new(&path);

    if !key_path.exists() {
        return Err(SftpError::key_load_failed(&path, "文件不存在"));
    }

    // 检查文件权限（仅 Unix）
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(key_path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                tracing::warn!(
                    "私钥文件 {} 权限过于宽松 (mode: {:o})，建议设置为 600",
                    path,
                    mode & 0o777
                );
            }
        }
    }

    let key_data = std::fs::read_to_string(key_path).map_err(|e| {
        SftpError::key_load_failed(&path, &format!("无法读取文件: {}", e))
    })?;

    let key = russh_keys::decode_secret_key(&key_data, passphrase).map_err(|e| {
        if passphrase.is_some() {
            return SftpError::key_load_failed(&path, &format!("解析失败（密码可能错误）: {}", e));
        }
        let err_str = e.to_string().to_lowercase();
        if err_str.contains("passphrase") || err_str.contains("encrypted") {
            SftpError::key_load_failed(&path, "私钥已加密，需要提供密码")
        } else {
            SftpError::key_load_failed(&path, &format!("解析失败: {}", e))
        }
    })?;

    tracing::debug!("成功加载私钥: {}", path);
    Ok(key)
}

/// 展开路径中的 ~ 为用户主目录
pub(crate) fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// 获取默认 SSH 私钥路径列表
///
/// 返回 ~/.ssh 下存在的常见私钥文件，按优先级排序。
pub fn default_identity_files() -> Vec<String> {
    let mut paths = Vec::new();

    if let Some(home) = dirs::home_dir() {
        let ssh_dir = home.join(".ssh");

        let key_names = ["id_ed25519", "id_ecdsa", "id_rsa", "identity"];

        for name in key_names {
            let key_path = ssh_dir.join(name);
            if key_path.exists() {
                paths.push(key_path.to_string_lossy().to_string());
            }
        }
    }

    paths
}
