//! RPC 方法注册和调用
//!
//! 实现 JSON-RPC 方法的注册和分发，每个方法对应远程文件会话的一个操作。

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::{
    ConnectRequest, ConnectResponse, ExistsResponse, JsonRpcError, JsonRpcResponse, PathRequest,
    ReadResponse, RenameRequest, SessionRequest, TransferRequest, TransferResponse, WriteRequest,
};
use crate::sftp::SessionManager;
use crate::ssh::auth::default_identity_files;
use crate::ssh::{Credential, SshClientConfig};
use crate::utils::error::SftpError;

/// RPC 方法处理器
pub struct RpcMethods {
    manager: SessionManager,
}

/// 解析方法参数
fn parse_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("缺少参数"))?;
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("参数解析错误: {}", e)))
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

fn decode_data(data: &str) -> Result<Vec<u8>, JsonRpcError> {
    STANDARD
        .decode(data)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid base64 data: {}", e)))
}

/// 由连接请求构造客户端配置和凭据
///
/// 未指定用户时使用本地用户名；既无密码也无私钥时依次尝试 ~/.ssh 下的默认私钥中的第一个。
fn connect_target(request: ConnectRequest) -> Result<(SshClientConfig, Credential), SftpError> {
    let user = request.user.unwrap_or_else(whoami::username);
    let mut config = SshClientConfig::from_address(&request.address, &user)?;
    if let Some(mode) = request.host_key {
        config = config.with_host_key_policy(mode.into());
    }
    if let Some(timeout) = request.connect_timeout {
        config = config.with_connect_timeout(timeout);
    }

    let credential = match (request.password, request.identity_file) {
        (Some(_), Some(_)) => {
            return Err(SftpError::InvalidRequest(
                "password 和 identity_file 不能同时指定".to_string(),
            ))
        }
        (Some(password), None) => Credential::Password(password),
        (None, Some(path)) => Credential::PrivateKey {
            path,
            passphrase: request.passphrase,
        },
        (None, None) => {
            let path = default_identity_files().into_iter().next().ok_or_else(|| {
                SftpError::InvalidRequest("未提供密码或私钥，且未找到默认私钥".to_string())
            })?;
            tracing::debug!("使用默认私钥: {}", path);
            Credential::PrivateKey {
                path,
                passphrase: request.passphrase,
            }
        }
    };

    Ok((config, credential))
}

impl RpcMethods {
    /// 创建新的方法处理器
    pub fn new() -> Self {
        Self {
            manager: SessionManager::new(),
        }
    }

    /// 调用指定方法
    pub async fn call(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
        id: serde_json::Value,
    ) -> JsonRpcResponse {
        let result = match method {
            "sftp.connect" => self.sftp_connect(params).await,
            "sftp.close" => self.sftp_close(params).await,
            "sftp.sessions" => to_value(self.manager.list_sessions()),
            "file.upload" => self.file_upload(params).await,
            "file.download" => self.file_download(params).await,
            "file.read" => self.file_read(params).await,
            "file.update" => self.file_update(params).await,
            "file.append" => self.file_append(params).await,
            "file.create" => self.file_create(params).await,
            "file.info" => self.file_info(params).await,
            "file.exists" => self.file_exists(params).await,
            "file.rename" => self.file_rename(params).await,
            "file.delete" => self.file_delete(params).await,
            "dir.create" => self.dir_create(params).await,
            "dir.list" => self.dir_list(params).await,
            "dir.delete" => self.dir_delete(params).await,
            "dir.delete_recursive" => self.dir_delete_recursive(params).await,
            _ => Err(JsonRpcError::method_not_found(method)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => {
                tracing::debug!("方法 {} 失败: {}", method, error.message);
                JsonRpcResponse::error(id, error)
            }
        }
    }

    /// 关闭所有会话
    pub async fn shutdown(&mut self) {
        self.manager.close_all().await;
    }

    // ============ 会话 ============

    async fn sftp_connect(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: ConnectRequest = parse_params(params)?;
        let (config, credential) = connect_target(request)?;
        let session_id = self.manager.connect(config, credential).await?;
        to_value(ConnectResponse { session_id })
    }

    async fn sftp_close(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: SessionRequest = parse_params(params)?;
        self.manager.close_session(&request.session_id).await?;
        Ok(serde_json::Value::Null)
    }

    // ============ 文件 ============

    async fn file_upload(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: TransferRequest = parse_params(params)?;
        let bytes = self
            .manager
            .get(&request.session_id)?
            .upload_file(Path::new(&request.local_path), &request.remote_path)
            .await?;
        to_value(TransferResponse { bytes })
    }

    async fn file_download(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: TransferRequest = parse_params(params)?;
        let bytes = self
            .manager
            .get(&request.session_id)?
            .download_file(&request.remote_path, Path::new(&request.local_path))
            .await?;
        to_value(TransferResponse { bytes })
    }

    async fn file_read(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: PathRequest = parse_params(params)?;
        let content = self
            .manager
            .get(&request.session_id)?
            .read_file_content(&request.path)
            .await?;
        to_value(ReadResponse {
            data: STANDARD.encode(content),
        })
    }

    async fn file_update(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: WriteRequest = parse_params(params)?;
        let content = decode_data(&request.data)?;
        self.manager
            .get(&request.session_id)?
            .update_file(&request.path, &content)
            .await?;
        Ok(serde_json::Value::Null)
    }

    async fn file_append(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: WriteRequest = parse_params(params)?;
        let content = decode_data(&request.data)?;
        self.manager
            .get(&request.session_id)?
            .append_to_file(&request.path, &content)
            .await?;
        Ok(serde_json::Value::Null)
    }

    async fn file_create(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: PathRequest = parse_params(params)?;
        self.manager
            .get(&request.session_id)?
            .create_file(&request.path)
            .await?;
        Ok(serde_json::Value::Null)
    }

    async fn file_info(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: PathRequest = parse_params(params)?;
        let info = self
            .manager
            .get(&request.session_id)?
            .get_file_info(&request.path)
            .await?;
        to_value(info)
    }

    async fn file_exists(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: PathRequest = parse_params(params)?;
        let exists = self
            .manager
            .get(&request.session_id)?
            .file_exists(&request.path)
            .await?;
        to_value(ExistsResponse { exists })
    }

    async fn file_rename(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: RenameRequest = parse_params(params)?;
        self.manager
            .get(&request.session_id)?
            .rename_file(&request.from, &request.to)
            .await?;
        Ok(serde_json::Value::Null)
    }

    async fn file_delete(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: PathRequest = parse_params(params)?;
        self.manager
            .get(&request.session_id)?
            .delete_file(&request.path)
            .await?;
        Ok(serde_json::Value::Null)
    }

    // ============ 目录 ============

    async fn dir_create(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: PathRequest = parse_params(params)?;
        self.manager
            .get(&request.session_id)?
            .create_directory(&request.path)
            .await?;
        Ok(serde_json::Value::Null)
    }

    async fn dir_list(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: PathRequest = parse_params(params)?;
        let entries = self
            .manager
            .get(&request.session_id)?
            .list_directory(&request.path)
            .await?;
        to_value(entries)
    }

    async fn dir_delete(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: PathRequest = parse_params(params)?;
        self.manager
            .get(&request.session_id)?
            .delete_directory(&request.path)
            .await?;
        Ok(serde_json::Value::Null)
    }

    async fn dir_delete_recursive(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: PathRequest = parse_params(params)?;
        self.manager
            .get(&request.session_id)?
            .delete_directory_recursive(&request.path)
            .await?;
        Ok(serde_json::Value::Null)
    }
}

impl Default for RpcMethods {
    fn default() -> Self {
        Self::new()
    }
}
