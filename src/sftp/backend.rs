//! SFTP 后端
//!
//! 基于 russh-sftp 实现 [`RemoteFs`]，并持有底层 SSH 传输。

use std::io::SeekFrom;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use russh_sftp::client::error::Error as SftpClientError;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode};
use tokio::io::AsyncSeekExt;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::ssh::{Credential, SshClient, SshClientConfig};
use crate::utils::error::SftpError;

use super::fs::{file_name, FileInfo, RemoteFs, RemoteReader, RemoteWriter};

/// SFTP 后端
///
/// 同时持有协议客户端和 SSH 传输，二者生命周期一致。
pub struct SftpBackend {
    sftp: Mutex<SftpSession>,
    client: Mutex<SshClient>,
}

impl SftpBackend {
    /// 建立 SSH 连接并初始化 SFTP 子系统
    ///
    /// 连接、认证和 SFTP 初始化共用 `connect_timeout` 这一个截止时间。
    /// SFTP 初始化失败时会先断开已建立的传输再返回错误。
    pub async fn connect(
        config: SshClientConfig,
        credential: Credential,
    ) -> Result<Self, SftpError> {
        let deadline = Instant::now() + Duration::from_secs(config.connect_timeout);
        let mut client = SshClient::new(config);
        client.connect_until(credential, deadline).await?;

        let started = tokio::time::timeout_at(deadline, Self::start_sftp(&client))
            .await
            .unwrap_or_else(|_| Err(client.timeout_error()));

        match started {
            Ok(sftp) => Ok(Self {
                sftp: Mutex::new(sftp),
                client: Mutex::new(client),
            }),
            Err(e) => {
                if let Err(disconnect_err) = client.disconnect().await {
                    tracing::warn!("SFTP 初始化失败后断开连接出错: {}", disconnect_err);
                }
                Err(e)
            }
        }
    }

    async fn start_sftp(client: &SshClient) -> Result<SftpSession, SftpError> {
        let channel = client.open_sftp_channel().await?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SftpError::SubsystemFailed(format!("SFTP 握手失败: {}", e)))?;
        tracing::debug!("SFTP 子系统已就绪: {}", client.config().address());
        Ok(sftp)
    }
}

/// 将 russh-sftp 错误转换为 SftpError
///
/// `NoSuchFile` 映射为 NotFound，其他状态码保留为远程 IO 错误。
fn sftp_error(operation: &str, path: &str, err: SftpClientError) -> SftpError {
    match &err {
        SftpClientError::Status(status) if status.status_code == StatusCode::NoSuchFile => {
            SftpError::not_found(operation, path)
        }
        _ => SftpError::remote_io(operation, path, &err.to_string()),
    }
}

fn file_info(name: String, attrs: &FileAttributes) -> FileInfo {
    let modified = attrs
        .mtime
        .and_then(|mtime| Utc.timestamp_opt(i64::from(mtime), 0).single());

    FileInfo {
        name,
        size: attrs.size.unwrap_or(0),
        mode: attrs.permissions.unwrap_or(0),
        modified,
        is_dir: attrs.is_dir(),
        is_symlink: attrs.is_symlink(),
    }
}

#[async_trait]
impl RemoteFs for SftpBackend {
    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError> {
        let sftp = self.sftp.lock().await;
        let file = sftp
            .open(path)
            .await
            .map_err(|e| sftp_error("打开远程文件", path, e))?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        let sftp = self.sftp.lock().await;
        let file = sftp
            .open_with_flags(path, OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE)
            .await
            .map_err(|e| sftp_error("创建远程文件", path, e))?;
        Ok(Box::new(file))
    }

    async fn open_append(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        let sftp = self.sftp.lock().await;
        let mut file = sftp
            .open_with_flags(path, OpenFlags::WRITE | OpenFlags::APPEND)
            .await
            .map_err(|e| sftp_error("打开远程文件", path, e))?;

        // 句柄的写入偏移从 0 开始，需要显式定位到文件末尾
        let size = sftp
            .metadata(path)
            .await
            .map_err(|e| sftp_error("获取文件信息", path, e))?
            .size
            .unwrap_or(0);
        file.seek(SeekFrom::Start(size))
            .await
            .map_err(|e| SftpError::remote_io("定位文件末尾", path, &e.to_string()))?;

        Ok(Box::new(file))
    }

    async fn create_dir(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .lock()
            .await
            .create_dir(path)
            .await
            .map_err(|e| sftp_error("创建目录", path, e))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>, SftpError> {
        let entries = self
            .sftp
            .lock()
            .await
            .read_dir(path)
            .await
            .map_err(|e| sftp_error("读取目录", path, e))?;

        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| file_info(entry.file_name(), &entry.metadata()))
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, SftpError> {
        let attrs = self
            .sftp
            .lock()
            .await
            .metadata(path)
            .await
            .map_err(|e| sftp_error("获取文件信息", path, e))?;
        Ok(file_info(file_name(path).to_string(), &attrs))
    }

    async fn lstat(&self, path: &str) -> Result<FileInfo, SftpError> {
        let attrs = self
            .sftp
            .lock()
            .await
            .symlink_metadata(path)
            .await
            .map_err(|e| sftp_error("获取文件信息", path, e))?;
        Ok(file_info(file_name(path).to_string(), &attrs))
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .lock()
            .await
            .remove_file(path)
            .await
            .map_err(|e| sftp_error("删除文件", path, e))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .lock()
            .await
            .remove_dir(path)
            .await
            .map_err(|e| sftp_error("删除目录", path, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError> {
        self.sftp
            .lock()
            .await
            .rename(from, to)
            .await
            .map_err(|e| sftp_error("重命名", &format!("{} -> {}", from, to), e))
    }

    /// 先关闭 SFTP 客户端，再断开 SSH 传输；两步都会执行
    async fn close(&mut self) -> Result<(), SftpError> {
        let mut failures = Vec::new();

        if let Err(e) = self.sftp.get_mut().close().await {
            failures.push(format!("SFTP: {}", e));
        }
        if let Err(e) = self.client.get_mut().disconnect().await {
            failures.push(e.to_string());
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SftpError::CloseFailed(failures.join("; ")))
        }
    }
}
