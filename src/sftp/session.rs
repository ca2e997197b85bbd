//! 远程文件会话
//!
//! 对 [`RemoteFs`] 的薄封装，提供上传、下载、读写、列目录、重命名和删除等操作。
//! 每个操作只尝试一次，第一个错误直接返回给调用者。
//!
//! 会话面向单个调用者：同一会话上不应并发调用。

use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ssh::{Credential, SshClientConfig};
use crate::utils::error::SftpError;

use super::backend::SftpBackend;
use super::fs::{parent_of, FileInfo, RemoteFs};

/// 远程文件会话
///
/// 要么完整连接（协议客户端和传输均有效），要么已关闭。
pub struct RemoteFileSession {
    /// 连接地址（用于日志）
    address: String,
    /// 用户名
    user: String,
    /// 远程文件系统，关闭后为 None
    fs: Option<Box<dyn RemoteFs>>,
}

impl RemoteFileSession {
    /// 在已有的远程文件系统上创建会话
    pub fn new(
        address: impl Into<String>,
        user: impl Into<String>,
        fs: impl RemoteFs + 'static,
    ) -> Self {
        Self {
            address: address.into(),
            user: user.into(),
            fs: Some(Box::new(fs)),
        }
    }

    /// 使用密码连接
    pub async fn connect_with_password(
        address: &str,
        user: &str,
        password: &str,
    ) -> Result<Self, SftpError> {
        let config = SshClientConfig::from_address(address, user)?;
        Self::connect(config, Credential::Password(password.to_string())).await
    }

    /// 使用私钥文件连接
    pub async fn connect_with_private_key(
        address: &str,
        user: &str,
        key_path: &str,
    ) -> Result<Self, SftpError> {
        let config = SshClientConfig::from_address(address, user)?;
        Self::connect(config, Credential::private_key(key_path)).await
    }

    /// 按配置和凭据连接
    pub async fn connect(
        config: SshClientConfig,
        credential: Credential,
    ) -> Result<Self, SftpError> {
        let address = config.address();
        let user = config.user.clone();
        let backend = SftpBackend::connect(config, credential).await?;
        tracing::info!("SFTP 会话已建立: {}@{}", user, address);
        Ok(Self::new(address, user, backend))
    }

    /// 连接地址
    pub fn address(&self) -> &str {
        &self.address
    }

    /// 用户名
    pub fn user(&self) -> &str {
        &self.user
    }

    /// 检查是否已连接
    pub fn is_connected(&self) -> bool {
        self.fs.is_some()
    }

    fn fs(&self) -> Result<&dyn RemoteFs, SftpError> {
        self.fs
            .as_deref()
            .ok_or_else(|| SftpError::session_closed(&self.address))
    }

    /// 关闭会话
    ///
    /// 依次释放协议客户端和传输。已关闭时直接返回成功。
    /// 释放过程中的错误会被记录并合并返回，但会话无论如何都视为已关闭。
    pub async fn close(&mut self) -> Result<(), SftpError> {
        let Some(mut fs) = self.fs.take() else {
            return Ok(());
        };

        tracing::info!("关闭 SFTP 会话: {}@{}", self.user, self.address);
        fs.close().await.map_err(|e| {
            tracing::warn!("关闭 SFTP 会话时出错: {}", e);
            e
        })
    }

    // ============ 文件内容操作 ============

    /// 上传本地文件，必要时创建远程父目录
    ///
    /// 先打开本地文件，本地文件不存在时远程不会有任何改动。返回写入的字节数。
    pub async fn upload_file(&self, local: &Path, remote: &str) -> Result<u64, SftpError> {
        let fs = self.fs()?;

        let mut source = tokio::fs::File::open(local)
            .await
            .map_err(|e| SftpError::local_io("打开本地文件", local, &e))?;

        if let Some(parent) = parent_of(remote) {
            fs.create_dir_all(parent).await?;
        }
        let mut dest = fs.create(remote).await?;

        let bytes = copy_stream(
            &mut source,
            &mut dest,
            |e| SftpError::local_io("读取本地文件", local, &e),
            |e| SftpError::remote_io("写入远程文件", remote, &e.to_string()),
        )
        .await?;
        dest.shutdown()
            .await
            .map_err(|e| SftpError::remote_io("关闭远程文件", remote, &e.to_string()))?;

        tracing::debug!("上传 {} -> {}: {} bytes", local.display(), remote, bytes);
        Ok(bytes)
    }

    /// 下载远程文件，必要时创建本地父目录
    ///
    /// 先打开远程文件，远程文件不存在时本地不会有任何改动。返回写入的字节数。
    pub async fn download_file(&self, remote: &str, local: &Path) -> Result<u64, SftpError> {
        let mut source = self.fs()?.open_read(remote).await?;

        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SftpError::local_io("创建本地目录", parent, &e))?;
        }
        let mut dest = tokio::fs::File::create(local)
            .await
            .map_err(|e| SftpError::local_io("创建本地文件", local, &e))?;

        let bytes = copy_stream(
            &mut source,
            &mut dest,
            |e| SftpError::remote_io("读取远程文件", remote, &e.to_string()),
            |e| SftpError::local_io("写入本地文件", local, &e),
        )
        .await?;
        dest.flush()
            .await
            .map_err(|e| SftpError::local_io("写入本地文件", local, &e))?;

        tracing::debug!("下载 {} -> {}: {} bytes", remote, local.display(), bytes);
        Ok(bytes)
    }

    /// 读取远程文件全部内容
    pub async fn read_file_content(&self, remote: &str) -> Result<Vec<u8>, SftpError> {
        let mut file = self.fs()?.open_read(remote).await?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .await
            .map_err(|e| SftpError::remote_io("读取文件", remote, &e.to_string()))?;
        Ok(content)
    }

    /// 覆盖写入远程文件
    pub async fn update_file(&self, remote: &str, content: &[u8]) -> Result<(), SftpError> {
        let mut file = self.fs()?.create(remote).await?;
        file.write_all(content)
            .await
            .map_err(|e| SftpError::remote_io("写入文件", remote, &e.to_string()))?;
        file.shutdown()
            .await
            .map_err(|e| SftpError::remote_io("关闭远程文件", remote, &e.to_string()))?;
        tracing::debug!("写入 {}: {} bytes", remote, content.len());
        Ok(())
    }

    /// 追加内容到已有的远程文件末尾
    ///
    /// 文件不存在时返回错误，不会自动创建。
    pub async fn append_to_file(&self, remote: &str, content: &[u8]) -> Result<(), SftpError> {
        let mut file = self.fs()?.open_append(remote).await?;
        file.write_all(content)
            .await
            .map_err(|e| SftpError::remote_io("追加文件", remote, &e.to_string()))?;
        file.shutdown()
            .await
            .map_err(|e| SftpError::remote_io("关闭远程文件", remote, &e.to_string()))?;
        tracing::debug!("追加 {}: {} bytes", remote, content.len());
        Ok(())
    }

    // ============ 元数据和目录操作 ============

    /// 递归创建目录，已存在时不报错
    pub async fn create_directory(&self, remote: &str) -> Result<(), SftpError> {
        self.fs()?.create_dir_all(remote).await
    }

    /// 创建空文件，已存在时截断
    pub async fn create_file(&self, remote: &str) -> Result<(), SftpError> {
        let mut file = self.fs()?.create(remote).await?;
        file.shutdown()
            .await
            .map_err(|e| SftpError::remote_io("关闭远程文件", remote, &e.to_string()))
    }

    /// 列出目录的直接子项，按名称排序
    pub async fn list_directory(&self, remote: &str) -> Result<Vec<FileInfo>, SftpError> {
        let mut entries = self.fs()?.read_dir(remote).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// 获取文件信息
    pub async fn get_file_info(&self, remote: &str) -> Result<FileInfo, SftpError> {
        self.fs()?.stat(remote).await
    }

    /// 检查路径是否存在
    ///
    /// 只有"不存在"返回 `Ok(false)`，其他错误（如权限不足）原样返回。
    pub async fn file_exists(&self, remote: &str) -> Result<bool, SftpError> {
        match self.fs()?.stat(remote).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 重命名文件或目录
    pub async fn rename_file(&self, old: &str, new: &str) -> Result<(), SftpError> {
        self.fs()?.rename(old, new).await
    }

    // ============ 删除操作 ============

    /// 删除单个文件
    pub async fn delete_file(&self, remote: &str) -> Result<(), SftpError> {
        self.fs()?.remove_file(remote).await
    }

    /// 删除空目录
    pub async fn delete_directory(&self, remote: &str) -> Result<(), SftpError> {
        self.fs()?.remove_dir(remote).await
    }

    /// 递归删除目录及其内容
    ///
    /// 遇到第一个错误即中止，已删除的部分不会恢复。
    pub async fn delete_directory_recursive(&self, remote: &str) -> Result<(), SftpError> {
        self.fs()?.remove_all(remote).await
    }
}

/// 传输时单次读写的缓冲区大小
const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// 从 `reader` 复制到 `writer`，读写两端的错误分别转换
async fn copy_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    read_error: impl Fn(std::io::Error) -> SftpError,
    write_error: impl Fn(std::io::Error) -> SftpError,
) -> Result<u64, SftpError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await.map_err(&read_error)?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await.map_err(&write_error)?;
        total += n as u64;
    }
}

impl Drop for RemoteFileSession {
    fn drop(&mut self) {
        if self.fs.is_some() {
            tracing::warn!("SFTP 会话被丢弃但未关闭: {}", self.address);
        }
    }
}
