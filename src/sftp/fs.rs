//! 远程文件系统接口
//!
//! 定义门面所依赖的最小原语集合。SFTP 实现见 [`super::backend`]，
//! 测试使用内存实现。递归创建和递归删除在原语之上由客户端实现。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::utils::error::SftpError;

/// 远程读取句柄
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// 远程写入句柄
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 文件信息快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// 文件名（不含目录）
    pub name: String,
    /// 文件大小（字节）
    pub size: u64,
    /// 权限位
    pub mode: u32,
    /// 修改时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// 是否为目录
    pub is_dir: bool,
    /// 是否为符号链接
    #[serde(default)]
    pub is_symlink: bool,
}

/// 远程文件系统原语
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// 以只读方式打开文件
    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError>;

    /// 创建文件，已存在时截断
    async fn create(&self, path: &str) -> Result<RemoteWriter, SftpError>;

    /// 以追加方式打开已有文件，写入位置为文件末尾
    async fn open_append(&self, path: &str) -> Result<RemoteWriter, SftpError>;

    /// 创建单层目录
    async fn create_dir(&self, path: &str) -> Result<(), SftpError>;

    /// 列出目录的直接子项（不含 `.` 和 `..`）
    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>, SftpError>;

    /// 获取文件信息（跟随符号链接）
    async fn stat(&self, path: &str) -> Result<FileInfo, SftpError>;

    /// 获取文件信息（不跟随符号链接）
    async fn lstat(&self, path: &str) -> Result<FileInfo, SftpError>;

    /// 删除文件
    async fn remove_file(&self, path: &str) -> Result<(), SftpError>;

    /// 删除空目录
    async fn remove_dir(&self, path: &str) -> Result<(), SftpError>;

    /// 重命名
    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError>;

    /// 释放协议客户端和传输
    async fn close(&mut self) -> Result<(), SftpError>;

    /// 递归创建目录，已存在时成功返回
    async fn create_dir_all(&self, path: &str) -> Result<(), SftpError> {
        match self.stat(path).await {
            Ok(info) if info.is_dir => return Ok(()),
            Ok(_) => return Err(SftpError::remote_io("创建目录", path, "已存在且不是目录")),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        if let Some(parent) = parent_of(path) {
            self.create_dir_all(parent).await?;
        }

        if let Err(e) = self.create_dir(path).await {
            // 并发创建时目录可能已经存在
            return match self.stat(path).await {
                Ok(info) if info.is_dir => Ok(()),
                _ => Err(e),
            };
        }
        Ok(())
    }

    /// 递归删除目录及其全部内容
    ///
    /// 深度优先，遇到第一个错误即中止；已删除的条目不会恢复。
    /// 符号链接只删除链接本身。
    async fn remove_all(&self, path: &str) -> Result<(), SftpError> {
        let info = self.lstat(path).await?;
        if !info.is_dir || info.is_symlink {
            return self.remove_file(path).await;
        }

        for entry in self.read_dir(path).await? {
            let child = join_path(path, &entry.name);
            if entry.is_dir && !entry.is_symlink {
                self.remove_all(&child).await?;
            } else {
                self.remove_file(&child).await?;
            }
        }

        self.remove_dir(path).await
    }
}

/// 取远程路径的父目录
///
/// 根目录、空路径和单段相对路径没有需要创建的父目录。
pub fn parent_of(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => None,
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// 拼接远程路径
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// 远程路径的最后一段
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
