//! 内存文件系统
//!
//! 仅用于测试的 [`RemoteFs`] 实现，语义尽量贴近 OpenSSH sftp-server。

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWrite;

use crate::utils::error::SftpError;

use super::fs::{file_name, parent_of, FileInfo, RemoteFs, RemoteReader, RemoteWriter};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    denied: HashSet<String>,
    fail_close: bool,
    closed: bool,
    max_file_size: Option<usize>,
}

/// 内存文件系统
#[derive(Debug, Clone)]
pub struct MemoryFs {
    state: Arc<Mutex<State>>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn parent_key(path: &str) -> String {
    parent_of(path).map(normalize).unwrap_or_else(|| "/".to_string())
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.insert("/".to_string(), Node::Dir);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// 直接写入文件（不检查父目录）
    pub fn put_file(&self, path: &str, content: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.nodes.insert(normalize(path), Node::File(content.to_vec()));
    }

    /// 读取文件内容
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        match state.nodes.get(&normalize(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// 对路径上的所有操作返回权限错误
    pub fn deny(&self, path: &str) {
        self.state.lock().unwrap().denied.insert(normalize(path));
    }

    /// 关闭时返回错误
    pub fn fail_on_close(&self) {
        self.state.lock().unwrap().fail_close = true;
    }

    /// 写入使文件超过 `limit` 字节时返回错误
    pub fn limit_file_size(&self, limit: usize) {
        self.state.lock().unwrap().max_file_size = Some(limit);
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn check(&self, state: &State, op: &str, key: &str) -> Result<(), SftpError> {
        if state.closed {
            return Err(SftpError::session_closed("memory"));
        }
        if state.denied.contains(key) {
            return Err(SftpError::remote_io(op, key, "Permission denied"));
        }
        Ok(())
    }

    fn info(key: &str, node: &Node) -> FileInfo {
        let (size, is_dir, mode) = match node {
            Node::File(data) => (data.len() as u64, false, 0o100644),
            Node::Dir => (0, true, 0o040755),
        };
        FileInfo {
            name: file_name(key).to_string(),
            size,
            mode,
            modified: Some(Utc::now()),
            is_dir,
            is_symlink: false,
        }
    }

    fn writer(&self, key: String) -> RemoteWriter {
        Box::new(MemoryWriter {
            state: self.state.clone(),
            key,
        })
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

/// 写入直接落到内存中的文件节点
struct MemoryWriter {
    state: Arc<Mutex<State>>,
    key: String,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock().unwrap();
        let limit = state.max_file_size;
        match state.nodes.get_mut(&self.key) {
            Some(Node::File(data)) => {
                if limit.is_some_and(|max| data.len() + buf.len() > max) {
                    return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "quota exceeded")));
                }
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(io::Error::new(io::ErrorKind::NotFound, "file removed"))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError> {
        let key = normalize(path);
        let state = self.state.lock().unwrap();
        self.check(&state, "打开远程文件", &key)?;
        match state.nodes.get(&key) {
            Some(Node::File(data)) => Ok(Box::new(io::Cursor::new(data.clone()))),
            Some(Node::Dir) => Err(SftpError::remote_io("打开远程文件", &key, "是目录")),
            None => Err(SftpError::not_found("打开远程文件", &key)),
        }
    }

    async fn create(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        let key = normalize(path);
        {
            let mut state = self.state.lock().unwrap();
            self.check(&state, "创建远程文件", &key)?;
            match state.nodes.get(&parent_key(&key)) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => {
                    return Err(SftpError::remote_io("创建远程文件", &key, "父路径不是目录"))
                }
                None => return Err(SftpError::not_found("创建远程文件", &key)),
            }
            if let Some(Node::Dir) = state.nodes.get(&key) {
                return Err(SftpError::remote_io("创建远程文件", &key, "是目录"));
            }
            state.nodes.insert(key.clone(), Node::File(Vec::new()));
        }
        Ok(self.writer(key))
    }

    async fn open_append(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        let key = normalize(path);
        {
            let state = self.state.lock().unwrap();
            self.check(&state, "打开远程文件", &key)?;
            match state.nodes.get(&key) {
                Some(Node::File(_)) => {}
                Some(Node::Dir) => return Err(SftpError::remote_io("打开远程文件", &key, "是目录")),
                None => return Err(SftpError::not_found("打开远程文件", &key)),
            }
        }
        Ok(self.writer(key))
    }

    async fn create_dir(&self, path: &str) -> Result<(), SftpError> {
        let key = normalize(path);
        let mut state = self.state.lock().unwrap();
        self.check(&state, "创建目录", &key)?;
        if state.nodes.contains_key(&key) {
            return Err(SftpError::remote_io("创建目录", &key, "Failure"));
        }
        match state.nodes.get(&parent_key(&key)) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(SftpError::remote_io("创建目录", &key, "Failure")),
            None => return Err(SftpError::not_found("创建目录", &key)),
        }
        state.nodes.insert(key, Node::Dir);
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>, SftpError> {
        let key = normalize(path);
        let state = self.state.lock().unwrap();
        self.check(&state, "读取目录", &key)?;
        match state.nodes.get(&key) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(SftpError::remote_io("读取目录", &key, "不是目录")),
            None => return Err(SftpError::not_found("读取目录", &key)),
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(k, _)| k.as_str() != "/" && parent_key(k) == key)
            .map(|(k, node)| Self::info(k, node))
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, SftpError> {
        let key = normalize(path);
        let state = self.state.lock().unwrap();
        self.check(&state, "获取文件信息", &key)?;
        state
            .nodes
            .get(&key)
            .map(|node| Self::info(&key, node))
            .ok_or_else(|| SftpError::not_found("获取文件信息", &key))
    }

    async fn lstat(&self, path: &str) -> Result<FileInfo, SftpError> {
        self.stat(path).await
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        let key = normalize(path);
        let mut state = self.state.lock().unwrap();
        self.check(&state, "删除文件", &key)?;
        match state.nodes.get(&key) {
            Some(Node::File(_)) => {}
            Some(Node::Dir) => return Err(SftpError::remote_io("删除文件", &key, "是目录")),
            None => return Err(SftpError::not_found("删除文件", &key)),
        }
        state.nodes.remove(&key);
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        let key = normalize(path);
        let mut state = self.state.lock().unwrap();
        self.check(&state, "删除目录", &key)?;
        match state.nodes.get(&key) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(SftpError::remote_io("删除目录", &key, "不是目录")),
            None => return Err(SftpError::not_found("删除目录", &key)),
        }
        if state.nodes.keys().any(|k| k != "/" && parent_key(k) == key) {
            return Err(SftpError::remote_io("删除目录", &key, "目录非空"));
        }
        state.nodes.remove(&key);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SftpError> {
        let from = normalize(from);
        let to = normalize(to);
        let mut state = self.state.lock().unwrap();
        self.check(&state, "重命名", &from)?;
        if !state.nodes.contains_key(&from) {
            return Err(SftpError::not_found("重命名", &from));
        }
        if state.nodes.contains_key(&to) {
            return Err(SftpError::remote_io("重命名", &to, "目标已存在"));
        }
        if !matches!(state.nodes.get(&parent_key(&to)), Some(Node::Dir)) {
            return Err(SftpError::not_found("重命名", &to));
        }

        let prefix = format!("{}/", from);
        let moved: Vec<String> = state
            .nodes
            .keys()
            .filter(|k| **k == from || k.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = state.nodes.remove(&old) {
                let new = format!("{}{}", to, &old[from.len()..]);
                state.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SftpError> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        if state.fail_close {
            return Err(SftpError::CloseFailed("SFTP: connection lost".to_string()));
        }
        Ok(())
    }
}
