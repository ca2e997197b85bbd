//! 会话管理器
//!
//! 管理多个远程文件会话的创建、查找和关闭。

use std::collections::HashMap;

use crate::rpc::types::SessionInfo;
use crate::ssh::{Credential, SshClientConfig};
use crate::utils::error::SftpError;

use super::session::RemoteFileSession;

struct ManagedSession {
    session: RemoteFileSession,
    info: SessionInfo,
}

/// 会话管理器
pub struct SessionManager {
    /// 会话映射表
    sessions: HashMap<String, ManagedSession>,
}

impl SessionManager {
    /// 创建新的会话管理器
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// 建立连接并注册会话
    pub async fn connect(
        &mut self,
        config: SshClientConfig,
        credential: Credential,
    ) -> Result<String, SftpError> {
        let session = RemoteFileSession::connect(config, credential).await?;
        Ok(self.register(session))
    }

    /// 注册已建立的会话，返回会话 ID
    pub fn register(&mut self, session: RemoteFileSession) -> String {
        // 生成唯一会话 ID
        let session_id = uuid::Uuid::new_v4().to_string();
        let info = SessionInfo {
            id: session_id.clone(),
            address: session.address().to_string(),
            user: session.user().to_string(),
            created_at: chrono::Utc::now(),
        };

        self.sessions
            .insert(session_id.clone(), ManagedSession { session, info });

        tracing::info!("注册会话: {}", session_id);
        session_id
    }

    /// 获取会话引用
    pub fn get(&self, session_id: &str) -> Result<&RemoteFileSession, SftpError> {
        self.sessions
            .get(session_id)
            .map(|managed| &managed.session)
            .ok_or_else(|| SftpError::SessionNotFound(session_id.to_string()))
    }

    /// 关闭并移除会话
    ///
    /// 即使关闭过程出错，会话也会被移除。
    pub async fn close_session(&mut self, session_id: &str) -> Result<(), SftpError> {
        let mut managed = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| SftpError::SessionNotFound(session_id.to_string()))?;

        managed.session.close().await?;

        tracing::info!("关闭会话: {}", session_id);
        Ok(())
    }

    /// 关闭所有会话
    pub async fn close_all(&mut self) {
        for (session_id, mut managed) in self.sessions.drain() {
            if let Err(e) = managed.session.close().await {
                tracing::warn!("关闭会话 {} 失败: {}", session_id, e);
            }
        }
    }

    /// 列出所有会话，按创建时间排序
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.values().map(|m| m.info.clone()).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    /// 获取会话数量
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
