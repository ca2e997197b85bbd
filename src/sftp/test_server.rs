//! 进程内 SSH/SFTP 服务器
//!
//! 仅用于测试：在临时目录上提供 SFTP 子系统，只接受 [`PASSWORD`] 密码认证。

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId};
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use tokio::net::TcpListener;

use crate::ssh::{Credential, HostKeyPolicy, SshClientConfig};

/// 服务器接受的密码
pub const PASSWORD: &str = "correct horse";

/// 服务器行为选项
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// 密码认证前等待的时间
    pub auth_delay: Option<Duration>,
    /// 接受 sftp 子系统请求但从不应答
    pub stall_sftp: bool,
}

/// 运行中的测试服务器
pub struct TestServer {
    /// 监听地址 host:port
    pub address: String,
    /// SFTP 根目录
    pub root: PathBuf,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(ServerOptions::default()).await
    }

    pub async fn start_with(options: ServerOptions) -> Self {
        let root = std::env::temp_dir().join(format!("sftp-server-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let host_key = russh_keys::key::KeyPair::generate_ed25519().unwrap();
        let config = Arc::new(russh::server::Config {
            keys: vec![host_key],
            auth_rejection_time: Duration::from_millis(10),
            ..Default::default()
        });

        let serve_root = root.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = SshHandler {
                    root: serve_root.clone(),
                    options: options.clone(),
                    channels: HashMap::new(),
                    stalled: Vec::new(),
                };
                let config = config.clone();
                tokio::spawn(async move {
                    if let Ok(running) = russh::server::run_stream(config, stream, handler).await {
                        let _ = running.await;
                    }
                });
            }
        });

        Self { address, root }
    }

    /// 信任任意主机密钥的客户端配置
    pub fn config(&self, connect_timeout: u64) -> SshClientConfig {
        SshClientConfig::from_address(&self.address, "tester")
            .unwrap()
            .with_host_key_policy(HostKeyPolicy::AcceptAny)
            .with_connect_timeout(connect_timeout)
    }

    pub fn credential(&self) -> Credential {
        Credential::Password(PASSWORD.to_string())
    }

    /// 远程路径在本地根目录下的位置
    pub fn local(&self, remote: &str) -> PathBuf {
        resolve(&self.root, remote)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn resolve(root: &Path, remote: &str) -> PathBuf {
    root.join(remote.trim_start_matches('/'))
}

struct SshHandler {
    root: PathBuf,
    options: ServerOptions,
    channels: HashMap<ChannelId, Channel<Msg>>,
    // 挂起的 sftp 通道，连接存活期间保持打开
    stalled: Vec<Channel<Msg>>,
}

#[async_trait]
impl russh::server::Handler for SshHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, _user: &str, password: &str) -> Result<Auth, Self::Error> {
        if let Some(delay) = self.options.auth_delay {
            tokio::time::sleep(delay).await;
        }
        if password == PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let channel = match self.channels.remove(&id) {
            Some(channel) if name == "sftp" => channel,
            _ => {
                session.channel_failure(id);
                return Ok(());
            }
        };
        session.channel_success(id);

        if self.options.stall_sftp {
            self.stalled.push(channel);
        } else {
            russh_sftp::server::run(channel.into_stream(), DirSftp::new(self.root.clone())).await;
        }
        Ok(())
    }
}

/// 以本地目录为根的 SFTP 处理器
struct DirSftp {
    root: PathBuf,
    files: HashMap<String, std::fs::File>,
    // 已读完的目录句柄为 None
    dirs: HashMap<String, Option<Vec<File>>>,
    next_handle: u64,
}

impl DirSftp {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            files: HashMap::new(),
            dirs: HashMap::new(),
            next_handle: 0,
        }
    }

    fn path(&self, remote: &str) -> PathBuf {
        resolve(&self.root, remote)
    }

    fn handle(&mut self) -> String {
        self.next_handle += 1;
        format!("h{}", self.next_handle)
    }
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn status(err: std::io::Error) -> StatusCode {
    match err.kind() {
        std::io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        std::io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

impl russh_sftp::server::Handler for DirSftp {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        _version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let file = std::fs::OpenOptions::new()
            .read(pflags.contains(OpenFlags::READ))
            .write(pflags.contains(OpenFlags::WRITE))
            .append(pflags.contains(OpenFlags::APPEND))
            .create(pflags.contains(OpenFlags::CREATE))
            .truncate(pflags.contains(OpenFlags::TRUNCATE))
            .open(self.path(&filename))
            .map_err(status)?;
        let handle = self.handle();
        self.files.insert(handle.clone(), file);
        Ok(Handle { id, handle })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        self.files.remove(&handle);
        self.dirs.remove(&handle);
        Ok(ok(id))
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let file = self.files.get_mut(&handle).ok_or(StatusCode::Failure)?;
        file.seek(SeekFrom::Start(offset)).map_err(status)?;
        let mut data = vec![0; len as usize];
        let n = file.read(&mut data).map_err(status)?;
        if n == 0 {
            return Err(StatusCode::Eof);
        }
        data.truncate(n);
        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let file = self.files.get_mut(&handle).ok_or(StatusCode::Failure)?;
        file.seek(SeekFrom::Start(offset)).map_err(status)?;
        file.write_all(&data).map_err(status)?;
        Ok(ok(id))
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let meta = std::fs::metadata(self.path(&path)).map_err(status)?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&meta),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let meta = std::fs::symlink_metadata(self.path(&path)).map_err(status)?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&meta),
        })
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let mut entries = vec![
            File::new(".", FileAttributes::default()),
            File::new("..", FileAttributes::default()),
        ];
        for entry in std::fs::read_dir(self.path(&path)).map_err(status)? {
            let entry = entry.map_err(status)?;
            let meta = std::fs::symlink_metadata(entry.path()).map_err(status)?;
            let name = entry.file_name().to_string_lossy().to_string();
            entries.push(File::new(name, FileAttributes::from(&meta)));
        }
        let handle = self.handle();
        self.dirs.insert(handle.clone(), Some(entries));
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        match self.dirs.get_mut(&handle) {
            Some(pending) => match pending.take() {
                Some(files) => Ok(Name { id, files }),
                None => Err(StatusCode::Eof),
            },
            None => Err(StatusCode::Failure),
        }
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        std::fs::remove_file(self.path(&filename)).map_err(status)?;
        Ok(ok(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        std::fs::create_dir(self.path(&path)).map_err(status)?;
        Ok(ok(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        std::fs::remove_dir(self.path(&path)).map_err(status)?;
        Ok(ok(id))
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        std::fs::rename(self.path(&oldpath), self.path(&newpath)).map_err(status)?;
        Ok(ok(id))
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        Ok(Name {
            id,
            files: vec![File::dummy(path)],
        })
    }
}
