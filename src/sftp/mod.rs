//! SFTP 模块
//!
//! 远程文件会话门面、文件系统原语以及基于 russh-sftp 的实现。

pub mod backend;
pub mod fs;
pub mod manager;
pub mod session;

#[cfg(test)]
pub(crate) mod memory;
#[cfg(test)]
pub(crate) mod test_server;

pub use backend::SftpBackend;
pub use fs::{FileInfo, RemoteFs};
pub use manager::SessionManager;
pub use session::RemoteFileSession;
