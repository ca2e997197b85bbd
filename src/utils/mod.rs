//! 工具模块
//!
//! 提供错误类型。

pub mod error;

pub use error::SftpError;
