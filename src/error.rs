//! 错误类型定义
//!
//! 提供块缓存、inode 表和块映射操作的错误类型。

use core::fmt;

/// 文件系统核心操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误
    Io,
    /// 无效参数
    InvalidInput,
    /// 文件系统损坏（魔数不匹配、重复释放等）
    Corrupted,
    /// 不存在
    NotFound,
    /// 磁盘空间不足（无空闲块或空闲 inode）
    NoSpace,
    /// 资源池耗尽（无可驱逐的缓存块或空闲 inode 槽位）
    Busy,
    /// 无效状态
    InvalidState,
    /// 权限错误
    PermissionDenied,
    /// 不支持的操作
    Unsupported,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_display() {
        let err = Error::new(ErrorKind::Busy, "no free buffers");
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(err.message(), "no free buffers");
        assert_eq!(err.to_string(), "Busy: no free buffers");
    }
}
