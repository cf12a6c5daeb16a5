//! 块设备核心类型

use crate::error::Result;

/// 设备号
pub type DeviceId = u32;

/// 块标识：(设备号, 块号)
///
/// 块缓存以此作为哈希索引的键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    /// 设备号
    pub dev: DeviceId,
    /// 块号
    pub blockno: u32,
}

impl BlockId {
    /// 创建块标识
    pub const fn new(dev: DeviceId, blockno: u32) -> Self {
        Self { dev, blockno }
    }
}

/// 块设备接口
///
/// 实现此 trait 以提供底层磁盘读写原语。每次调用读写一个完整的块，
/// 调用在 I/O 完成前阻塞。接口使用 `&self`，多个执行上下文可以
/// 并发地对不同的块发起 I/O；实现者自行负责内部同步。
///
/// # 示例
///
/// ```rust,ignore
/// use xv6fs_core::{BlockDevice, BlockId, Result};
///
/// struct VirtioDisk {
///     // ...
/// }
///
/// impl BlockDevice for VirtioDisk {
///     fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
///         // 提交读请求并等待完成
///         Ok(())
///     }
///
///     fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
///         // 提交写请求并等待完成
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 读取一个块
    ///
    /// # 参数
    ///
    /// * `id` - 块标识
    /// * `buf` - 目标缓冲区（大小为 `BSIZE`）
    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()>;

    /// 写入一个块
    ///
    /// # 参数
    ///
    /// * `id` - 块标识
    /// * `buf` - 源缓冲区（大小为 `BSIZE`）
    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()>;

    /// 刷新设备缓存
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
