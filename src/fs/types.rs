//! 文件系统配置和平台接口

use crate::consts::{NBUF, NINODE};
use core::time::Duration;

/// 系统硬件抽象层 trait
///
/// 提供文件系统所需的系统级功能，主要是时间戳支持
pub trait SystemHal {
    /// 获取当前系统时间
    ///
    /// # 返回
    ///
    /// - `Some(Duration)` - 当前时间（从 UNIX 纪元开始）
    /// - `None` - 时间不可用（例如在没有RTC的嵌入式系统中）
    ///
    /// # 示例
    ///
    /// ```ignore
    /// struct MyHal;
    /// impl SystemHal for MyHal {
    ///     fn now() -> Option<Duration> {
    ///         Some(Duration::from_secs(read_rtc()))
    ///     }
    /// }
    /// ```
    fn now() -> Option<Duration>;
}

/// 没有时钟的平台，所有时间戳记为 0
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHal;

impl SystemHal for NoHal {
    fn now() -> Option<Duration> {
        None
    }
}

/// 文件系统配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    /// 块缓存大小（块数）
    pub nbuf: usize,
    /// 内存 inode 表容量
    pub ninode: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            ninode: NINODE,
        }
    }
}

/// 文件系统统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFs {
    /// 总 inode 数
    pub inodes_count: u32,
    /// 空闲 inode 数
    pub free_inodes_count: u32,
    /// 数据块总数
    pub blocks_count: u32,
    /// 空闲块数
    pub free_blocks_count: u32,
    /// 块大小（字节）
    pub block_size: u32,
}
