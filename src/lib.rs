//! xv6fs_core: 教学内核文件系统的存储核心
//!
//! 这个库实现一个 xv6 风格文件系统的底层部分：
//! - **块缓存**：固定容量，哈希索引查找，按释放时间戳组织的最小堆做 LRU 淘汰
//! - **inode 表**：固定数量的内存 inode，引用计数加每 inode 内容锁
//! - **块映射**：12 个直接块加一级、二级、三级间接块，按需分配
//! - **位图分配器**：数据块和磁盘 inode 的分配与释放
//!
//! 元数据与内容使用两级锁：元数据锁只保护簿记，持有时间很短且从不等待磁盘；
//! 内容锁保护单个块或 inode，可以跨磁盘 I/O 持有。
//! 调用者拿到的 [`BufGuard`] 和 [`InodeGuard`] 就是持有中的内容锁。
//!
//! # 示例
//!
//! ```rust,ignore
//! use xv6fs_core::{FileSystem, FsConfig, InodeType, MemDevice};
//!
//! let disk = MemDevice::new(1, 2000);
//! xv6fs_core::superblock::format(&disk, 1, &Default::default())?;
//! let fs: FileSystem<_> = FileSystem::mount(disk, 1, FsConfig::default())?;
//!
//! let ip = fs.ialloc(InodeType::File)?;
//! let mut guard = fs.ilock(&ip)?;
//! guard.nlink = 1;
//! fs.writei(&mut guard, 0, b"hello")?;
//! fs.iunlockput(guard, ip)?;
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备抽象
//! - [`cache`] - 块缓存
//! - [`transaction`] - 日志接口
//! - [`superblock`] - Superblock 与格式化
//! - [`inode`] - 内存 inode 表
//! - [`indirect`] - 间接块寻址
//! - [`fs`] - 文件系统高级 API

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 常量定义
pub mod consts;

/// 数据结构定义
pub mod types;

/// 块缓存
pub mod cache;

/// 日志（事务）接口
pub mod transaction;

/// Superblock 操作
pub mod superblock;

/// 位图操作
pub mod bitmap;

/// 块分配
pub mod balloc;

/// Inode 分配
pub mod ialloc;

/// 内存 inode
pub mod inode;

/// Indirect blocks 操作
pub mod indirect;

/// 文件系统高级 API
pub mod fs;

#[cfg(test)]
pub(crate) mod test_support;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDevice, BlockId, DeviceId, MemDevice};

// Cache
pub use cache::{BlockCache, BufGuard, CacheFlags, CacheStats, Pinned, DEFAULT_CACHE_SIZE};

// Transaction
pub use transaction::{Journal, NoJournal, SimpleJournal};

// Superblock
pub use superblock::{format, read_superblock, FormatOptions, Superblock};

// Inode
pub use inode::{Inode, InodeGuard, InodeTable};
pub use types::{DiskInode, FileStat, InodeFlags, InodeType};

// Indirect blocks
pub use indirect::BlockMapper;

// FileSystem
pub use fs::{FileSystem, FsConfig, FsOperations, NoHal, StatFs, SystemHal};
