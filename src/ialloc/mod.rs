//! Inode 分配模块
//!
//! 线性扫描磁盘 inode 区，类型字段为零即空闲。

mod alloc;

pub use self::alloc::{count_free_inodes, ialloc};
