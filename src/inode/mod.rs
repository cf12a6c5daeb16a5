//! Inode 操作模块
//!
//! 这个模块提供内存 inode 表：引用计数、加锁载入和写回。
//! 分配见 [`crate::ialloc`]，块映射与截断见 [`crate::indirect`]。

mod table;

pub use table::{iupdate, Inode, InodeGuard, InodeTable};
