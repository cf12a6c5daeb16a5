//! Superblock 操作模块
//!
//! 这个模块提供 superblock 的解析、验证和空文件系统的创建。

mod format;
mod read;

pub use format::{format, layout, FormatOptions};
pub use read::{read_superblock, Superblock, SUPERBLOCK_SIZE};
