//! 物理块分配模块
//!
//! 基于空闲位图的数据块分配与释放：
//!
//! - [`balloc`] - 分配一个清零的块
//! - [`bfree`] - 释放块，重复释放视为文件系统损坏
//! - [`bzero`] - 清零块
//! - [`count_free`] - 统计空闲块

mod alloc;
mod free;

pub use self::alloc::{balloc, bzero, count_free};
pub use free::bfree;
