//! 文件系统高级 API
//!
//! 把块缓存、inode 表、块映射器和分配器组合成一个挂载实例，
//! 并提供按字节偏移读写 inode 内容的接口。

mod file;
mod filesystem;
mod ops;
mod types;

pub use filesystem::FileSystem;
pub use ops::FsOperations;
pub use types::{FsConfig, NoHal, StatFs, SystemHal};
