//! 间接块寻址
//!
//! inode 的 15 个块指针：12 个直接块，之后依次是一级、二级、三级间接块的根。

mod mapper;

pub use mapper::BlockMapper;
