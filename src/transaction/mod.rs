//! 事务（日志）接口
//!
//! 块缓存在事务模式下不直接写盘，而是把块登记到外部日志，
//! 由日志在提交时统一写回。这里只定义块缓存需要的接口：
//!
//! - `begin_op` / `end_op`：界定一次文件系统操作
//! - `log_write`：把块登记到当前事务，首次登记时缓存块会被钉住
//! - `commit_done`：提交写回结束后通知日志
//!
//! ## 模块结构
//!
//! - `simple` - 内存中的事务记账实现 [`SimpleJournal`]
//!
//! 未启用日志时使用 [`NoJournal`]，所有写入都同步落盘。

mod simple;

pub use simple::SimpleJournal;

use crate::block::BlockId;
use crate::error::{Error, ErrorKind, Result};
use alloc::vec::Vec;

/// 日志接口
pub trait Journal: Send + Sync {
    /// 是否处于事务模式
    ///
    /// 返回 `false` 时块缓存的写入直接落盘。
    fn is_enabled(&self) -> bool;

    /// 开始一次文件系统操作
    ///
    /// 日志空间不足或正在提交时等待。
    fn begin_op(&self) -> Result<()>;

    /// 结束一次文件系统操作
    ///
    /// 最后一个未完成操作结束时返回需要提交的块列表，
    /// 调用者写回这些块后必须调用 [`Journal::commit_done`]。
    fn end_op(&self) -> Result<Option<Vec<BlockId>>>;

    /// 把块登记到当前事务
    ///
    /// 返回 `true` 表示该块第一次被登记（调用者应钉住缓存块），
    /// `false` 表示已被吸收进之前的登记。
    fn log_write(&self, id: BlockId) -> Result<bool>;

    /// 提交写回完成
    fn commit_done(&self);
}

/// 不启用日志
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJournal;

impl Journal for NoJournal {
    fn is_enabled(&self) -> bool {
        false
    }

    fn begin_op(&self) -> Result<()> {
        Ok(())
    }

    fn end_op(&self) -> Result<Option<Vec<BlockId>>> {
        Ok(None)
    }

    fn log_write(&self, _id: BlockId) -> Result<bool> {
        Err(Error::new(ErrorKind::Unsupported, "journal disabled"))
    }

    fn commit_done(&self) {}
}
