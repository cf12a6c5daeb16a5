//! 内存事务记账
//!
//! 记录当前事务登记过的块、未完成的操作数和提交状态。
//! 同一块在一次事务中多次登记只占用一个日志槽位（吸收）。
//!
//! ## 限制
//!
//! - 不写日志区，不提供崩溃恢复；提交即把块写回原位置
//! - 事务模式可在运行时切换，但只能在没有未完成操作时切换

use super::Journal;
use crate::block::BlockId;
use crate::consts::{LOGSIZE, MAXOPBLOCKS};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

/// 事务状态
#[derive(Debug, Default)]
struct LogState {
    /// 正在执行的操作数
    outstanding: usize,
    /// 是否正在提交
    committing: bool,
    /// 当前事务登记的块
    blocks: Vec<BlockId>,
}

/// 内存事务记账实现
pub struct SimpleJournal {
    enabled: AtomicBool,
    capacity: usize,
    state: Mutex<LogState>,
}

impl SimpleJournal {
    /// 创建日志，容量为 [`LOGSIZE`]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            capacity: LOGSIZE,
            state: Mutex::new(LogState::default()),
        }
    }

    /// 创建指定容量的日志
    ///
    /// 容量至少要容纳一次操作的 [`MAXOPBLOCKS`] 个块。
    pub fn with_capacity(enabled: bool, capacity: usize) -> Result<Self> {
        if capacity < MAXOPBLOCKS {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "log capacity smaller than one operation",
            ));
        }
        Ok(Self {
            enabled: AtomicBool::new(enabled),
            capacity,
            state: Mutex::new(LogState::default()),
        })
    }

    /// 切换事务模式
    ///
    /// 有未完成的操作或未提交的块时返回 `Busy`。
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let state = self.state.lock();
        if state.outstanding > 0 || state.committing || !state.blocks.is_empty() {
            return Err(Error::new(ErrorKind::Busy, "transaction in progress"));
        }
        self.enabled.store(enabled, Ordering::Release);
        log::debug!("[LOG] transaction mode {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    /// 当前事务登记的块数量
    pub fn pending(&self) -> usize {
        self.state.lock().blocks.len()
    }

    /// 正在执行的操作数
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }
}

impl Journal for SimpleJournal {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn begin_op(&self) -> Result<()> {
        loop {
            {
                let mut state = self.state.lock();
                let reserved = (state.outstanding + 1) * MAXOPBLOCKS;
                if !state.committing && state.blocks.len() + reserved <= self.capacity {
                    state.outstanding += 1;
                    return Ok(());
                }
            }
            core::hint::spin_loop();
        }
    }

    fn end_op(&self) -> Result<Option<Vec<BlockId>>> {
        let mut state = self.state.lock();
        if state.outstanding == 0 {
            return Err(Error::new(ErrorKind::InvalidState, "end_op without begin_op"));
        }
        if state.committing {
            return Err(Error::new(ErrorKind::InvalidState, "end_op during commit"));
        }
        state.outstanding -= 1;
        if state.outstanding > 0 || state.blocks.is_empty() {
            return Ok(None);
        }

        state.committing = true;
        let blocks = core::mem::take(&mut state.blocks);
        log::debug!("[LOG] commit {} blocks", blocks.len());
        Ok(Some(blocks))
    }

    fn log_write(&self, id: BlockId) -> Result<bool> {
        let mut state = self.state.lock();
        if state.outstanding == 0 {
            return Err(Error::new(ErrorKind::InvalidState, "log_write outside of transaction"));
        }
        if state.blocks.contains(&id) {
            log::trace!("[LOG] absorb block {}", id.blockno);
            return Ok(false);
        }
        if state.blocks.len() >= self.capacity {
            log::error!("[LOG] transaction exceeds {} blocks", self.capacity);
            return Err(Error::new(ErrorKind::NoSpace, "transaction too big"));
        }
        state.blocks.push(id);
        Ok(true)
    }

    fn commit_done(&self) {
        self.state.lock().committing = false;
    }
}
