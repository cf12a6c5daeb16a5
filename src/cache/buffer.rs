//! 缓存块结构
//!
//! 每个缓存块由两部分组成：
//! - [`BufMeta`]：身份、引用计数、释放时间戳和堆位置，受全局元数据锁保护
//! - [`Buffer`]：块内容，受每块独立的内容锁保护
//!
//! 缓存块之间的关系（哈希索引、驱逐堆）全部使用槽位下标表示，
//! 不存在块之间的指针。

use crate::block::BlockId;
use crate::consts::BSIZE;
use alloc::boxed::Box;
use alloc::vec;
use bitflags::bitflags;
use core::sync::atomic::AtomicBool;
use spin::Mutex;

/// 缓存块槽位下标
pub type BufferId = usize;

bitflags! {
    /// 缓存块内容标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheFlags: u8 {
        /// 内容已修改，尚未写回磁盘
        const DIRTY  = 0x01;
        /// 已登记到当前事务，由日志负责写回
        const LOGGED = 0x02;
    }
}

/// 缓存块元数据（受元数据锁保护）
#[derive(Debug, Clone, Copy)]
pub(super) struct BufMeta {
    /// 当前身份；`None` 表示从未分配
    pub id: Option<BlockId>,
    /// 引用计数
    pub refcnt: u32,
    /// 最近一次引用计数归零时的时间戳
    pub stamp: u64,
    /// 在驱逐堆中的位置；`None` 表示不在堆中
    pub heap_pos: Option<usize>,
}

impl BufMeta {
    pub(super) const fn new() -> Self {
        Self {
            id: None,
            refcnt: 0,
            stamp: 0,
            heap_pos: None,
        }
    }
}

/// 缓存块内容（受内容锁保护）
pub struct BufContent {
    pub(super) data: Box<[u8]>,
    pub(super) flags: CacheFlags,
}

impl BufContent {
    fn new() -> Self {
        Self {
            data: vec![0u8; BSIZE].into_boxed_slice(),
            flags: CacheFlags::empty(),
        }
    }
}

/// 缓存块槽位
pub(super) struct Buffer {
    /// 内容是否已从磁盘载入
    ///
    /// 只在元数据锁下清除（重新分配身份时），只在内容锁下置位。
    pub valid: AtomicBool,
    /// 内容锁
    pub content: Mutex<BufContent>,
}

impl Buffer {
    pub(super) fn new() -> Self {
        Self {
            valid: AtomicBool::new(false),
            content: Mutex::new(BufContent::new()),
        }
    }
}
