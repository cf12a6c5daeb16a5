//! 块缓存实现
//!
//! 固定数量的缓存块，按 (设备号, 块号) 建立哈希索引，
//! 引用计数归零的块进入驱逐堆，按释放时间戳做 LRU 回收。
//!
//! # 锁
//!
//! - 元数据锁：保护身份、引用计数、时间戳、哈希索引和驱逐堆。
//!   只做短小的记账，不在持有期间做 I/O，也不在持有期间等待内容锁。
//! - 内容锁：每块一个，保护块数据。[`BufGuard`] 就是持有中的内容锁，
//!   可以跨越磁盘 I/O 持有。
//!
//! 获取流程：元数据锁下查找或回收 → 释放元数据锁 → 获取内容锁。
//! 释放流程：元数据锁下递减引用计数（归零则盖时间戳入堆）→ 释放内容锁。
//! 回收者在拿到内容锁之前无法观察到块内容，因此顺序是安全的。

use super::buffer::{BufContent, BufMeta, Buffer, BufferId, CacheFlags};
use super::hash_index::HashIndex;
use super::heap::EvictionHeap;
use crate::block::{BlockDevice, BlockId};
use crate::consts::NBUF;
use crate::error::{Error, ErrorKind, Result};
use crate::transaction::{Journal, NoJournal};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::{Mutex, MutexGuard};

/// 默认缓存块数量
pub const DEFAULT_CACHE_SIZE: usize = NBUF;

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 回收了已有身份的缓存块的次数
    pub evictions: u64,
    /// 物理读次数
    pub disk_reads: u64,
    /// 物理写次数
    pub disk_writes: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 元数据锁保护的状态
pub(super) struct CacheMeta {
    slots: Vec<BufMeta>,
    index: HashIndex,
    heap: EvictionHeap,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheMeta {
    fn new(nbuf: usize) -> Self {
        let mut meta = Self {
            slots: alloc::vec![BufMeta::new(); nbuf],
            index: HashIndex::new(nbuf),
            heap: EvictionHeap::with_capacity(nbuf),
            clock: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        };
        for id in 0..nbuf {
            meta.heap.push(&mut meta.slots, id);
        }
        meta
    }

    /// 查找或回收缓存块，返回 (槽位, 是否更换了身份)
    fn get(&mut self, id: BlockId) -> Result<(BufferId, bool)> {
        if let Some(slot) = self.index.get(id) {
            self.hits += 1;
            self.slots[slot].refcnt += 1;
            if self.slots[slot].refcnt == 1 {
                self.heap.remove(&mut self.slots, slot);
            }
            log::trace!(
                "[BCACHE] get dev={} block={} HIT slot={} ref={}",
                id.dev,
                id.blockno,
                slot,
                self.slots[slot].refcnt
            );
            return Ok((slot, false));
        }

        self.misses += 1;
        while let Some(slot) = self.heap.pop_min(&mut self.slots) {
            if self.slots[slot].refcnt != 0 {
                log::error!(
                    "[BCACHE] buffer {} in eviction heap with ref={}",
                    slot,
                    self.slots[slot].refcnt
                );
                continue;
            }
            if let Some(old) = self.slots[slot].id.take() {
                self.index.remove(old);
                self.evictions += 1;
                log::debug!(
                    "[BCACHE] evict dev={} block={} from slot {}",
                    old.dev,
                    old.blockno,
                    slot
                );
            }
            if let Err(err) = self.index.insert(id, slot) {
                self.heap.push(&mut self.slots, slot);
                return Err(err);
            }
            self.slots[slot].id = Some(id);
            self.slots[slot].refcnt = 1;
            log::trace!("[BCACHE] get dev={} block={} MISS slot={}", id.dev, id.blockno, slot);
            return Ok((slot, true));
        }

        log::error!(
            "[BCACHE] no buffers: all {} buffers are referenced",
            self.slots.len()
        );
        Err(Error::new(ErrorKind::Busy, "bget: no buffers"))
    }

    /// 释放一个引用，归零时盖时间戳并入堆
    fn put(&mut self, slot: BufferId) {
        let meta = &mut self.slots[slot];
        debug_assert!(meta.refcnt > 0, "release of unreferenced buffer {}", slot);
        if meta.refcnt == 0 {
            log::error!("[BCACHE] release of unreferenced buffer {}", slot);
            return;
        }
        meta.refcnt -= 1;
        if meta.refcnt == 0 {
            self.clock += 1;
            meta.stamp = self.clock;
            self.heap.push(&mut self.slots, slot);
        }
    }
}

/// 持有中的缓存块
///
/// 存在期间独占块内容；离开作用域时释放引用。
pub struct BufGuard<'a> {
    meta: &'a Mutex<CacheMeta>,
    buffer: &'a Buffer,
    slot: BufferId,
    id: BlockId,
    content: MutexGuard<'a, BufContent>,
}

impl BufGuard<'_> {
    /// 块标识
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// 块号
    pub fn blockno(&self) -> u32 {
        self.id.blockno
    }

    /// 块数据
    pub fn data(&self) -> &[u8] {
        &self.content.data
    }

    /// 可修改的块数据，同时标记为脏
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.content.flags.insert(CacheFlags::DIRTY);
        &mut self.content.data
    }

    /// 内容是否已从磁盘载入
    pub fn is_valid(&self) -> bool {
        self.buffer.valid.load(Ordering::Acquire)
    }

    /// 是否有未写回的修改
    pub fn is_dirty(&self) -> bool {
        self.content.flags.contains(CacheFlags::DIRTY)
    }

    /// 是否已登记到当前事务
    pub fn is_logged(&self) -> bool {
        self.content.flags.contains(CacheFlags::LOGGED)
    }
}

impl core::fmt::Debug for BufGuard<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufGuard")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .field("flags", &self.content.flags)
            .finish()
    }
}

impl Drop for BufGuard<'_> {
    fn drop(&mut self) {
        // 内容锁在本函数返回后随字段一起释放
        self.meta.lock().put(self.slot);
    }
}

/// 钉住缓存块的凭证
///
/// 钉住期间引用计数不为零，块不会被回收。必须交还给 [`BlockCache::unpin`]。
#[must_use = "pinned buffers stay resident until unpinned"]
#[derive(Debug)]
pub struct Pinned {
    slot: BufferId,
    id: BlockId,
}

impl Pinned {
    /// 被钉住的块
    pub fn id(&self) -> BlockId {
        self.id
    }
}

/// 块缓存
///
/// `J` 为日志实现；不使用日志时为 [`NoJournal`]，写入同步落盘。
pub struct BlockCache<D: BlockDevice, J: Journal = NoJournal> {
    device: D,
    journal: J,
    meta: Mutex<CacheMeta>,
    buffers: Box<[Buffer]>,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

impl<D: BlockDevice> BlockCache<D> {
    /// 创建不带日志的块缓存
    pub fn new(device: D, nbuf: usize) -> Result<Self> {
        Self::with_journal(device, NoJournal, nbuf)
    }
}

impl<D: BlockDevice, J: Journal> BlockCache<D, J> {
    /// 创建块缓存
    ///
    /// # 参数
    ///
    /// * `device` - 块设备
    /// * `journal` - 日志
    /// * `nbuf` - 缓存块数量
    pub fn with_journal(device: D, journal: J, nbuf: usize) -> Result<Self> {
        if nbuf == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "cache needs at least one buffer"));
        }
        let buffers: Vec<Buffer> = (0..nbuf).map(|_| Buffer::new()).collect();
        log::debug!("[BCACHE] init with {} buffers", nbuf);
        Ok(Self {
            device,
            journal,
            meta: Mutex::new(CacheMeta::new(nbuf)),
            buffers: buffers.into_boxed_slice(),
            disk_reads: AtomicU64::new(0),
            disk_writes: AtomicU64::new(0),
        })
    }

    /// 块设备
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 日志
    pub fn journal(&self) -> &J {
        &self.journal
    }

    /// 获取缓存块（不读盘）
    ///
    /// 返回时持有内容锁，内容可能尚未载入（见 [`BufGuard::is_valid`]）。
    /// 所有缓存块都被引用时返回 `Busy`。
    pub fn acquire(&self, id: BlockId) -> Result<BufGuard<'_>> {
        let slot = {
            let mut meta = self.meta.lock();
            let (slot, recycled) = meta.get(id)?;
            if recycled {
                self.buffers[slot].valid.store(false, Ordering::Release);
            }
            slot
        };

        let buffer = &self.buffers[slot];
        let mut content = buffer.content.lock();
        if !buffer.valid.load(Ordering::Acquire) {
            content.flags = CacheFlags::empty();
        }
        Ok(BufGuard {
            meta: &self.meta,
            buffer,
            slot,
            id,
            content,
        })
    }

    /// 读取块
    ///
    /// 内容未载入时从磁盘读取；命中时不产生磁盘 I/O。
    pub fn read(&self, id: BlockId) -> Result<BufGuard<'_>> {
        let mut buf = self.acquire(id)?;
        if !buf.is_valid() {
            self.device.read_block(id, &mut buf.content.data)?;
            self.disk_reads.fetch_add(1, Ordering::Relaxed);
            buf.buffer.valid.store(true, Ordering::Release);
        }
        Ok(buf)
    }

    /// 写入块
    ///
    /// 事务模式下登记到日志（第一次登记时钉住缓存块），否则同步写盘。
    pub fn write(&self, buf: &mut BufGuard<'_>) -> Result<()> {
        if !self.journal.is_enabled() {
            return self.write_sync(buf);
        }

        if self.journal.log_write(buf.id)? {
            self.meta.lock().slots[buf.slot].refcnt += 1;
            log::trace!("[BCACHE] pin block {} for transaction", buf.id.blockno);
        }
        buf.content.flags.insert(CacheFlags::DIRTY | CacheFlags::LOGGED);
        // 缓存中的内容比磁盘新，不能再被读盘覆盖
        buf.buffer.valid.store(true, Ordering::Release);
        Ok(())
    }

    /// 同步写盘，绕过日志
    pub fn write_sync(&self, buf: &mut BufGuard<'_>) -> Result<()> {
        self.device.write_block(buf.id, &buf.content.data)?;
        self.disk_writes.fetch_add(1, Ordering::Relaxed);
        buf.content.flags.remove(CacheFlags::DIRTY);
        // 写盘后内容与磁盘一致
        buf.buffer.valid.store(true, Ordering::Release);
        Ok(())
    }

    /// 释放缓存块
    ///
    /// 与直接丢弃 [`BufGuard`] 相同。
    pub fn release(&self, buf: BufGuard<'_>) {
        drop(buf);
    }

    /// 钉住缓存块，使其在释放后仍驻留
    pub fn pin(&self, buf: &BufGuard<'_>) -> Pinned {
        self.meta.lock().slots[buf.slot].refcnt += 1;
        Pinned {
            slot: buf.slot,
            id: buf.id,
        }
    }

    /// 解除钉住
    pub fn unpin(&self, pin: Pinned) {
        self.meta.lock().put(pin.slot);
    }

    fn unpin_block(&self, id: BlockId) -> Result<()> {
        let mut meta = self.meta.lock();
        let slot = meta
            .index
            .get(id)
            .ok_or(Error::new(ErrorKind::NotFound, "unpin of non-resident block"))?;
        meta.put(slot);
        Ok(())
    }

    /// 开始一次文件系统操作
    pub fn begin_op(&self) -> Result<()> {
        self.journal.begin_op()
    }

    /// 结束一次文件系统操作
    ///
    /// 最后一个操作结束时把事务中的块写回原位置并解除钉住。
    pub fn end_op(&self) -> Result<()> {
        let Some(blocks) = self.journal.end_op()? else {
            return Ok(());
        };
        let result = self.commit(&blocks);
        self.journal.commit_done();
        result
    }

    fn commit(&self, blocks: &[BlockId]) -> Result<()> {
        let mut result = Ok(());
        for &id in blocks {
            let written = self.read(id).and_then(|mut buf| {
                self.write_sync(&mut buf)?;
                buf.content.flags.remove(CacheFlags::LOGGED);
                Ok(())
            });
            // 写回失败也要解除钉住，否则缓存块永久占用
            let unpinned = self.unpin_block(id);
            if result.is_ok() {
                result = written.and(unpinned);
            }
        }
        if result.is_ok() {
            result = self.device.flush();
        }
        if let Err(err) = &result {
            log::error!("[BCACHE] commit failed: {}", err);
        }
        result
    }

    /// 缓存块总数
    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    /// 引用计数为零（可回收）的缓存块数量
    pub fn free_buffers(&self) -> usize {
        self.meta.lock().heap.len()
    }

    /// 块是否驻留在缓存中
    pub fn contains(&self, id: BlockId) -> bool {
        self.meta.lock().index.get(id).is_some()
    }

    /// 驻留块的引用计数
    pub fn refcount(&self, id: BlockId) -> Option<u32> {
        let meta = self.meta.lock();
        meta.index.get(id).map(|slot| meta.slots[slot].refcnt)
    }

    /// 统计信息
    pub fn stats(&self) -> CacheStats {
        let meta = self.meta.lock();
        CacheStats {
            hits: meta.hits,
            misses: meta.misses,
            evictions: meta.evictions,
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
        }
    }

    /// 检查元数据一致性
    ///
    /// - 每个缓存块在堆中当且仅当引用计数为零
    /// - 堆满足最小堆序，位置记录正确
    /// - 每个有身份的缓存块都能通过索引找到，且索引中没有多余项
    pub fn check_invariants(&self) -> Result<()> {
        let meta = self.meta.lock();
        let mut assigned = 0;
        for (slot, m) in meta.slots.iter().enumerate() {
            if (m.refcnt == 0) != m.heap_pos.is_some() {
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    "heap membership disagrees with refcount",
                ));
            }
            if let Some(id) = m.id {
                assigned += 1;
                if meta.index.get(id) != Some(slot) {
                    return Err(Error::new(ErrorKind::Corrupted, "buffer missing from index"));
                }
            }
        }
        if assigned != meta.index.len() {
            return Err(Error::new(ErrorKind::Corrupted, "stale entries in index"));
        }
        if !meta.heap.is_consistent(&meta.slots) {
            return Err(Error::new(ErrorKind::Corrupted, "eviction heap out of order"));
        }
        Ok(())
    }
}

impl<D: BlockDevice, J: Journal> core::fmt::Debug for BlockCache<D, J> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockCache")
            .field("capacity", &self.capacity())
            .field("free", &self.free_buffers())
            .field("stats", &self.stats())
            .finish()
    }
}
