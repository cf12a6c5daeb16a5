//! 内存 inode 表
//!
//! 固定数量的槽位，按 (设备号, inode 号) 线性查找。与块缓存相同的两级锁：
//!
//! - 表锁：保护每个槽位的身份和引用计数
//! - 内容锁：每个槽位一个，保护缓存的磁盘 inode；持有期间可以做磁盘 I/O
//!
//! [`Inode`] 是一个引用（丢弃时引用计数减一），[`InodeGuard`] 是持有中的内容锁。

use crate::{
    block::{BlockDevice, BlockId, DeviceId},
    cache::BlockCache,
    consts::DINODE_SIZE,
    error::{Error, ErrorKind, Result},
    superblock::Superblock,
    transaction::Journal,
    types::{DiskInode, FileStat},
};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};
use spin::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Default)]
struct InodeMeta {
    dev: DeviceId,
    inum: u32,
    refcnt: u32,
}

struct InodeSlot {
    /// 内容是否已从磁盘载入；只在表锁下清除，只在内容锁下置位
    valid: AtomicBool,
    content: Mutex<DiskInode>,
}

/// 内存 inode 表
pub struct InodeTable {
    meta: Mutex<Vec<InodeMeta>>,
    slots: Box<[InodeSlot]>,
}

impl InodeTable {
    /// 创建容量为 `ninode` 的 inode 表
    pub fn new(ninode: usize) -> Result<Self> {
        if ninode == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "inode table needs at least one slot"));
        }
        let slots: Vec<InodeSlot> = (0..ninode)
            .map(|_| InodeSlot {
                valid: AtomicBool::new(false),
                content: Mutex::new(DiskInode::default()),
            })
            .collect();
        Ok(Self {
            meta: Mutex::new(vec![InodeMeta::default(); ninode]),
            slots: slots.into_boxed_slice(),
        })
    }

    /// 槽位总数
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 被引用的槽位数
    pub fn in_use(&self) -> usize {
        self.meta.lock().iter().filter(|m| m.refcnt > 0).count()
    }

    /// 获取 inode 引用（iget）
    ///
    /// 不加锁，不读盘。已缓存时引用计数加一，否则占用一个空闲槽位；
    /// 没有空闲槽位时返回 `Busy`。
    pub fn get(&self, dev: DeviceId, inum: u32) -> Result<Inode<'_>> {
        let mut meta = self.meta.lock();
        let mut empty = None;
        for (slot, m) in meta.iter_mut().enumerate() {
            if m.refcnt > 0 && m.dev == dev && m.inum == inum {
                m.refcnt += 1;
                return Ok(Inode::new(self, slot, dev, inum));
            }
            if empty.is_none() && m.refcnt == 0 {
                empty = Some(slot);
            }
        }

        let Some(slot) = empty else {
            log::error!("[ITABLE] no free slots for inode {} on dev {}", inum, dev);
            return Err(Error::new(ErrorKind::Busy, "iget: no inodes"));
        };
        meta[slot] = InodeMeta {
            dev,
            inum,
            refcnt: 1,
        };
        self.slots[slot].valid.store(false, Ordering::Release);
        log::trace!("[ITABLE] iget dev={} inum={} -> slot {}", dev, inum, slot);
        Ok(Inode::new(self, slot, dev, inum))
    }

    /// 在没有其他引用时取出最后一个引用的内容锁，用于回收
    ///
    /// 只有已载入、链接数为零的 inode 才返回 `Some`。
    pub(crate) fn reclaim<'t>(&'t self, ip: &Inode<'t>) -> Result<Option<InodeGuard<'t>>> {
        let mut meta = self.meta.lock();
        if meta[ip.slot].refcnt != 1 {
            return Ok(None);
        }
        let slot = &self.slots[ip.slot];
        // 持锁者都带着自己的引用，引用计数为 1 时内容锁不应被占用
        let Some(content) = slot.content.try_lock() else {
            return Err(Error::new(ErrorKind::InvalidState, "iput of locked inode"));
        };
        if !slot.valid.load(Ordering::Acquire) || content.nlink != 0 {
            return Ok(None);
        }
        meta[ip.slot].refcnt += 1;
        drop(meta);

        Ok(Some(InodeGuard {
            content,
            slot,
            inode: Inode::new(self, ip.slot, ip.dev, ip.inum),
        }))
    }

    fn dup(&self, slot: usize) {
        self.meta.lock()[slot].refcnt += 1;
    }

    fn put(&self, slot: usize) {
        let mut meta = self.meta.lock();
        let m = &mut meta[slot];
        debug_assert!(m.refcnt > 0, "release of unreferenced inode slot {}", slot);
        if m.refcnt == 0 {
            log::error!("[ITABLE] release of unreferenced inode slot {}", slot);
            return;
        }
        m.refcnt -= 1;
        if m.refcnt == 0 {
            let slot = &self.slots[slot];
            if let Some(content) = slot.content.try_lock() {
                if slot.valid.load(Ordering::Acquire) && content.nlink == 0 && !content.typ.is_free() {
                    log::warn!("[ITABLE] unlinked inode {} dropped without iput", m.inum);
                }
            }
        }
    }

    fn refcount(&self, slot: usize) -> u32 {
        self.meta.lock()[slot].refcnt
    }
}

/// inode 引用
///
/// 持有期间槽位不会被回收；丢弃时引用计数减一。
/// 需要在最后一个引用时释放已删除文件的磁盘空间，应使用文件系统的 `iput`。
pub struct Inode<'t> {
    table: &'t InodeTable,
    slot: usize,
    dev: DeviceId,
    inum: u32,
}

impl<'t> Inode<'t> {
    fn new(table: &'t InodeTable, slot: usize, dev: DeviceId, inum: u32) -> Self {
        Self {
            table,
            slot,
            dev,
            inum,
        }
    }

    /// 设备号
    pub fn dev(&self) -> DeviceId {
        self.dev
    }

    /// inode 编号
    pub fn inum(&self) -> u32 {
        self.inum
    }

    /// 当前引用计数
    pub fn refcount(&self) -> u32 {
        self.table.refcount(self.slot)
    }

    /// 复制引用（idup）
    pub fn dup(&self) -> Inode<'t> {
        self.table.dup(self.slot);
        Inode::new(self.table, self.slot, self.dev, self.inum)
    }

    /// 加锁（ilock），必要时从磁盘载入
    ///
    /// 磁盘上的 inode 为空闲类型时返回 `Corrupted`。
    pub fn lock<D: BlockDevice, J: Journal>(
        &self,
        cache: &BlockCache<D, J>,
        sb: &Superblock,
    ) -> Result<InodeGuard<'t>> {
        if self.inum == 0 || self.inum >= sb.ninodes {
            return Err(Error::new(ErrorKind::InvalidInput, "inode number out of range"));
        }

        let slot = &self.table.slots[self.slot];
        let mut content = slot.content.lock();
        if !slot.valid.load(Ordering::Acquire) {
            let buf = cache.read(BlockId::new(self.dev, sb.iblock(self.inum)))?;
            let off = Superblock::inode_offset(self.inum);
            let dinode = DiskInode::decode(&buf.data()[off..off + DINODE_SIZE])?;
            drop(buf);

            if dinode.typ.is_free() {
                log::error!("[ITABLE] ilock of free inode {} on dev {}", self.inum, self.dev);
                return Err(Error::new(ErrorKind::Corrupted, "ilock: no type"));
            }
            *content = dinode;
            slot.valid.store(true, Ordering::Release);
        }

        Ok(InodeGuard {
            content,
            slot,
            inode: self.dup(),
        })
    }
}

impl Drop for Inode<'_> {
    fn drop(&mut self) {
        self.table.put(self.slot);
    }
}

impl core::fmt::Debug for Inode<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inode")
            .field("dev", &self.dev)
            .field("inum", &self.inum)
            .field("slot", &self.slot)
            .finish()
    }
}

/// 已加锁的 inode
///
/// 解引用为缓存的 [`DiskInode`]；修改后需要 [`iupdate`] 写回。丢弃即解锁。
/// 持有期间自带一个引用，先解锁再释放该引用，所以加锁中的槽位不会被回收。
pub struct InodeGuard<'i> {
    // 字段按声明顺序析构：内容锁先于引用释放
    content: MutexGuard<'i, DiskInode>,
    slot: &'i InodeSlot,
    inode: Inode<'i>,
}

impl InodeGuard<'_> {
    /// 设备号
    pub fn dev(&self) -> DeviceId {
        self.inode.dev
    }

    /// inode 编号
    pub fn inum(&self) -> u32 {
        self.inode.inum
    }

    /// 设置四个时间戳（itimeset）
    pub fn set_times(&mut self, atime: u32, ctime: u32, mtime: u32, dtime: u32) {
        self.content.atime = atime;
        self.content.ctime = ctime;
        self.content.mtime = mtime;
        self.content.dtime = dtime;
    }

    /// 文件状态（stati）
    pub fn stat(&self) -> FileStat {
        FileStat {
            dev: self.inode.dev,
            ino: self.inode.inum,
            typ: self.content.typ,
            nlink: self.content.nlink,
            size: self.content.size as u64,
        }
    }

    /// 使缓存内容失效，下次加锁时重新从磁盘载入
    pub(crate) fn invalidate(&mut self) {
        self.slot.valid.store(false, Ordering::Release);
    }
}

impl core::fmt::Debug for InodeGuard<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InodeGuard")
            .field("dev", &self.inode.dev)
            .field("inum", &self.inode.inum)
            .field("typ", &self.content.typ)
            .field("size", &self.content.size)
            .finish()
    }
}

impl Deref for InodeGuard<'_> {
    type Target = DiskInode;

    fn deref(&self) -> &DiskInode {
        &self.content
    }
}

impl DerefMut for InodeGuard<'_> {
    fn deref_mut(&mut self) -> &mut DiskInode {
        &mut self.content
    }
}

/// 把内存 inode 写回磁盘（iupdate）
///
/// 每次修改磁盘上也存在的字段后都必须调用。
pub fn iupdate<D: BlockDevice, J: Journal>(
    cache: &BlockCache<D, J>,
    sb: &Superblock,
    ip: &InodeGuard<'_>,
) -> Result<()> {
    let mut buf = cache.read(BlockId::new(ip.dev(), sb.iblock(ip.inum())))?;
    let off = Superblock::inode_offset(ip.inum());
    ip.content.encode(&mut buf.data_mut()[off..off + DINODE_SIZE])?;
    cache.write(&mut buf)
}
