//! 块标识到缓存块下标的哈希索引
//!
//! 开放寻址表，容量为 2 的幂且不小于缓存块数量的两倍。
//! 冲突时按三角数序列探测（`h, h+1, h+3, h+6, ...`），
//! 在 2 的幂容量下该序列恰好遍历所有槽位一次。
//!
//! 删除留下墓碑，查找越过墓碑继续探测，遇到空槽或探测完整张表才判定不存在；
//! 墓碑超过容量四分之一时整表重建。

use super::buffer::BufferId;
use crate::block::BlockId;
use crate::error::{Error, ErrorKind, Result};
use alloc::vec;
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Tombstone,
    Occupied(BlockId, BufferId),
}

/// 哈希索引
pub(super) struct HashIndex {
    table: Vec<Slot>,
    len: usize,
    tombstones: usize,
}

impl HashIndex {
    /// 为 `nbuf` 个缓存块创建索引
    pub(super) fn new(nbuf: usize) -> Self {
        let capacity = (nbuf.max(4) * 2).next_power_of_two();
        Self {
            table: vec![Slot::Empty; capacity],
            len: 0,
            tombstones: 0,
        }
    }

    /// 已登记的块数量
    pub(super) fn len(&self) -> usize {
        self.len
    }

    /// 查找块所在的缓存块下标
    pub(super) fn get(&self, id: BlockId) -> Option<BufferId> {
        for pos in self.positions(id) {
            match self.table[pos] {
                Slot::Empty => return None,
                Slot::Occupied(key, buf) if key == id => return Some(buf),
                _ => {}
            }
        }
        None
    }

    /// 登记块标识
    ///
    /// 已存在时更新其缓存块下标。
    pub(super) fn insert(&mut self, id: BlockId, buf: BufferId) -> Result<()> {
        let mut free = None;
        for pos in self.positions(id) {
            match self.table[pos] {
                Slot::Empty => {
                    free.get_or_insert(pos);
                    break;
                }
                Slot::Tombstone => {
                    free.get_or_insert(pos);
                }
                Slot::Occupied(key, _) if key == id => {
                    self.table[pos] = Slot::Occupied(id, buf);
                    return Ok(());
                }
                Slot::Occupied(..) => {}
            }
        }

        let pos = free.ok_or(Error::new(ErrorKind::Busy, "hash index full"))?;
        if self.table[pos] == Slot::Tombstone {
            self.tombstones -= 1;
        }
        self.table[pos] = Slot::Occupied(id, buf);
        self.len += 1;
        Ok(())
    }

    /// 删除块标识，返回其原缓存块下标
    pub(super) fn remove(&mut self, id: BlockId) -> Option<BufferId> {
        let mut found = None;
        for pos in self.positions(id) {
            match self.table[pos] {
                Slot::Empty => break,
                Slot::Occupied(key, buf) if key == id => {
                    found = Some((pos, buf));
                    break;
                }
                _ => {}
            }
        }

        let (pos, buf) = found?;
        self.table[pos] = Slot::Tombstone;
        self.len -= 1;
        self.tombstones += 1;
        if self.tombstones > self.table.len() / 4 {
            self.rehash();
        }
        Some(buf)
    }

    fn rehash(&mut self) {
        log::trace!(
            "[BCACHE] rehash index: {} live, {} tombstones",
            self.len,
            self.tombstones
        );
        let live: Vec<(BlockId, BufferId)> = self
            .table
            .iter()
            .filter_map(|slot| match *slot {
                Slot::Occupied(id, buf) => Some((id, buf)),
                _ => None,
            })
            .collect();

        self.table.fill(Slot::Empty);
        self.len = 0;
        self.tombstones = 0;
        for (id, buf) in live {
            // 表刚清空，容量不小于存活项的两倍，插入不会失败
            let inserted = self.insert(id, buf);
            debug_assert!(inserted.is_ok(), "rehash lost block {}", id.blockno);
        }
    }

    fn positions(&self, id: BlockId) -> impl Iterator<Item = usize> {
        let mask = self.table.len() - 1;
        let start = Self::hash(id);
        (0..self.table.len()).map(move |i| start.wrapping_add(i * (i + 1) / 2) & mask)
    }

    fn hash(id: BlockId) -> usize {
        let key = ((id.dev as u64) << 32) | id.blockno as u64;
        (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 29) as usize
    }
}
