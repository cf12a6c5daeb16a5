//! 驱逐堆
//!
//! 以释放时间戳为键的二叉最小堆，只保存引用计数为零的缓存块下标。
//! 堆顶即最近最少使用的可回收块。
//!
//! 每个缓存块在 [`BufMeta::heap_pos`] 中记录自己在堆中的位置，
//! 因此可以在 O(log N) 内从堆中间删除任意块（缓存命中时需要）。
//! 时间戳单调递增且不会重复，相同时间戳（初始状态全部为 0）
//! 的先后由堆结构决定。

use super::buffer::{BufMeta, BufferId};
use alloc::vec::Vec;

/// 驱逐堆
pub(super) struct EvictionHeap {
    items: Vec<BufferId>,
}

impl EvictionHeap {
    pub(super) fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// 堆中块数量
    pub(super) fn len(&self) -> usize {
        self.items.len()
    }

    /// 堆顶块（不移除）
    #[cfg(test)]
    pub(super) fn peek(&self) -> Option<BufferId> {
        self.items.first().copied()
    }

    /// 插入块
    ///
    /// 调用者保证该块当前不在堆中。
    pub(super) fn push(&mut self, metas: &mut [BufMeta], id: BufferId) {
        let pos = self.items.len();
        self.items.push(id);
        metas[id].heap_pos = Some(pos);
        self.sift_up(metas, pos);
    }

    /// 弹出时间戳最小的块
    pub(super) fn pop_min(&mut self, metas: &mut [BufMeta]) -> Option<BufferId> {
        let top = *self.items.first()?;
        self.remove_at(metas, 0);
        Some(top)
    }

    /// 从堆中任意位置删除指定块
    ///
    /// 块不在堆中时返回 `false`。
    pub(super) fn remove(&mut self, metas: &mut [BufMeta], id: BufferId) -> bool {
        match metas[id].heap_pos {
            Some(pos) if pos < self.items.len() && self.items[pos] == id => {
                self.remove_at(metas, pos);
                true
            }
            Some(pos) => {
                log::error!(
                    "[BCACHE] heap position of buffer {} is stale (pos={}, len={})",
                    id,
                    pos,
                    self.items.len()
                );
                metas[id].heap_pos = None;
                false
            }
            None => false,
        }
    }

    /// 检查堆序和位置记录是否一致
    pub(super) fn is_consistent(&self, metas: &[BufMeta]) -> bool {
        self.items.iter().enumerate().all(|(pos, &id)| {
            let parent_ok = pos == 0 || {
                let parent = self.items[(pos - 1) / 2];
                metas[parent].stamp <= metas[id].stamp
            };
            parent_ok && metas[id].heap_pos == Some(pos)
        })
    }

    fn remove_at(&mut self, metas: &mut [BufMeta], pos: usize) {
        let last = self.items.len() - 1;
        self.swap(metas, pos, last);
        if let Some(removed) = self.items.pop() {
            metas[removed].heap_pos = None;
        }
        if pos < self.items.len() {
            // 从末尾换上来的块可能需要向任一方向调整
            self.sift_up(metas, pos);
            self.sift_down(metas, pos);
        }
    }

    fn sift_up(&mut self, metas: &mut [BufMeta], mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if metas[self.items[parent]].stamp <= metas[self.items[pos]].stamp {
                break;
            }
            self.swap(metas, parent, pos);
            pos = parent;
        }
    }

    fn sift_down(&mut self, metas: &mut [BufMeta], mut pos: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut child = left;
            if right < len && metas[self.items[right]].stamp < metas[self.items[left]].stamp {
                child = right;
            }
            if metas[self.items[child]].stamp >= metas[self.items[pos]].stamp {
                break;
            }
            self.swap(metas, pos, child);
            pos = child;
        }
    }

    fn swap(&mut self, metas: &mut [BufMeta], a: usize, b: usize) {
        if a == b {
            return;
        }
        self.items.swap(a, b);
        metas[self.items[a]].heap_pos = Some(a);
        metas[self.items[b]].heap_pos = Some(b);
    }
}
