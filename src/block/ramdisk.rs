//! 内存块设备
//!
//! 以一段内存模拟单个磁盘，用于测试和以内存镜像启动的场景。

use super::{BlockDevice, BlockId, DeviceId};
use crate::consts::BSIZE;
use crate::error::{Error, ErrorKind, Result};
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

/// 内存块设备
///
/// 只响应构造时指定的设备号；统计物理读写次数，便于验证缓存命中。
pub struct MemDevice {
    dev: DeviceId,
    nblocks: u32,
    storage: Mutex<Vec<u8>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemDevice {
    /// 创建全零的内存盘
    ///
    /// # 参数
    ///
    /// * `dev` - 设备号
    /// * `nblocks` - 块数量
    pub fn new(dev: DeviceId, nblocks: u32) -> Self {
        Self {
            dev,
            nblocks,
            storage: Mutex::new(vec![0u8; nblocks as usize * BSIZE]),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// 设备号
    pub fn dev(&self) -> DeviceId {
        self.dev
    }

    /// 块数量
    pub fn nblocks(&self) -> u32 {
        self.nblocks
    }

    /// 物理读取次数
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// 物理写入次数
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// 直接复制出一个块的内容（绕过缓存，不计入统计）
    pub fn snapshot(&self, blockno: u32) -> Result<Vec<u8>> {
        let range = self.range(BlockId::new(self.dev, blockno))?;
        Ok(self.storage.lock()[range].to_vec())
    }

    fn range(&self, id: BlockId) -> Result<core::ops::Range<usize>> {
        if id.dev != self.dev {
            return Err(Error::new(ErrorKind::NotFound, "No such device"));
        }
        if id.blockno >= self.nblocks {
            return Err(Error::new(ErrorKind::InvalidInput, "Block number out of range"));
        }
        let start = id.blockno as usize * BSIZE;
        Ok(start..start + BSIZE)
    }
}

impl BlockDevice for MemDevice {
    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        let range = self.range(id)?;
        if buf.len() < BSIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "buffer too small for block"));
        }
        buf[..BSIZE].copy_from_slice(&self.storage.lock()[range]);
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
        let range = self.range(id)?;
        if buf.len() < BSIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "buffer too small for block"));
        }
        self.storage.lock()[range].copy_from_slice(&buf[..BSIZE]);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
