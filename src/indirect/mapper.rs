//! 间接块映射器实现
//!
//! 将文件的逻辑块号映射到物理块号，支持直接块和一/二/三级间接块。
//!
//! ```text
//! 逻辑块号               映射方式
//! [0, 12)                addrs[bn]
//! [12, 12+K)             addrs[12] -> [bn-12]
//! [12+K, 12+K+K²)        addrs[13] -> [r/K] -> [r%K]
//! [12+K+K², MAXFILE)     addrs[14] -> [r/K²] -> [(r/K)%K] -> [r%K]
//! ```
//!
//! 缺失的间接块和数据块在 [`BlockMapper::resolve`] 时按需分配；
//! [`BlockMapper::lookup`] 只查找，不分配。

use crate::{
    balloc::{balloc, bfree},
    block::{BlockDevice, BlockId, DeviceId},
    cache::BlockCache,
    consts::{MAX_INDIRECT_DEPTH, NDIRECT, NINDIRECT, POINTER_SIZE},
    error::{Error, ErrorKind, Result},
    inode::{iupdate, InodeGuard},
    superblock::Superblock,
    transaction::Journal,
};
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

/// 间接块映射器
#[derive(Debug, Clone)]
pub struct BlockMapper {
    /// 每个间接块可以容纳的指针数量 (K)
    blocks_per_indirect: u32,

    /// 每个层级结束处的逻辑块号
    ///
    /// - limits[0] = 12 (直接块)
    /// - limits[1] = 12 + K (一级间接)
    /// - limits[2] = limits[1] + K² (二级间接)
    /// - limits[3] = limits[2] + K³ (三级间接) = MAXFILE
    block_limits: [u64; 4],

    /// 每个层级可以寻址的块数
    ///
    /// - blocks_per_level[0] = 1
    /// - blocks_per_level[1] = K
    /// - blocks_per_level[2] = K²
    /// - blocks_per_level[3] = K³
    blocks_per_level: [u64; 4],
}

impl Default for BlockMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockMapper {
    /// 创建映射器
    pub fn new() -> Self {
        let blocks_per_indirect = NINDIRECT as u32;

        let mut block_limits = [0u64; 4];
        let mut blocks_per_level = [0u64; 4];
        block_limits[0] = NDIRECT as u64;
        blocks_per_level[0] = 1;
        for i in 1..4 {
            blocks_per_level[i] = blocks_per_level[i - 1] * blocks_per_indirect as u64;
            block_limits[i] = block_limits[i - 1] + blocks_per_level[i];
        }

        Self {
            blocks_per_indirect,
            block_limits,
            blocks_per_level,
        }
    }

    /// 单个文件可寻址的最大块数
    pub fn max_blocks(&self) -> u64 {
        self.block_limits[3]
    }

    /// 逻辑块号所在的层级：0 为直接块，1..=3 为间接深度
    pub fn level_of(&self, logical_block: u64) -> Result<usize> {
        self.block_limits
            .iter()
            .position(|&limit| logical_block < limit)
            .ok_or(Error::new(
                ErrorKind::InvalidInput,
                "Logical block number exceeds maximum file size",
            ))
    }

    /// 将逻辑块号映射到物理块号，缺失的块按需分配（bmap）
    ///
    /// 新分配的根指针只写入内存 inode，调用者负责 [`iupdate`]。
    pub fn resolve<D: BlockDevice, J: Journal>(
        &self,
        cache: &BlockCache<D, J>,
        sb: &Superblock,
        ip: &mut InodeGuard<'_>,
        logical_block: u64,
    ) -> Result<u32> {
        let level = self.level_of(logical_block)?;
        let dev = ip.dev();

        let slot = if level == 0 {
            logical_block as usize
        } else {
            NDIRECT + level - 1
        };
        if ip.addrs[slot] == 0 {
            ip.addrs[slot] = balloc(cache, sb, dev)?;
        }
        let root = self.check_pointer(sb, ip.addrs[slot])?;
        if level == 0 {
            return Ok(root);
        }

        let residual = logical_block - self.block_limits[level - 1];
        self.indirect_path(cache, sb, dev, root, level, residual)
    }

    /// 查找逻辑块对应的物理块，不分配
    ///
    /// # 返回
    ///
    /// - `Ok(Some(physical_block))`: 找到了对应的物理块
    /// - `Ok(None)`: 路径上有未分配的块
    pub fn lookup<D: BlockDevice, J: Journal>(
        &self,
        cache: &BlockCache<D, J>,
        sb: &Superblock,
        ip: &InodeGuard<'_>,
        logical_block: u64,
    ) -> Result<Option<u32>> {
        let level = self.level_of(logical_block)?;
        let slot = if level == 0 {
            logical_block as usize
        } else {
            NDIRECT + level - 1
        };

        let mut block = ip.addrs[slot];
        let mut residual = if level == 0 {
            0
        } else {
            logical_block - self.block_limits[level - 1]
        };
        let mut depth = level;
        while depth > 0 && block != 0 {
            let span = self.blocks_per_level[depth - 1];
            let index = (residual / span) as usize;
            residual %= span;

            let buf = cache.read(BlockId::new(ip.dev(), self.check_pointer(sb, block)?))?;
            block = read_pointer(buf.data(), index);
            depth -= 1;
        }

        if block == 0 {
            Ok(None)
        } else {
            self.check_pointer(sb, block).map(Some)
        }
    }

    /// 沿间接块逐层向下，返回叶子数据块号
    ///
    /// `residual` 是相对当前子树起点的偏移：
    /// 本层下标为 `residual / K^(depth-1)`，余数交给下一层。
    /// 父块在分配子块、写回指针后即释放，再进入下一层。
    fn indirect_path<D: BlockDevice, J: Journal>(
        &self,
        cache: &BlockCache<D, J>,
        sb: &Superblock,
        dev: DeviceId,
        block: u32,
        depth: usize,
        residual: u64,
    ) -> Result<u32> {
        if depth == 0 || depth > MAX_INDIRECT_DEPTH {
            return Err(Error::new(ErrorKind::InvalidInput, "Invalid indirect level"));
        }
        let span = self.blocks_per_level[depth - 1];
        let index = (residual / span) as usize;
        if index >= self.blocks_per_indirect as usize {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Index out of bounds in indirect block",
            ));
        }

        let mut buf = cache.read(BlockId::new(dev, block))?;
        let mut next = read_pointer(buf.data(), index);
        if next == 0 {
            next = balloc(cache, sb, dev)?;
            LittleEndian::write_u32(&mut buf.data_mut()[index * POINTER_SIZE..], next);
            cache.write(&mut buf)?;
            log::trace!(
                "[BMAP] depth {} block {}[{}] -> new block {}",
                depth,
                block,
                index,
                next
            );
        }
        drop(buf);

        let next = self.check_pointer(sb, next)?;
        if depth == 1 {
            Ok(next)
        } else {
            self.indirect_path(cache, sb, dev, next, depth - 1, residual % span)
        }
    }

    /// 释放 inode 的所有数据块和间接块，大小置零并写回（itrunc）
    pub fn truncate<D: BlockDevice, J: Journal>(
        &self,
        cache: &BlockCache<D, J>,
        sb: &Superblock,
        ip: &mut InodeGuard<'_>,
    ) -> Result<()> {
        let dev = ip.dev();
        for i in 0..NDIRECT {
            if ip.addrs[i] != 0 {
                bfree(cache, sb, dev, ip.addrs[i])?;
                ip.addrs[i] = 0;
            }
        }
        for depth in 1..=MAX_INDIRECT_DEPTH {
            let root = ip.indirect_root(depth);
            if root != 0 {
                self.free_tree(cache, sb, dev, root, depth)?;
                ip.addrs[NDIRECT + depth - 1] = 0;
            }
        }

        log::debug!("[BMAP] truncate inode {} (size was {})", ip.inum(), ip.size);
        ip.size = 0;
        iupdate(cache, sb, ip)
    }

    /// 后序释放以 `block` 为根、深度为 `depth` 的子树
    fn free_tree<D: BlockDevice, J: Journal>(
        &self,
        cache: &BlockCache<D, J>,
        sb: &Superblock,
        dev: DeviceId,
        block: u32,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_INDIRECT_DEPTH {
            return Err(Error::new(ErrorKind::InvalidInput, "Invalid indirect level"));
        }
        if depth > 0 {
            let children: Vec<u32> = {
                let buf = cache.read(BlockId::new(dev, self.check_pointer(sb, block)?))?;
                buf.data()
                    .chunks_exact(POINTER_SIZE)
                    .map(LittleEndian::read_u32)
                    .filter(|&b| b != 0)
                    .collect()
            };
            for child in children {
                self.free_tree(cache, sb, dev, child, depth - 1)?;
            }
        }
        bfree(cache, sb, dev, block)
    }

    /// 指针必须落在数据区内
    fn check_pointer(&self, sb: &Superblock, block: u32) -> Result<u32> {
        if block < sb.data_start() || block >= sb.size {
            log::error!("[BMAP] block pointer {} outside data region", block);
            return Err(Error::new(ErrorKind::Corrupted, "block pointer outside data region"));
        }
        Ok(block)
    }
}

fn read_pointer(data: &[u8], index: usize) -> u32 {
    LittleEndian::read_u32(&data[index * POINTER_SIZE..])
}
