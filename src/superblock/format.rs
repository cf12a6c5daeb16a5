//! 创建空文件系统
//!
//! 直接通过块设备写入（此时还没有块缓存）：
//! 全盘清零 → superblock → 根目录 inode → 位图中标记元数据块已用。

use super::read::Superblock;
use crate::{
    block::{BlockDevice, BlockId, DeviceId},
    consts::*,
    error::{Error, ErrorKind, Result},
    types::{DiskInode, InodeType},
};
use alloc::vec;

/// 格式化参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// 总块数
    pub size: u32,
    /// inode 数
    pub ninodes: u32,
    /// 日志块数
    pub nlog: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            size: 2000,
            ninodes: 200,
            nlog: LOGSIZE as u32,
        }
    }
}

/// 计算给定参数下的磁盘布局
pub fn layout(opts: &FormatOptions) -> Result<Superblock> {
    let nbitmap = opts.size / BPB + 1;
    let ninodeblocks = opts.ninodes / IPB + 1;
    let nmeta = 2u32
        .checked_add(opts.nlog)
        .and_then(|n| n.checked_add(ninodeblocks))
        .and_then(|n| n.checked_add(nbitmap))
        .ok_or(Error::new(ErrorKind::InvalidInput, "metadata size overflows"))?;
    if opts.ninodes <= ROOTINO || nmeta >= opts.size {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "file system too small for its metadata",
        ));
    }

    Ok(Superblock {
        magic: FSMAGIC,
        size: opts.size,
        nblocks: opts.size - nmeta,
        ninodes: opts.ninodes,
        nlog: opts.nlog,
        logstart: 2,
        inodestart: 2 + opts.nlog,
        bmapstart: 2 + opts.nlog + ninodeblocks,
    })
}

/// 在设备上创建空文件系统
///
/// 根目录 inode 为 [`ROOTINO`]，类型为目录，链接数 1，大小 0。
pub fn format<D: BlockDevice>(
    device: &D,
    dev: DeviceId,
    opts: &FormatOptions,
) -> Result<Superblock> {
    let sb = layout(opts)?;
    let nmeta = sb.data_start();
    log::debug!(
        "[FS] format dev={}: nmeta {} (log {} inode {} bitmap {}) data {} total {}",
        dev,
        nmeta,
        sb.nlog,
        sb.ninodeblocks(),
        sb.nbitmap(),
        sb.nblocks,
        sb.size
    );

    let zeroes = vec![0u8; BSIZE];
    for blockno in 0..sb.size {
        device.write_block(BlockId::new(dev, blockno), &zeroes)?;
    }

    let mut buf = vec![0u8; BSIZE];
    sb.encode(&mut buf)?;
    device.write_block(BlockId::new(dev, SUPERBLOCK_BLOCKNO), &buf)?;

    let mut root = DiskInode::new(InodeType::Directory, 0);
    root.nlink = 1;
    buf.fill(0);
    root.encode(&mut buf[Superblock::inode_offset(ROOTINO)..])?;
    device.write_block(BlockId::new(dev, sb.iblock(ROOTINO)), &buf)?;

    // 元数据块全部标记为已用；nmeta 可能跨越多个位图块
    let mut base = 0;
    while base < nmeta {
        buf.fill(0);
        let used = (nmeta - base).min(BPB);
        for bit in 0..used as usize {
            buf[bit / 8] |= 1 << (bit % 8);
        }
        device.write_block(BlockId::new(dev, sb.bblock(base)), &buf)?;
        base += BPB;
    }

    device.flush()?;
    Ok(sb)
}
