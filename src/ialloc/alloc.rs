//! Inode 分配功能

use crate::{
    block::{BlockDevice, BlockId, DeviceId},
    cache::BlockCache,
    consts::{DINODE_SIZE, IPB},
    error::{Error, ErrorKind, Result},
    inode::{Inode, InodeTable},
    superblock::Superblock,
    transaction::Journal,
    types::{DiskInode, InodeType},
};
use byteorder::{ByteOrder, LittleEndian};

/// 在设备上分配一个 inode（ialloc）
///
/// 按编号从 1 开始扫描 inode 区，取第一个类型为空闲的记录，
/// 清零后写入新类型和时间戳。
///
/// # 返回
///
/// 未加锁但已引用的 inode；没有空闲 inode 时返回 `NoSpace`
pub fn ialloc<'t, D: BlockDevice, J: Journal>(
    table: &'t InodeTable,
    cache: &BlockCache<D, J>,
    sb: &Superblock,
    dev: DeviceId,
    typ: InodeType,
    now: u32,
) -> Result<Inode<'t>> {
    if typ.is_free() {
        return Err(Error::new(ErrorKind::InvalidInput, "ialloc of free type"));
    }

    let mut inum = 1;
    while inum < sb.ninodes {
        let mut buf = cache.read(BlockId::new(dev, sb.iblock(inum)))?;
        // 同一块内的 inode 一起扫描
        let block_end = (inum / IPB + 1) * IPB;
        while inum < block_end.min(sb.ninodes) {
            let off = Superblock::inode_offset(inum);
            if LittleEndian::read_i16(&buf.data()[off..]) == InodeType::Free.raw() {
                DiskInode::new(typ, now).encode(&mut buf.data_mut()[off..off + DINODE_SIZE])?;
                cache.write(&mut buf)?;
                drop(buf);

                log::debug!("[ITABLE] ialloc dev={} inum={} type={:?}", dev, inum, typ);
                return table.get(dev, inum);
            }
            inum += 1;
        }
    }

    log::warn!("[ITABLE] out of inodes on dev {}", dev);
    Err(Error::new(ErrorKind::NoSpace, "ialloc: no inodes"))
}

/// 统计空闲 inode 数
pub fn count_free_inodes<D: BlockDevice, J: Journal>(
    cache: &BlockCache<D, J>,
    sb: &Superblock,
    dev: DeviceId,
) -> Result<u32> {
    let mut free = 0;
    for blockno in sb.inodestart..sb.inodestart + sb.ninodeblocks() {
        let buf = cache.read(BlockId::new(dev, blockno))?;
        for i in 0..IPB {
            let inum = (blockno - sb.inodestart) * IPB + i;
            if inum == 0 || inum >= sb.ninodes {
                continue;
            }
            let off = Superblock::inode_offset(inum);
            if LittleEndian::read_i16(&buf.data()[off..]) == InodeType::Free.raw() {
                free += 1;
            }
        }
    }
    Ok(free)
}
