//! 块释放

use crate::{
    bitmap::{clear_bit, test_bit},
    block::{BlockDevice, BlockId, DeviceId},
    cache::BlockCache,
    consts::BPB,
    error::{Error, ErrorKind, Result},
    superblock::Superblock,
    transaction::Journal,
};

/// 释放一个块
///
/// 释放元数据区或超出文件系统范围的块返回 `InvalidInput`，
/// 释放本来就空闲的块返回 `Corrupted`。
pub fn bfree<D: BlockDevice, J: Journal>(
    cache: &BlockCache<D, J>,
    sb: &Superblock,
    dev: DeviceId,
    blockno: u32,
) -> Result<()> {
    if blockno < sb.data_start() || blockno >= sb.size {
        log::error!("[BALLOC] free of block {} outside data region", blockno);
        return Err(Error::new(ErrorKind::InvalidInput, "freeing block outside data region"));
    }

    let bi = blockno % BPB;
    let mut bitmap = cache.read(BlockId::new(dev, sb.bblock(blockno)))?;
    if !test_bit(bitmap.data(), bi) {
        log::error!("[BALLOC] double free of block {} on dev {}", blockno, dev);
        return Err(Error::new(ErrorKind::Corrupted, "freeing free block"));
    }
    clear_bit(bitmap.data_mut(), bi)?;
    cache.write(&mut bitmap)?;
    log::trace!("[BALLOC] free block {} on dev {}", blockno, dev);
    Ok(())
}
