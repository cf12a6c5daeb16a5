//! 块分配
//!
//! 从头扫描空闲位图，取第一个空闲块。位图和清零后的新块都通过
//! [`BlockCache::write`] 写入，事务模式下随事务提交。

use crate::{
    bitmap::{count_zeros, find_first_zero, set_bit},
    block::{BlockDevice, BlockId, DeviceId},
    cache::BlockCache,
    consts::BPB,
    error::{Error, ErrorKind, Result},
    superblock::Superblock,
    transaction::Journal,
};

/// 分配一个清零的数据块
///
/// # 返回
///
/// 新块的块号；磁盘已满时返回 `NoSpace`
pub fn balloc<D: BlockDevice, J: Journal>(
    cache: &BlockCache<D, J>,
    sb: &Superblock,
    dev: DeviceId,
) -> Result<u32> {
    let mut base = 0;
    while base < sb.size {
        let limit = (sb.size - base).min(BPB);
        let mut bitmap = cache.read(BlockId::new(dev, sb.bblock(base)))?;
        if let Some(bi) = find_first_zero(bitmap.data(), 0, limit) {
            set_bit(bitmap.data_mut(), bi)?;
            cache.write(&mut bitmap)?;
            drop(bitmap);

            let blockno = base + bi;
            bzero(cache, dev, blockno)?;
            log::trace!("[BALLOC] alloc block {} on dev {}", blockno, dev);
            return Ok(blockno);
        }
        base += BPB;
    }

    log::warn!("[BALLOC] out of blocks on dev {}", dev);
    Err(Error::new(ErrorKind::NoSpace, "balloc: out of blocks"))
}

/// 清零一个块
///
/// 只取缓存块不读盘，内容整体覆盖。
pub fn bzero<D: BlockDevice, J: Journal>(
    cache: &BlockCache<D, J>,
    dev: DeviceId,
    blockno: u32,
) -> Result<()> {
    let mut buf = cache.acquire(BlockId::new(dev, blockno))?;
    buf.data_mut().fill(0);
    cache.write(&mut buf)
}

/// 统计空闲块数
pub fn count_free<D: BlockDevice, J: Journal>(
    cache: &BlockCache<D, J>,
    sb: &Superblock,
    dev: DeviceId,
) -> Result<u32> {
    let mut free = 0;
    let mut base = 0;
    while base < sb.size {
        let limit = (sb.size - base).min(BPB);
        let bitmap = cache.read(BlockId::new(dev, sb.bblock(base)))?;
        free += count_zeros(bitmap.data(), 0, limit);
        base += BPB;
    }
    Ok(free)
}
