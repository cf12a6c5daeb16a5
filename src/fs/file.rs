//! inode 内容读写
//!
//! 按块拆分请求：每块通过块映射器找到物理块，再经块缓存复制数据。
//! 中途出错时已经传输的字节数照常返回，调用者据此判断是否部分成功。

use crate::{
    block::{BlockDevice, BlockId},
    consts::{BSIZE, MAXFILE_BYTES},
    error::{Error, ErrorKind, Result},
    inode::InodeGuard,
    transaction::Journal,
    types::InodeFlags,
};

use super::{filesystem::FileSystem, types::SystemHal};

impl<D: BlockDevice, J: Journal, H: SystemHal> FileSystem<D, J, H> {
    /// 从 inode 读取数据（readi）
    ///
    /// 读取范围截断到文件大小；未分配的块读出为零。
    /// 访问时间只更新内存副本，随下一次 `iupdate` 写回。
    ///
    /// # 返回
    ///
    /// 实际读取的字节数；`off` 不小于文件大小时为 0
    pub fn readi(&self, ip: &mut InodeGuard<'_>, off: u64, dst: &mut [u8]) -> Result<usize> {
        let size = ip.size as u64;
        if off >= size || dst.is_empty() {
            return Ok(0);
        }
        let n = (dst.len() as u64).min(size - off) as usize;

        if !ip.flags.contains(InodeFlags::NOATIME) {
            ip.atime = self.now();
        }

        let mut tot = 0;
        while tot < n {
            let pos = off + tot as u64;
            let in_block = (pos % BSIZE as u64) as usize;
            let m = (n - tot).min(BSIZE - in_block);

            let copied = self.read_block(ip, pos / BSIZE as u64, in_block, &mut dst[tot..tot + m]);
            if let Err(err) = copied {
                if tot == 0 {
                    return Err(err);
                }
                log::warn!("[FS] short read of inode {} at {}: {}", ip.inum(), pos, err);
                break;
            }
            tot += m;
        }
        Ok(tot)
    }

    /// 向 inode 写入数据（writei）
    ///
    /// 写入起点不能越过文件末尾；文件按需增长，新块按需分配。
    /// 结束时总是写回 inode（块指针可能已变化）。
    /// 事务模式下必须在 `begin_op`/`end_op` 之间调用，且单次写入的块数不能超过日志容量。
    ///
    /// # 错误
    ///
    /// - `ErrorKind::PermissionDenied` - inode 不可修改，或仅追加但起点不在文件末尾
    /// - `ErrorKind::InvalidInput` - 起点越过文件末尾，或结束位置超过最大文件大小
    ///
    /// # 返回
    ///
    /// 实际写入的字节数；中途出错时可能小于 `src.len()`
    pub fn writei(&self, ip: &mut InodeGuard<'_>, off: u64, src: &[u8]) -> Result<usize> {
        if ip.flags.contains(InodeFlags::IMMUTABLE) {
            return Err(Error::new(ErrorKind::PermissionDenied, "write to immutable inode"));
        }
        let size = ip.size as u64;
        if off > size {
            return Err(Error::new(ErrorKind::InvalidInput, "write offset beyond end of file"));
        }
        if ip.flags.contains(InodeFlags::APPEND) && off != size {
            return Err(Error::new(ErrorKind::PermissionDenied, "append-only inode"));
        }
        let end = off
            .checked_add(src.len() as u64)
            .ok_or(Error::new(ErrorKind::InvalidInput, "write range overflows"))?;
        if end > MAXFILE_BYTES.min(u32::MAX as u64) {
            return Err(Error::new(ErrorKind::InvalidInput, "write exceeds maximum file size"));
        }

        let now = self.now();
        if !ip.flags.contains(InodeFlags::NOATIME) {
            ip.atime = now;
        }
        ip.mtime = now;

        let mut tot = 0;
        let mut failure = None;
        while tot < src.len() {
            let pos = off + tot as u64;
            let in_block = (pos % BSIZE as u64) as usize;
            let m = (src.len() - tot).min(BSIZE - in_block);

            let copied = self.write_block(ip, pos / BSIZE as u64, in_block, &src[tot..tot + m]);
            if let Err(err) = copied {
                failure = Some(err);
                break;
            }
            tot += m;
        }

        let written_end = off + tot as u64;
        if written_end > size {
            ip.size = written_end as u32;
        }
        // bmap 可能已经改了块指针，即使没有增长也要写回
        self.iupdate(ip)?;

        match failure {
            Some(err) if tot == 0 => Err(err),
            Some(err) => {
                log::warn!("[FS] short write to inode {} at {}: {}", ip.inum(), written_end, err);
                Ok(tot)
            }
            None => Ok(tot),
        }
    }

    fn read_block(&self, ip: &InodeGuard<'_>, logical_block: u64, in_block: usize, out: &mut [u8]) -> Result<()> {
        match self.mapper.lookup(&self.cache, &self.sb, ip, logical_block)? {
            Some(blockno) => {
                let buf = self.cache.read(BlockId::new(self.dev, blockno))?;
                out.copy_from_slice(&buf.data()[in_block..in_block + out.len()]);
            }
            None => out.fill(0),
        }
        Ok(())
    }

    fn write_block(&self, ip: &mut InodeGuard<'_>, logical_block: u64, in_block: usize, data: &[u8]) -> Result<()> {
        let blockno = self.mapper.resolve(&self.cache, &self.sb, ip, logical_block)?;
        let id = BlockId::new(self.dev, blockno);
        // 整块覆盖时不需要先读盘
        let mut buf = if data.len() == BSIZE {
            self.cache.acquire(id)?
        } else {
            self.cache.read(id)?
        };
        buf.data_mut()[in_block..in_block + data.len()].copy_from_slice(data);
        self.cache.write(&mut buf)
    }
}

#[cfg(test)]
mod tests {
    use crate::block::{BlockDevice, BlockId, MemDevice};
    use crate::consts::{BSIZE, NDIRECT, NINDIRECT};
    use crate::error::ErrorKind;
    use crate::fs::{FileSystem, FsConfig};
    use crate::superblock::FormatOptions;
    use crate::test_support::{mount, mount_journaled, DEV};
    use crate::types::{InodeFlags, InodeType};
    use alloc::sync::Arc;
    use alloc::vec;
    use alloc::vec::Vec;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_write_read_small() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let ip = fs.ialloc(InodeType::File).unwrap();
        let mut guard = fs.ilock(&ip).unwrap();

        assert_eq!(fs.writei(&mut guard, 0, b"hello, world").unwrap(), 12);
        assert_eq!(guard.size, 12);

        let mut out = [0u8; 32];
        assert_eq!(fs.readi(&mut guard, 0, &mut out).unwrap(), 12);
        assert_eq!(&out[..12], b"hello, world");
        assert_eq!(fs.readi(&mut guard, 7, &mut out).unwrap(), 5);
        assert_eq!(&out[..5], b"world");
        assert_eq!(fs.readi(&mut guard, 12, &mut out).unwrap(), 0);
        assert_eq!(fs.readi(&mut guard, 100, &mut out).unwrap(), 0);
    }

    #[test]
    fn test_round_trip_across_indirect_levels() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let ip = fs.ialloc(InodeType::File).unwrap();
        let inum = ip.inum();
        let mut guard = fs.ilock(&ip).unwrap();

        // 跨过直接块、一级间接和二级间接的边界，起止都不对齐
        let nblocks = NDIRECT + NINDIRECT + 3;
        let data = pattern(nblocks * BSIZE - 300, 7);
        let mut off = 0;
        for chunk in data.chunks(3000) {
            assert_eq!(fs.writei(&mut guard, off as u64, chunk).unwrap(), chunk.len());
            off += chunk.len();
        }
        assert_eq!(guard.size as usize, data.len());
        assert_ne!(guard.addrs[NDIRECT], 0);
        assert_ne!(guard.addrs[NDIRECT + 1], 0);
        assert_eq!(guard.addrs[NDIRECT + 2], 0);
        drop(guard);
        drop(ip);

        // 重新载入后逐段比较
        let ip = fs.iget(inum).unwrap();
        let mut guard = fs.ilock(&ip).unwrap();
        let mut back = vec![0u8; data.len()];
        let mut off = 0;
        while off < back.len() {
            let end = (off + 1777).min(back.len());
            let n = fs.readi(&mut guard, off as u64, &mut back[off..end]).unwrap();
            assert_eq!(n, end - off);
            off = end;
        }
        assert!(back == data);
    }

    #[test]
    fn test_overwrite_in_place() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let ip = fs.ialloc(InodeType::File).unwrap();
        let mut guard = fs.ilock(&ip).unwrap();

        fs.writei(&mut guard, 0, &pattern(3 * BSIZE, 1)).unwrap();
        let free = fs.statfs().unwrap().free_blocks_count;
        fs.writei(&mut guard, 1000, &[0xAB; 100]).unwrap();
        assert_eq!(guard.size as usize, 3 * BSIZE);
        assert_eq!(fs.statfs().unwrap().free_blocks_count, free);

        let mut out = vec![0u8; 3 * BSIZE];
        fs.readi(&mut guard, 0, &mut out).unwrap();
        let mut expected = pattern(3 * BSIZE, 1);
        expected[1000..1100].fill(0xAB);
        assert!(out == expected);
    }

    #[test]
    fn test_holes_read_as_zero() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let ip = fs.ialloc(InodeType::File).unwrap();
        let mut guard = fs.ilock(&ip).unwrap();
        fs.writei(&mut guard, 0, &[1u8; 10]).unwrap();
        guard.size = (20 * BSIZE) as u32;

        let free = fs.statfs().unwrap().free_blocks_count;
        let mut out = vec![0xFFu8; 2 * BSIZE];
        assert_eq!(fs.readi(&mut guard, 15 * BSIZE as u64, &mut out).unwrap(), 2 * BSIZE);
        assert!(out.iter().all(|&b| b == 0));
        // 读不分配块
        assert_eq!(fs.statfs().unwrap().free_blocks_count, free);
    }

    #[test]
    fn test_write_bounds() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let ip = fs.ialloc(InodeType::File).unwrap();
        let mut guard = fs.ilock(&ip).unwrap();
        fs.writei(&mut guard, 0, b"abc").unwrap();

        let err = fs.writei(&mut guard, 4, b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = fs.writei(&mut guard, u64::MAX, b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        // 恰好写到末尾是追加
        assert_eq!(fs.writei(&mut guard, 3, b"d").unwrap(), 1);
        assert_eq!(guard.size, 4);
        assert_eq!(fs.writei(&mut guard, 4, &[]).unwrap(), 0);
    }

    #[test]
    fn test_flags() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let ip = fs.ialloc(InodeType::File).unwrap();
        let mut guard = fs.ilock(&ip).unwrap();
        fs.writei(&mut guard, 0, b"0123456789").unwrap();

        guard.flags = InodeFlags::APPEND;
        let err = fs.writei(&mut guard, 0, b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(fs.writei(&mut guard, 10, b"x").unwrap(), 1);

        guard.flags = InodeFlags::IMMUTABLE;
        let err = fs.writei(&mut guard, 11, b"y").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        let mut out = [0u8; 11];
        assert_eq!(fs.readi(&mut guard, 0, &mut out).unwrap(), 11);

        guard.flags = InodeFlags::NOATIME;
        guard.atime = 5;
        fs.readi(&mut guard, 0, &mut out).unwrap();
        assert_eq!(guard.atime, 5);
        guard.flags = InodeFlags::empty();
        fs.readi(&mut guard, 0, &mut out).unwrap();
        assert_eq!(guard.atime, 0);
    }

    #[test]
    fn test_short_write_when_disk_fills() {
        let opts = FormatOptions {
            size: 64,
            ninodes: 16,
            nlog: 10,
        };
        let fs = mount(&opts, FsConfig::default());
        let free = fs.statfs().unwrap().free_blocks_count as usize;
        let ip = fs.ialloc(InodeType::File).unwrap();
        let mut guard = fs.ilock(&ip).unwrap();

        let data = pattern(60 * BSIZE, 3);
        let n = fs.writei(&mut guard, 0, &data).unwrap();
        // 直接块之后要多占一个一级间接块
        assert_eq!(n, (free - 1) * BSIZE);
        assert_eq!(guard.size as usize, n);
        assert_eq!(fs.statfs().unwrap().free_blocks_count, 0);

        let err = fs.writei(&mut guard, n as u64, b"more").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
    }

    #[test]
    fn test_journaled_write_persists_after_commit() {
        let fs = mount_journaled(&FormatOptions::default(), FsConfig::default());

        fs.begin_op().unwrap();
        let ip = fs.ialloc(InodeType::File).unwrap();
        let inum = ip.inum();
        let mut guard = fs.ilock(&ip).unwrap();
        guard.nlink = 1;
        fs.writei(&mut guard, 0, &pattern(2 * BSIZE + 10, 9)).unwrap();
        let first = guard.addrs[0];
        drop(guard);
        drop(ip);

        // 提交前数据只在缓存中
        assert!(fs.cache().device().snapshot(first).unwrap().iter().all(|&b| b == 0));
        let before_commit = fs.cache().device().writes();
        fs.end_op().unwrap();
        assert!(fs.cache().device().writes() > before_commit);
        assert_eq!(fs.cache().device().snapshot(first).unwrap(), pattern(BSIZE, 9));

        // 把磁盘内容复制到新设备上重新挂载，确认数据已落盘
        let size = fs.superblock().size;
        let disk = MemDevice::new(DEV, size);
        for blockno in 0..size {
            let block = fs.cache().device().snapshot(blockno).unwrap();
            disk.write_block(BlockId::new(DEV, blockno), &block).unwrap();
        }
        let fs2: FileSystem<_> = FileSystem::mount(disk, DEV, FsConfig::default()).unwrap();
        let ip = fs2.iget(inum).unwrap();
        let mut guard = fs2.ilock(&ip).unwrap();
        let mut out = vec![0u8; 2 * BSIZE + 10];
        assert_eq!(fs2.readi(&mut guard, 0, &mut out).unwrap(), out.len());
        assert!(out == pattern(2 * BSIZE + 10, 9));
    }

    #[test]
    fn test_journaled_write_outside_op_rejected() {
        let fs = mount_journaled(&FormatOptions::default(), FsConfig::default());
        fs.begin_op().unwrap();
        let ip = fs.ialloc(InodeType::File).unwrap();
        fs.end_op().unwrap();

        let mut guard = fs.ilock(&ip).unwrap();
        let err = fs.writei(&mut guard, 0, b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_concurrent_files() {
        let fs = Arc::new(mount(&FormatOptions::default(), FsConfig::default()));
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let fs = Arc::clone(&fs);
                std::thread::spawn(move || {
                    let ip = fs.ialloc(InodeType::File).unwrap();
                    let inum = ip.inum();
                    let mut guard = fs.ilock(&ip).unwrap();
                    guard.nlink = 1;
                    let data = pattern(20 * BSIZE, t);
                    for (i, chunk) in data.chunks(BSIZE / 2).enumerate() {
                        fs.writei(&mut guard, (i * BSIZE / 2) as u64, chunk).unwrap();
                    }
                    let mut back = vec![0u8; data.len()];
                    fs.readi(&mut guard, 0, &mut back).unwrap();
                    assert!(back == data);
                    drop(guard);
                    fs.iput(ip).unwrap();
                    inum
                })
            })
            .collect();

        let mut inums: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        inums.sort_unstable();
        inums.dedup();
        assert_eq!(inums.len(), 4);
        fs.cache().check_invariants().unwrap();
    }
}
