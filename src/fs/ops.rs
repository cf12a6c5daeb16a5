//! 文件系统操作接口
//!
//! 上层只依赖这组块级和 inode 分配操作，不关心具体的存储后端。
//! 目前唯一的实现是 [`FileSystem`]。

use crate::{
    block::BlockDevice,
    cache::BufGuard,
    error::Result,
    inode::Inode,
    superblock::{read_superblock, Superblock},
    transaction::Journal,
    types::InodeType,
};

use super::{filesystem::FileSystem, types::SystemHal};

/// 文件系统操作表
pub trait FsOperations {
    /// 从磁盘重新读取 superblock
    fn read_superblock(&self) -> Result<Superblock>;

    /// 分配 inode
    fn ialloc(&self, typ: InodeType) -> Result<Inode<'_>>;

    /// 分配数据块
    fn balloc(&self) -> Result<u32>;

    /// 清零块
    fn bzero(&self, blockno: u32) -> Result<()>;

    /// 释放数据块
    fn bfree(&self, blockno: u32) -> Result<()>;

    /// 读块
    fn bread(&self, blockno: u32) -> Result<BufGuard<'_>>;

    /// 写块
    fn bwrite(&self, buf: &mut BufGuard<'_>) -> Result<()>;

    /// 释放块
    fn brelse(&self, buf: BufGuard<'_>);
}

impl<D: BlockDevice, J: Journal, H: SystemHal> FsOperations for FileSystem<D, J, H> {
    fn read_superblock(&self) -> Result<Superblock> {
        read_superblock(&self.cache, self.dev)
    }

    fn ialloc(&self, typ: InodeType) -> Result<Inode<'_>> {
        FileSystem::ialloc(self, typ)
    }

    fn balloc(&self) -> Result<u32> {
        FileSystem::balloc(self)
    }

    fn bzero(&self, blockno: u32) -> Result<()> {
        FileSystem::bzero(self, blockno)
    }

    fn bfree(&self, blockno: u32) -> Result<()> {
        FileSystem::bfree(self, blockno)
    }

    fn bread(&self, blockno: u32) -> Result<BufGuard<'_>> {
        FileSystem::bread(self, blockno)
    }

    fn bwrite(&self, buf: &mut BufGuard<'_>) -> Result<()> {
        FileSystem::bwrite(self, buf)
    }

    fn brelse(&self, buf: BufGuard<'_>) {
        FileSystem::brelse(self, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FsConfig;
    use crate::superblock::FormatOptions;
    use crate::test_support::mount;

    // 只通过操作表使用文件系统
    fn scratch_block<F: FsOperations>(fs: &F, byte: u8) -> Result<u32> {
        let blockno = fs.balloc()?;
        let mut buf = fs.bread(blockno)?;
        assert!(buf.data().iter().all(|&b| b == 0));
        buf.data_mut().fill(byte);
        fs.bwrite(&mut buf)?;
        fs.brelse(buf);
        Ok(blockno)
    }

    #[test]
    fn test_ops_through_trait() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let ops: &dyn FsOperations = &fs;

        let sb = ops.read_superblock().unwrap();
        assert_eq!(&sb, fs.superblock());

        let blockno = scratch_block(&fs, 0x5A).unwrap();
        assert_eq!(blockno, sb.data_start());
        assert!(fs.cache().device().snapshot(blockno).unwrap().iter().all(|&b| b == 0x5A));

        ops.bzero(blockno).unwrap();
        assert!(ops.bread(blockno).unwrap().data().iter().all(|&b| b == 0));
        ops.bfree(blockno).unwrap();
        assert_eq!(ops.balloc().unwrap(), blockno);

        let ip = ops.ialloc(InodeType::Device).unwrap();
        let guard = fs.ilock(&ip).unwrap();
        assert_eq!(guard.typ, InodeType::Device);
    }
}
