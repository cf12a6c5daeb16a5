//! 文件系统核心结构

use crate::{
    balloc,
    block::{BlockDevice, BlockId, DeviceId},
    cache::{BlockCache, BufGuard},
    error::Result,
    ialloc,
    indirect::BlockMapper,
    inode::{self, Inode, InodeGuard, InodeTable},
    superblock::{read_superblock, Superblock},
    transaction::{Journal, NoJournal},
    types::{FileStat, InodeType},
};
use core::marker::PhantomData;

use super::types::{FsConfig, NoHal, StatFs, SystemHal};

/// 已挂载的文件系统
///
/// 把块缓存、inode 表和块映射器组合在一起，是上层（目录、文件描述符）
/// 访问存储的唯一入口。所有方法都只需要 `&self`，可以在多个线程间共享。
///
/// # 示例
///
/// ```rust,ignore
/// let fs: FileSystem<_> = FileSystem::mount(disk, 1, FsConfig::default())?;
///
/// fs.begin_op()?;
/// let ip = fs.ialloc(InodeType::File)?;
/// let mut guard = fs.ilock(&ip)?;
/// guard.nlink = 1;
/// fs.iupdate(&guard)?;
/// fs.writei(&mut guard, 0, b"hello")?;
/// fs.iunlockput(guard, ip)?;
/// fs.end_op()?;
/// ```
pub struct FileSystem<D: BlockDevice, J: Journal = NoJournal, H: SystemHal = NoHal> {
    pub(super) cache: BlockCache<D, J>,
    pub(super) itable: InodeTable,
    pub(super) mapper: BlockMapper,
    pub(super) sb: Superblock,
    pub(super) dev: DeviceId,
    _hal: PhantomData<fn() -> H>,
}

impl<D: BlockDevice, H: SystemHal> FileSystem<D, NoJournal, H> {
    /// 挂载文件系统，不启用事务
    ///
    /// # 错误
    ///
    /// - `ErrorKind::Corrupted` - superblock 魔数不符或布局无效
    /// - `ErrorKind::Io` - 设备读取失败
    pub fn mount(device: D, dev: DeviceId, config: FsConfig) -> Result<Self> {
        Self::mount_with_journal(device, NoJournal, dev, config)
    }
}

impl<D: BlockDevice, J: Journal, H: SystemHal> FileSystem<D, J, H> {
    /// 挂载文件系统，写操作经过给定的日志
    pub fn mount_with_journal(device: D, journal: J, dev: DeviceId, config: FsConfig) -> Result<Self> {
        let cache = BlockCache::with_journal(device, journal, config.nbuf)?;
        let sb = read_superblock(&cache, dev)?;
        let itable = InodeTable::new(config.ninode)?;

        log::debug!(
            "[FS] mounted dev {}: size={} ninodes={} nlog={} nbuf={} ninode={}",
            dev,
            sb.size,
            sb.ninodes,
            sb.nlog,
            config.nbuf,
            config.ninode
        );

        Ok(Self {
            cache,
            itable,
            mapper: BlockMapper::new(),
            sb,
            dev,
            _hal: PhantomData,
        })
    }

    /// Superblock
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    /// 块缓存
    pub fn cache(&self) -> &BlockCache<D, J> {
        &self.cache
    }

    /// 内存 inode 表
    pub fn itable(&self) -> &InodeTable {
        &self.itable
    }

    /// 设备号
    pub fn dev(&self) -> DeviceId {
        self.dev
    }

    /// 当前时间戳（秒）；平台没有时钟时为 0
    pub fn now(&self) -> u32 {
        H::now()
            .map(|t| u32::try_from(t.as_secs()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }

    // ===== 事务 =====

    /// 开始一次文件系统操作
    pub fn begin_op(&self) -> Result<()> {
        self.cache.begin_op()
    }

    /// 结束一次文件系统操作，必要时提交
    pub fn end_op(&self) -> Result<()> {
        self.cache.end_op()
    }

    // ===== 块 =====

    /// 读取一个块并持有其内容锁（bread）
    pub fn bread(&self, blockno: u32) -> Result<BufGuard<'_>> {
        self.cache.read(BlockId::new(self.dev, blockno))
    }

    /// 写出块（bwrite）；事务模式下记入日志
    pub fn bwrite(&self, buf: &mut BufGuard<'_>) -> Result<()> {
        self.cache.write(buf)
    }

    /// 释放块（brelse）
    pub fn brelse(&self, buf: BufGuard<'_>) {
        self.cache.release(buf)
    }

    /// 分配一个清零的数据块
    pub fn balloc(&self) -> Result<u32> {
        balloc::balloc(&self.cache, &self.sb, self.dev)
    }

    /// 释放一个数据块
    pub fn bfree(&self, blockno: u32) -> Result<()> {
        balloc::bfree(&self.cache, &self.sb, self.dev, blockno)
    }

    /// 清零一个块
    pub fn bzero(&self, blockno: u32) -> Result<()> {
        balloc::bzero(&self.cache, self.dev, blockno)
    }

    // ===== inode =====

    /// 分配一个新的磁盘 inode，返回未加锁的引用
    pub fn ialloc(&self, typ: InodeType) -> Result<Inode<'_>> {
        ialloc::ialloc(&self.itable, &self.cache, &self.sb, self.dev, typ, self.now())
    }

    /// 取得 inode 引用，不读盘（iget）
    pub fn iget(&self, inum: u32) -> Result<Inode<'_>> {
        self.itable.get(self.dev, inum)
    }

    /// 复制引用（idup）
    pub fn idup<'a>(&'a self, ip: &Inode<'a>) -> Inode<'a> {
        ip.dup()
    }

    /// 加锁并在需要时从磁盘载入（ilock）
    pub fn ilock<'a>(&'a self, ip: &Inode<'a>) -> Result<InodeGuard<'a>> {
        ip.lock(&self.cache, &self.sb)
    }

    /// 解锁（iunlock）
    pub fn iunlock(&self, guard: InodeGuard<'_>) {
        drop(guard);
    }

    /// 写回内存 inode（iupdate）
    pub fn iupdate(&self, guard: &InodeGuard<'_>) -> Result<()> {
        inode::iupdate(&self.cache, &self.sb, guard)
    }

    /// 放弃一个引用（iput）
    ///
    /// 最后一个引用且链接数为零时，释放全部数据块，磁盘类型置为空闲并写回。
    /// 事务模式下必须在 `begin_op`/`end_op` 之间调用。
    pub fn iput(&self, ip: Inode<'_>) -> Result<()> {
        if let Some(mut guard) = self.itable.reclaim(&ip)? {
            log::debug!("[FS] freeing unlinked inode {} on dev {}", ip.inum(), self.dev);
            self.mapper.truncate(&self.cache, &self.sb, &mut guard)?;
            guard.typ = InodeType::Free;
            guard.dtime = self.now();
            self.iupdate(&guard)?;
            guard.invalidate();
        }
        drop(ip);
        Ok(())
    }

    /// 解锁后放弃引用（iunlockput）
    pub fn iunlockput(&self, guard: InodeGuard<'_>, ip: Inode<'_>) -> Result<()> {
        drop(guard);
        self.iput(ip)
    }

    /// 释放 inode 的全部数据块，大小置零（itrunc）
    pub fn itrunc(&self, guard: &mut InodeGuard<'_>) -> Result<()> {
        self.mapper.truncate(&self.cache, &self.sb, guard)
    }

    /// 设置时间戳（itimeset），只改内存，需要随后 [`iupdate`](Self::iupdate)
    pub fn itimeset(&self, guard: &mut InodeGuard<'_>, atime: u32, ctime: u32, mtime: u32, dtime: u32) {
        guard.set_times(atime, ctime, mtime, dtime);
    }

    /// 文件状态（stati）
    pub fn stati(&self, guard: &InodeGuard<'_>) -> FileStat {
        guard.stat()
    }

    /// 把逻辑块号映射为物理块号，缺失时分配（bmap）
    ///
    /// 新分配的根指针只在内存中，调用者负责 [`iupdate`](Self::iupdate)。
    pub fn bmap(&self, guard: &mut InodeGuard<'_>, logical_block: u64) -> Result<u32> {
        self.mapper.resolve(&self.cache, &self.sb, guard, logical_block)
    }

    /// 文件系统统计信息
    pub fn statfs(&self) -> Result<StatFs> {
        Ok(StatFs {
            inodes_count: self.sb.ninodes,
            free_inodes_count: ialloc::count_free_inodes(&self.cache, &self.sb, self.dev)?,
            blocks_count: self.sb.nblocks,
            free_blocks_count: balloc::count_free(&self.cache, &self.sb, self.dev)?,
            block_size: crate::consts::BSIZE as u32,
        })
    }
}

impl<D: BlockDevice, J: Journal, H: SystemHal> core::fmt::Debug for FileSystem<D, J, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileSystem")
            .field("dev", &self.dev)
            .field("sb", &self.sb)
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;
    use crate::consts::{BSIZE, NDIRECT, ROOTINO};
    use crate::error::ErrorKind;
    use crate::superblock::FormatOptions;
    use crate::test_support::{formatted_disk, mount, mount_journaled, DEV};
    use core::time::Duration;

    struct FixedClock;

    impl SystemHal for FixedClock {
        fn now() -> Option<Duration> {
            Some(Duration::from_secs(1_700_000_000))
        }
    }

    #[test]
    fn test_mount_reads_superblock() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        assert_eq!(fs.superblock().size, 2000);
        assert_eq!(fs.dev(), DEV);
        assert_eq!(fs.cache().capacity(), crate::consts::NBUF);
        assert_eq!(fs.itable().capacity(), crate::consts::NINODE);
        assert_eq!(fs.now(), 0);
    }

    #[test]
    fn test_mount_rejects_blank_disk() {
        let disk = MemDevice::new(DEV, 64);
        let mounted: Result<FileSystem<MemDevice>> = FileSystem::mount(disk, DEV, FsConfig::default());
        assert_eq!(mounted.unwrap_err().kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn test_root_inode() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let root = fs.iget(ROOTINO).unwrap();
        let guard = fs.ilock(&root).unwrap();
        let st = fs.stati(&guard);
        assert_eq!(st.ino, ROOTINO);
        assert_eq!(st.typ, InodeType::Directory);
        assert_eq!(st.nlink, 1);
        fs.iunlock(guard);
        fs.iput(root).unwrap();
    }

    #[test]
    fn test_iput_frees_unlinked_inode() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let before = fs.statfs().unwrap();

        let ip = fs.ialloc(InodeType::File).unwrap();
        let inum = ip.inum();
        let mut guard = fs.ilock(&ip).unwrap();
        for bn in [0u64, 5, 12, 300] {
            fs.bmap(&mut guard, bn).unwrap();
        }
        fs.iupdate(&guard).unwrap();

        let mid = fs.statfs().unwrap();
        assert_eq!(mid.free_inodes_count, before.free_inodes_count - 1);
        // 4 个数据块 + 一级间接块 + 二级间接的两层
        assert_eq!(mid.free_blocks_count, before.free_blocks_count - 7);

        fs.iunlockput(guard, ip).unwrap();
        let after = fs.statfs().unwrap();
        assert_eq!(after, before);

        // 磁盘上已是空闲类型
        let again = fs.iget(inum).unwrap();
        assert_eq!(fs.ilock(&again).unwrap_err().kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn test_iput_keeps_linked_inode() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let ip = fs.ialloc(InodeType::File).unwrap();
        let inum = ip.inum();
        let mut guard = fs.ilock(&ip).unwrap();
        guard.nlink = 1;
        fs.bmap(&mut guard, 0).unwrap();
        fs.iupdate(&guard).unwrap();
        fs.iunlockput(guard, ip).unwrap();

        let ip = fs.iget(inum).unwrap();
        let guard = fs.ilock(&ip).unwrap();
        assert_eq!(guard.typ, InodeType::File);
        assert_ne!(guard.addrs[0], 0);
    }

    #[test]
    fn test_iput_with_other_reference_defers() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let ip = fs.ialloc(InodeType::File).unwrap();
        let other = fs.idup(&ip);
        assert_eq!(ip.refcount(), 2);
        drop(fs.ilock(&ip).unwrap());

        let free = fs.statfs().unwrap().free_inodes_count;
        fs.iput(other).unwrap();
        assert_eq!(fs.statfs().unwrap().free_inodes_count, free);
        fs.iput(ip).unwrap();
        assert_eq!(fs.statfs().unwrap().free_inodes_count, free + 1);
    }

    #[test]
    fn test_locked_inode_keeps_its_slot() {
        let config = FsConfig {
            ninode: 1,
            ..FsConfig::default()
        };
        let fs = mount(&FormatOptions::default(), config);
        let free = fs.statfs().unwrap().free_inodes_count;

        let ip = fs.ialloc(InodeType::File).unwrap();
        let inum = ip.inum();
        let guard = fs.ilock(&ip).unwrap();
        drop(ip);
        // 锁还在，槽位不能换成别的 inode
        assert_eq!(fs.iget(ROOTINO).unwrap_err().kind(), ErrorKind::Busy);
        assert_eq!(fs.stati(&guard).ino, inum);
        fs.iunlock(guard);

        let root = fs.iget(ROOTINO).unwrap();
        assert_eq!(fs.ilock(&root).unwrap().typ, InodeType::Directory);
        fs.iput(root).unwrap();

        let ip = fs.iget(inum).unwrap();
        drop(fs.ilock(&ip).unwrap());
        fs.iput(ip).unwrap();
        assert_eq!(fs.statfs().unwrap().free_inodes_count, free);
        assert_eq!(fs.itable().in_use(), 0);
    }

    #[test]
    fn test_journaled_iput_frees_indirect_blocks() {
        let fs = mount_journaled(&FormatOptions::default(), FsConfig::default());
        let before = fs.statfs().unwrap();

        fs.begin_op().unwrap();
        let ip = fs.ialloc(InodeType::File).unwrap();
        let inum = ip.inum();
        let mut guard = fs.ilock(&ip).unwrap();
        // 写满直接块后进入一级间接块
        let data = alloc::vec![0xA5u8; (NDIRECT + 2) * BSIZE];
        assert_eq!(fs.writei(&mut guard, 0, &data).unwrap(), data.len());
        assert_ne!(guard.addrs[NDIRECT], 0);
        drop(guard);
        fs.end_op().unwrap();

        let mid = fs.statfs().unwrap();
        assert_eq!(mid.free_inodes_count, before.free_inodes_count - 1);
        assert_eq!(mid.free_blocks_count, before.free_blocks_count - (NDIRECT as u32 + 3));

        fs.begin_op().unwrap();
        fs.iput(ip).unwrap();
        fs.end_op().unwrap();

        assert_eq!(fs.statfs().unwrap(), before);
        assert_eq!(fs.cache().journal().pending(), 0);
        assert_eq!(fs.cache().free_buffers(), fs.cache().capacity());
        fs.cache().check_invariants().unwrap();

        // 提交后磁盘上的位图和 inode 都已恢复空闲
        let size = fs.superblock().size;
        let disk = MemDevice::new(DEV, size);
        for blockno in 0..size {
            let block = fs.cache().device().snapshot(blockno).unwrap();
            disk.write_block(BlockId::new(DEV, blockno), &block).unwrap();
        }
        let fs2: FileSystem<_> = FileSystem::mount(disk, DEV, FsConfig::default()).unwrap();
        assert_eq!(fs2.statfs().unwrap(), before);
        let again = fs2.iget(inum).unwrap();
        assert_eq!(fs2.ilock(&again).unwrap_err().kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn test_timestamps_from_hal() {
        let (disk, _) = formatted_disk(&FormatOptions::default());
        let fs: FileSystem<_, NoJournal, FixedClock> =
            FileSystem::mount(disk, DEV, FsConfig::default()).unwrap();
        assert_eq!(fs.now(), 1_700_000_000);

        let ip = fs.ialloc(InodeType::File).unwrap();
        let mut guard = fs.ilock(&ip).unwrap();
        assert_eq!(guard.ctime, 1_700_000_000);
        fs.itimeset(&mut guard, 1, 2, 3, 4);
        assert_eq!((guard.atime, guard.ctime, guard.mtime, guard.dtime), (1, 2, 3, 4));
    }

    #[test]
    fn test_itrunc() {
        let fs = mount(&FormatOptions::default(), FsConfig::default());
        let free = fs.statfs().unwrap().free_blocks_count;
        let ip = fs.ialloc(InodeType::File).unwrap();
        let mut guard = fs.ilock(&ip).unwrap();
        guard.nlink = 1;
        fs.bmap(&mut guard, 20).unwrap();
        guard.size = 21 * crate::consts::BSIZE as u32;
        fs.iupdate(&guard).unwrap();
        assert_eq!(fs.statfs().unwrap().free_blocks_count, free - 2);

        fs.itrunc(&mut guard).unwrap();
        assert_eq!(guard.size, 0);
        assert_eq!(guard.addrs, [0; crate::consts::NADDRS]);
        assert_eq!(fs.statfs().unwrap().free_blocks_count, free);
    }
}
