//! 测试用的格式化内存盘

use crate::block::{DeviceId, MemDevice};
use crate::cache::BlockCache;
use crate::fs::{FileSystem, FsConfig};
use crate::superblock::{format, FormatOptions, Superblock};
use crate::transaction::{Journal, SimpleJournal};

pub(crate) const DEV: DeviceId = 1;

pub(crate) fn formatted_disk(opts: &FormatOptions) -> (MemDevice, Superblock) {
    let disk = MemDevice::new(DEV, opts.size);
    let sb = format(&disk, DEV, opts).unwrap();
    (disk, sb)
}

pub(crate) fn formatted_cache(nbuf: usize) -> (BlockCache<MemDevice>, Superblock) {
    let (disk, sb) = formatted_disk(&FormatOptions::default());
    (BlockCache::new(disk, nbuf).unwrap(), sb)
}

pub(crate) fn mount(opts: &FormatOptions, config: FsConfig) -> FileSystem<MemDevice> {
    let (disk, _) = formatted_disk(opts);
    FileSystem::mount(disk, DEV, config).unwrap()
}

pub(crate) fn mount_journaled(
    opts: &FormatOptions,
    config: FsConfig,
) -> FileSystem<MemDevice, SimpleJournal> {
    let (disk, _) = formatted_disk(opts);
    let journal = SimpleJournal::new(true);
    assert!(journal.is_enabled());
    FileSystem::mount_with_journal(disk, journal, DEV, config).unwrap()
}
