//! Superblock 解析和验证

use crate::{
    block::{BlockDevice, BlockId, DeviceId},
    cache::BlockCache,
    consts::*,
    error::{Error, ErrorKind, Result},
    transaction::Journal,
};
use byteorder::{ByteOrder, LittleEndian};

/// 磁盘上 superblock 的字节数（8 个字段 + 20 个保留字）
pub const SUPERBLOCK_SIZE: usize = 4 * (8 + 20);

/// Superblock
///
/// 磁盘布局：
///
/// ```text
/// [ boot | super | log ... | inodes ... | bitmap ... | data ... ]
///     0      1     logstart  inodestart   bmapstart
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Superblock {
    /// 魔数，必须为 [`FSMAGIC`]
    pub magic: u32,
    /// 文件系统总块数
    pub size: u32,
    /// 数据块数
    pub nblocks: u32,
    /// inode 数
    pub ninodes: u32,
    /// 日志块数
    pub nlog: u32,
    /// 第一个日志块
    pub logstart: u32,
    /// 第一个 inode 块
    pub inodestart: u32,
    /// 第一个位图块
    pub bmapstart: u32,
}

impl Superblock {
    /// 从磁盘字节解码
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < SUPERBLOCK_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "Superblock record too short"));
        }
        let mut fields = [0u32; 8];
        LittleEndian::read_u32_into(&raw[..32], &mut fields);
        Ok(Self {
            magic: fields[0],
            size: fields[1],
            nblocks: fields[2],
            ninodes: fields[3],
            nlog: fields[4],
            logstart: fields[5],
            inodestart: fields[6],
            bmapstart: fields[7],
        })
    }

    /// 编码到磁盘字节（保留字清零）
    pub fn encode(&self, raw: &mut [u8]) -> Result<()> {
        if raw.len() < SUPERBLOCK_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "Superblock record too short"));
        }
        let fields = [
            self.magic,
            self.size,
            self.nblocks,
            self.ninodes,
            self.nlog,
            self.logstart,
            self.inodestart,
            self.bmapstart,
        ];
        LittleEndian::write_u32_into(&fields, &mut raw[..32]);
        raw[32..SUPERBLOCK_SIZE].fill(0);
        Ok(())
    }

    /// 检查魔数和各区域边界
    pub fn validate(&self) -> Result<()> {
        if self.magic != FSMAGIC {
            return Err(Error::new(ErrorKind::Corrupted, "invalid file system magic"));
        }
        if self.ninodes == 0 {
            return Err(Error::new(ErrorKind::Corrupted, "file system has no inodes"));
        }
        if region_end(self.logstart, self.nlog)? > self.inodestart
            || region_end(self.inodestart, self.ninodeblocks())? > self.bmapstart
            || region_end(self.bmapstart, self.nbitmap())? > self.size
        {
            return Err(Error::new(ErrorKind::Corrupted, "overlapping disk regions"));
        }
        Ok(())
    }

    /// 包含 inode `inum` 的块号
    pub fn iblock(&self, inum: u32) -> u32 {
        inum / IPB + self.inodestart
    }

    /// inode `inum` 在其所在块内的字节偏移
    pub fn inode_offset(inum: u32) -> usize {
        (inum % IPB) as usize * DINODE_SIZE
    }

    /// 包含块 `b` 的空闲位的位图块号
    pub fn bblock(&self, b: u32) -> u32 {
        b / BPB + self.bmapstart
    }

    /// inode 区块数
    pub fn ninodeblocks(&self) -> u32 {
        self.ninodes / IPB + 1
    }

    /// 位图区块数
    pub fn nbitmap(&self) -> u32 {
        self.size / BPB + 1
    }

    /// 第一个数据块
    ///
    /// 未通过 [`validate`](Self::validate) 的 superblock 上结果饱和到 `u32::MAX`。
    pub fn data_start(&self) -> u32 {
        self.bmapstart.saturating_add(self.nbitmap())
    }
}

fn region_end(start: u32, len: u32) -> Result<u32> {
    start
        .checked_add(len)
        .ok_or(Error::new(ErrorKind::Corrupted, "disk region past end of address space"))
}

/// 通过块缓存读取并验证 superblock
pub fn read_superblock<D: BlockDevice, J: Journal>(
    cache: &BlockCache<D, J>,
    dev: DeviceId,
) -> Result<Superblock> {
    let buf = cache.read(BlockId::new(dev, SUPERBLOCK_BLOCKNO))?;
    let sb = Superblock::decode(buf.data())?;
    drop(buf);

    sb.validate()?;
    log::debug!(
        "[FS] superblock dev={}: size={} ninodes={} nlog={} inodestart={} bmapstart={}",
        dev,
        sb.size,
        sb.ninodes,
        sb.nlog,
        sb.inodestart,
        sb.bmapstart
    );
    Ok(sb)
}
