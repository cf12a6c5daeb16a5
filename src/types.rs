//! 磁盘数据结构定义
//!
//! 磁盘 inode 记录的位精确编解码。所有多字节字段均为小端序。
//!
//! ```text
//! offset  size  field
//!      0     2  type
//!      2     2  major
//!      4     2  minor
//!      6     2  nlink
//!      8     4  size
//!     12    60  addrs[NDIRECT + 3]
//!     72     4  atime
//!     76     4  ctime
//!     80     4  mtime
//!     84     4  dtime
//!     88     4  iflags
//!     92     4  generation
//!     96     4  gid
//!    100    28  osd_2[7]（保留）
//! ```

use crate::consts::{DINODE_SIZE, NADDRS, NDIRECT};
use crate::error::{Error, ErrorKind, Result};
use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};

/// Inode 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i16)]
pub enum InodeType {
    /// 空闲（未分配）
    #[default]
    Free = 0,
    /// 目录
    Directory = 1,
    /// 普通文件
    File = 2,
    /// 设备文件
    Device = 3,
}

impl InodeType {
    /// 从磁盘上的原始类型值解析
    pub fn from_raw(raw: i16) -> Result<Self> {
        match raw {
            0 => Ok(InodeType::Free),
            1 => Ok(InodeType::Directory),
            2 => Ok(InodeType::File),
            3 => Ok(InodeType::Device),
            _ => Err(Error::new(ErrorKind::Corrupted, "Unknown inode type")),
        }
    }

    /// 磁盘上的原始类型值
    pub fn raw(self) -> i16 {
        self as i16
    }

    /// 是否空闲
    pub fn is_free(self) -> bool {
        self == InodeType::Free
    }
}

bitflags! {
    /// Inode 标志（磁盘 `iflags` 字段）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InodeFlags: u32 {
        /// 安全删除
        const SECRM     = 0x0000_0001;
        /// 允许反删除
        const UNRM      = 0x0000_0002;
        /// 压缩文件
        const COMPR     = 0x0000_0004;
        /// 同步更新
        const SYNC      = 0x0000_0008;
        /// 不可修改
        const IMMUTABLE = 0x0000_0010;
        /// 仅追加写
        const APPEND    = 0x0000_0020;
        /// 不转储
        const NODUMP    = 0x0000_0040;
        /// 不更新访问时间
        const NOATIME   = 0x0000_0080;
    }
}

impl Default for InodeFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// 磁盘 inode
///
/// 内存中 inode 的内容字段也直接使用这个结构缓存。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskInode {
    /// 文件类型
    pub typ: InodeType,
    /// 主设备号（仅设备文件）
    pub major: i16,
    /// 次设备号（仅设备文件）
    pub minor: i16,
    /// 硬链接数
    pub nlink: i16,
    /// 文件大小（字节）
    pub size: u32,
    /// 块指针：12 个直接块 + 一级/二级/三级间接块
    pub addrs: [u32; NADDRS],
    /// 访问时间
    pub atime: u32,
    /// 创建时间
    pub ctime: u32,
    /// 修改时间
    pub mtime: u32,
    /// 删除时间
    pub dtime: u32,
    /// 标志
    pub flags: InodeFlags,
    /// 文件版本
    pub generation: u32,
    /// 组 ID
    pub gid: u32,
}

impl DiskInode {
    /// 创建指定类型的新 inode，块指针全部为零
    pub fn new(typ: InodeType, now: u32) -> Self {
        Self {
            typ,
            atime: now,
            ctime: now,
            mtime: now,
            ..Self::default()
        }
    }

    /// 从磁盘 inode 记录解码
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < DINODE_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "Inode record too short"));
        }

        let mut addrs = [0u32; NADDRS];
        LittleEndian::read_u32_into(&raw[12..12 + NADDRS * 4], &mut addrs);

        Ok(Self {
            typ: InodeType::from_raw(LittleEndian::read_i16(&raw[0..]))?,
            major: LittleEndian::read_i16(&raw[2..]),
            minor: LittleEndian::read_i16(&raw[4..]),
            nlink: LittleEndian::read_i16(&raw[6..]),
            size: LittleEndian::read_u32(&raw[8..]),
            addrs,
            atime: LittleEndian::read_u32(&raw[72..]),
            ctime: LittleEndian::read_u32(&raw[76..]),
            mtime: LittleEndian::read_u32(&raw[80..]),
            dtime: LittleEndian::read_u32(&raw[84..]),
            flags: InodeFlags::from_bits_retain(LittleEndian::read_u32(&raw[88..])),
            generation: LittleEndian::read_u32(&raw[92..]),
            gid: LittleEndian::read_u32(&raw[96..]),
        })
    }

    /// 编码到磁盘 inode 记录（保留字段清零）
    pub fn encode(&self, raw: &mut [u8]) -> Result<()> {
        if raw.len() < DINODE_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "Inode record too short"));
        }

        let raw = &mut raw[..DINODE_SIZE];
        raw.fill(0);
        LittleEndian::write_i16(&mut raw[0..], self.typ.raw());
        LittleEndian::write_i16(&mut raw[2..], self.major);
        LittleEndian::write_i16(&mut raw[4..], self.minor);
        LittleEndian::write_i16(&mut raw[6..], self.nlink);
        LittleEndian::write_u32(&mut raw[8..], self.size);
        LittleEndian::write_u32_into(&self.addrs, &mut raw[12..12 + NADDRS * 4]);
        LittleEndian::write_u32(&mut raw[72..], self.atime);
        LittleEndian::write_u32(&mut raw[76..], self.ctime);
        LittleEndian::write_u32(&mut raw[80..], self.mtime);
        LittleEndian::write_u32(&mut raw[84..], self.dtime);
        LittleEndian::write_u32(&mut raw[88..], self.flags.bits());
        LittleEndian::write_u32(&mut raw[92..], self.generation);
        LittleEndian::write_u32(&mut raw[96..], self.gid);
        Ok(())
    }

    /// 第 `index` 个直接块指针
    pub fn direct(&self, index: usize) -> Option<u32> {
        if index < NDIRECT {
            Some(self.addrs[index])
        } else {
            None
        }
    }

    /// 一级/二级/三级间接块指针（`depth` 取 1..=3）
    pub fn indirect_root(&self, depth: usize) -> u32 {
        self.addrs[NDIRECT + depth - 1]
    }
}

/// 文件状态信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    /// 设备号
    pub dev: u32,
    /// inode 编号
    pub ino: u32,
    /// 文件类型
    pub typ: InodeType,
    /// 硬链接数
    pub nlink: i16,
    /// 文件大小（字节）
    pub size: u64,
}
