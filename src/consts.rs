//! 文件系统常量定义
//!
//! 这个模块包含了磁盘布局、inode 寻址和资源池大小的所有常量定义：
//! - 块大小与超级块魔数
//! - 直接/间接块寻址的扇出与容量
//! - 磁盘 inode 与位图的打包方式
//! - 缓存、inode 表和日志的默认容量

//=============================================================================
// 基础常量
//=============================================================================

/// 块大小（字节）
pub const BSIZE: usize = 1024;

/// 超级块魔数
pub const FSMAGIC: u32 = 0x1020_3040;

/// 超级块所在的块号（0 号块为引导块）
pub const SUPERBLOCK_BLOCKNO: u32 = 1;

/// 根目录 inode 编号
pub const ROOTINO: u32 = 1;

//=============================================================================
// 块寻址
//=============================================================================

/// 块指针宽度（字节）
pub const POINTER_SIZE: usize = core::mem::size_of::<u32>();

/// 直接块指针数量
pub const NDIRECT: usize = 12;

/// 每个间接块可容纳的指针数量 (K)
pub const NINDIRECT: usize = BSIZE / POINTER_SIZE;

/// 二级间接块可寻址的块数 (K²)
pub const DOUBLE_INDIRECT: usize = NINDIRECT * NINDIRECT;

/// 三级间接块可寻址的块数 (K³)
pub const TRIPLE_INDIRECT: usize = DOUBLE_INDIRECT * NINDIRECT;

/// inode 中块指针槽位总数（12 直接 + 一/二/三级间接各 1）
pub const NADDRS: usize = NDIRECT + 3;

/// 单个文件最大块数
pub const MAXFILE: u64 = (NDIRECT + NINDIRECT + DOUBLE_INDIRECT + TRIPLE_INDIRECT) as u64;

/// 单个文件最大字节数
pub const MAXFILE_BYTES: u64 = MAXFILE * BSIZE as u64;

/// 间接寻址最大深度
pub const MAX_INDIRECT_DEPTH: usize = 3;

//=============================================================================
// 磁盘 inode 与位图
//=============================================================================

/// 磁盘 inode 记录大小（字节）
pub const DINODE_SIZE: usize = 128;

/// 每块 inode 数
pub const IPB: u32 = (BSIZE / DINODE_SIZE) as u32;

/// 每个位图块覆盖的块数
pub const BPB: u32 = (BSIZE * 8) as u32;

//=============================================================================
// 资源池与日志
//=============================================================================

/// 单个文件系统操作最多写入的块数
pub const MAXOPBLOCKS: usize = 10;

/// 日志最多容纳的数据块数
pub const LOGSIZE: usize = MAXOPBLOCKS * 3;

/// 默认缓存块数量（比日志容量多一块，保证提交时仍有可回收的缓存块）
pub const NBUF: usize = MAXOPBLOCKS * 3 + 1;

/// 默认内存 inode 表容量
pub const NINODE: usize = 50;
