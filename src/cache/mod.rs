//! 块缓存模块
//!
//! 固定数量的内存缓存块，是磁盘块在内存中的唯一副本。
//!
//! # 主要组件
//!
//! - [`BlockCache`] - 块缓存管理器：获取、读取、写入、释放、钉住
//! - [`BufGuard`] - 持有中的缓存块（即内容锁），离开作用域自动释放
//! - [`Pinned`] - 钉住凭证，用于日志在事务期间保持块驻留
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 结构
//!
//! ```text
//! HashIndex     (dev, blockno) -> 槽位          开放寻址，三角数探测
//! EvictionHeap  引用计数为零的槽位，按时间戳    二叉最小堆
//! BufMeta[N]    身份 / 引用计数 / 时间戳 / 堆位置   元数据锁
//! Buffer[N]     valid + 内容锁(数据, 标志)
//! ```
//!
//! 查找 O(1) 均摊，回收与释放 O(log N)。
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use xv6fs_core::{BlockCache, BlockId, MemDevice};
//!
//! let cache = BlockCache::new(MemDevice::new(1, 1024), 30)?;
//!
//! let mut buf = cache.read(BlockId::new(1, 100))?;
//! buf.data_mut()[0] = 42;
//! cache.write(&mut buf)?;
//! drop(buf); // 释放引用，进入 LRU
//!
//! let stats = cache.stats();
//! log::info!("hits={} misses={}", stats.hits, stats.misses);
//! ```

mod block_cache;
mod buffer;
mod hash_index;
mod heap;

pub use block_cache::{BlockCache, BufGuard, CacheStats, Pinned, DEFAULT_CACHE_SIZE};
pub use buffer::{BufferId, CacheFlags};
