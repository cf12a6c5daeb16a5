//! 块设备抽象
//!
//! 提供磁盘读写原语接口和块标识类型。
//! block/device.rs 定义外部磁盘驱动需要实现的 `BlockDevice` trait，
//! 块缓存通过它完成所有物理 I/O。
//! block/ramdisk.rs 提供基于内存的设备实现

mod device;
mod ramdisk;

pub use device::{BlockDevice, BlockId, DeviceId};
pub use ramdisk::MemDevice;
