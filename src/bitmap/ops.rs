//! 位图操作
//!
//! 位 `i` 位于字节 `i / 8` 的第 `i % 8` 位（低位在前），1 表示已用。

use crate::error::{Error, ErrorKind, Result};

/// 测试位图中某一位是否被设置
///
/// 超出位图范围的位视为未设置。
pub fn test_bit(bitmap: &[u8], index: u32) -> bool {
    let byte_index = (index / 8) as usize;
    bitmap
        .get(byte_index)
        .map_or(false, |byte| byte & (1 << (index % 8)) != 0)
}

/// 设置位图中的某一位
pub fn set_bit(bitmap: &mut [u8], index: u32) -> Result<()> {
    let byte = bitmap
        .get_mut((index / 8) as usize)
        .ok_or(Error::new(ErrorKind::InvalidInput, "Bitmap index out of range"))?;
    *byte |= 1 << (index % 8);
    Ok(())
}

/// 清除位图中的某一位
pub fn clear_bit(bitmap: &mut [u8], index: u32) -> Result<()> {
    let byte = bitmap
        .get_mut((index / 8) as usize)
        .ok_or(Error::new(ErrorKind::InvalidInput, "Bitmap index out of range"))?;
    *byte &= !(1 << (index % 8));
    Ok(())
}

/// 在 `[start, end)` 中查找第一个空闲位
///
/// 全满的字节整体跳过。
pub fn find_first_zero(bitmap: &[u8], start: u32, end: u32) -> Option<u32> {
    let end = end.min((bitmap.len() * 8) as u32);
    let mut i = start;
    while i < end {
        if i % 8 == 0 && bitmap[(i / 8) as usize] == 0xFF {
            i += 8;
            continue;
        }
        if !test_bit(bitmap, i) {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// 统计 `[start, end)` 中被设置的位数
pub fn count_ones(bitmap: &[u8], start: u32, end: u32) -> u32 {
    let end = end.min((bitmap.len() * 8) as u32);
    let mut count = 0;
    let mut i = start;
    while i < end {
        if i % 8 == 0 && i + 8 <= end {
            count += bitmap[(i / 8) as usize].count_ones();
            i += 8;
        } else {
            count += test_bit(bitmap, i) as u32;
            i += 1;
        }
    }
    count
}

/// 统计 `[start, end)` 中空闲的位数
pub fn count_zeros(bitmap: &[u8], start: u32, end: u32) -> u32 {
    let end = end.min((bitmap.len() * 8) as u32);
    if start >= end {
        return 0;
    }
    (end - start) - count_ones(bitmap, start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_operations() {
        let mut bitmap = [0u8; 4];

        assert!(!test_bit(&bitmap, 0));
        set_bit(&mut bitmap, 0).unwrap();
        set_bit(&mut bitmap, 9).unwrap();
        assert_eq!(bitmap[..2], [0x01, 0x02]);

        clear_bit(&mut bitmap, 0).unwrap();
        assert!(!test_bit(&bitmap, 0));
        assert!(test_bit(&bitmap, 9));
    }

    #[test]
    fn test_find_first_zero_skips_full_bytes() {
        let mut bitmap = [0xFFu8; 4];
        assert_eq!(find_first_zero(&bitmap, 0, 32), None);

        clear_bit(&mut bitmap, 21).unwrap();
        assert_eq!(find_first_zero(&bitmap, 0, 32), Some(21));
        assert_eq!(find_first_zero(&bitmap, 0, 21), None);

        clear_bit(&mut bitmap, 3).unwrap();
        assert_eq!(find_first_zero(&bitmap, 0, 32), Some(3));
        assert_eq!(find_first_zero(&bitmap, 4, 32), Some(21));
    }

    #[test]
    fn test_count() {
        let mut bitmap = [0u8; 4];
        assert_eq!(count_zeros(&bitmap, 0, 32), 32);

        for i in [0, 5, 10, 31] {
            set_bit(&mut bitmap, i).unwrap();
        }
        assert_eq!(count_ones(&bitmap, 0, 32), 4);
        assert_eq!(count_ones(&bitmap, 1, 11), 2);
        assert_eq!(count_zeros(&bitmap, 0, 32), 28);
        assert_eq!(count_zeros(&bitmap, 40, 50), 0);
    }

    #[test]
    fn test_out_of_range() {
        let mut bitmap = [0u8; 4];
        assert!(set_bit(&mut bitmap, 32).is_err());
        assert!(clear_bit(&mut bitmap, 32).is_err());
        assert!(!test_bit(&bitmap, 32));
        assert_eq!(find_first_zero(&bitmap, 32, 100), None);
    }
}
