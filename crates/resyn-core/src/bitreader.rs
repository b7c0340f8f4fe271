//! 比特流读取器.
//!
//! 语法层的比特游标: 按大端位序 (MSB first) 从 RBSP 字节缓冲区中读取单个位与定长字段,
//! 并支持保存/恢复游标位置, 供延迟解析 (如缩放矩阵) 重新定位使用.

use crate::{ResynError, ResynResult};

/// 游标位置快照
///
/// 以绝对比特偏移表示, 可在同一缓冲区上任意次恢复.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CursorState {
    bit_offset: usize,
}

impl CursorState {
    /// 由绝对比特偏移构造
    pub fn from_bit_offset(bit_offset: usize) -> Self {
        Self { bit_offset }
    }

    /// 绝对比特偏移
    pub fn bit_offset(&self) -> usize {
        self.bit_offset
    }
}

/// 比特流读取器
///
/// # 示例
/// ```
/// use resyn_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// let mark = br.state();
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// br.restore(mark).unwrap();
/// assert_eq!(br.read_bits(12).unwrap(), 0b0001_01010101);
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bits_read())
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 当前是否位于字节边界
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> ResynResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(ResynError::StreamExhausted);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 1 个位作为标志
    pub fn read_flag(&mut self) -> ResynResult<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> ResynResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(ResynError::invalid(format!("read_bits: n={} 超过 32 位", n)));
        }
        if (n as usize) > self.bits_left() {
            return Err(ResynError::StreamExhausted);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 窥视 N 个位 (不移动位置)
    ///
    /// 剩余位数不足 N 时, 不足部分以 0 补齐, 便于变长码表查找.
    pub fn peek_bits_padded(&self, n: u32) -> ResynResult<u32> {
        if n > 32 {
            return Err(ResynError::invalid(format!("peek_bits: n={} 超过 32 位", n)));
        }
        let available = self.bits_left().min(n as usize) as u32;
        let mut probe = self.clone();
        let head = probe.read_bits(available)?;
        Ok(if available == n {
            head
        } else {
            head << (n - available)
        })
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> ResynResult<()> {
        if n > self.bits_left() {
            return Err(ResynError::StreamExhausted);
        }

        let total_bits = self.bit_pos as usize + n;
        self.byte_pos += total_bits / 8;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 对齐到下一个字节边界
    ///
    /// 如果当前已在字节边界, 则不做任何事.
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// 保存当前游标位置
    pub fn state(&self) -> CursorState {
        CursorState::from_bit_offset(self.bits_read())
    }

    /// 恢复到先前保存的游标位置
    pub fn restore(&mut self, state: CursorState) -> ResynResult<()> {
        let offset = state.bit_offset();
        if offset > self.data.len() * 8 {
            return Err(ResynError::invalid(format!(
                "游标位置越界: offset={}, 总位数={}",
                offset,
                self.data.len() * 8
            )));
        }
        self.byte_pos = offset / 8;
        self.bit_pos = (offset % 8) as u8;
        Ok(())
    }

    /// 是否仍有 RBSP 数据 (停止位之前还有有效位)
    pub fn more_rbsp_data(&self) -> bool {
        let Some(last) = self.data.iter().rposition(|&b| b != 0) else {
            return false;
        };
        // 停止位是最后一个非零字节中最低的 1
        let stop_bit = last * 8 + 7 - self.data[last].trailing_zeros() as usize;
        self.bits_read() < stop_bit
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
