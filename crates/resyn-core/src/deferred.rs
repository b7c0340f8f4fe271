//! 延迟解析描述符.
//!
//! 长度依赖数据的语法结构 (如缩放矩阵) 在首次扫描时只记录 `(位置, 长度)`,
//! 需要时再由 [`BitSpan::resolve`] 重新定位并解析, 解析结束后恢复调用方的游标.
//! 描述符本身不缓存任何解析结果.

use crate::bitreader::{BitReader, CursorState};
use crate::{ResynError, ResynResult};

/// 比特流中的一段区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitSpan {
    start: CursorState,
    bit_len: usize,
}

impl BitSpan {
    /// 由起始位置和长度构造
    pub fn new(start: CursorState, bit_len: usize) -> Self {
        Self { start, bit_len }
    }

    /// 以 `parse` 消费一段数据, 记录其起止位置
    ///
    /// 返回的描述符覆盖 `parse` 实际读取的全部比特; 游标停在区间末尾.
    pub fn capture<T>(
        reader: &mut BitReader<'_>,
        parse: impl FnOnce(&mut BitReader<'_>) -> ResynResult<T>,
    ) -> ResynResult<(Self, T)> {
        let start = reader.state();
        let value = parse(reader)?;
        let bit_len = reader.bits_read() - start.bit_offset();
        Ok((Self { start, bit_len }, value))
    }

    /// 区间起点
    pub fn start(&self) -> CursorState {
        self.start
    }

    /// 区间长度 (比特)
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// 区间终点
    pub fn end(&self) -> CursorState {
        CursorState::from_bit_offset(self.start.bit_offset() + self.bit_len)
    }

    /// 重新定位到区间起点并解析, 完成后恢复调用方游标
    ///
    /// 解析越过区间末尾视为语法错误; 无论成功与否游标都会被恢复.
    pub fn resolve<T>(
        &self,
        reader: &mut BitReader<'_>,
        parse: impl FnOnce(&mut BitReader<'_>) -> ResynResult<T>,
    ) -> ResynResult<T> {
        let saved = reader.state();
        reader.restore(self.start)?;
        let result = parse(reader);
        let consumed = reader.bits_read() - self.start.bit_offset();
        reader.restore(saved)?;

        let value = result?;
        if consumed > self.bit_len {
            log::warn!(
                "延迟解析越界: start={}, len={}, consumed={}",
                self.start.bit_offset(),
                self.bit_len,
                consumed
            );
            return Err(ResynError::malformed(format!(
                "延迟解析越过区间末尾: len={}, consumed={}",
                self.bit_len, consumed
            )));
        }
        Ok(value)
    }
}
