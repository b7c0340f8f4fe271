//! 按 bin 记录与回放的 CABAC 引擎.
//!
//! [`BinTrace`] 作为编码引擎记录每个判决的种类、上下文与取值;
//! [`BinReplay`] 作为解码引擎按记录顺序返回取值, 并校验请求的判决种类与上下文一致.
//! 两者配合即可在没有算术编码器的情况下验证语法层的双向一致性.

use resyn_core::{ResynError, ResynResult};

use super::{CabacDecoder, CabacEncoder};

/// 一个二值判决
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bin {
    Decision { ctx_idx: u16, value: u8 },
    Bypass(u8),
    Terminate(u8),
    /// I_PCM 原始比特
    Raw { value: u32, bits: u8 },
    /// 引擎重新初始化
    Restart,
}

/// 记录型编码引擎
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinTrace {
    bins: Vec<Bin>,
    raw_bits: usize,
}

impl BinTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// 上下文判决的个数
    pub fn decision_count(&self) -> usize {
        self.bins
            .iter()
            .filter(|b| matches!(b, Bin::Decision { .. }))
            .count()
    }

    /// 按记录创建回放引擎
    pub fn replay(&self) -> BinReplay<'_> {
        BinReplay::new(&self.bins)
    }

    fn push(&mut self, bin: Bin) {
        self.bins.push(bin);
    }
}

fn check_bin(bin: u32) -> ResynResult<u8> {
    if bin > 1 {
        return Err(ResynError::invalid(format!("bin 取值必须为 0 或 1: {}", bin)));
    }
    Ok(bin as u8)
}

impl CabacEncoder for BinTrace {
    fn encode_decision(&mut self, ctx_idx: usize, bin: u32) -> ResynResult<()> {
        let ctx_idx = u16::try_from(ctx_idx)
            .map_err(|_| ResynError::invalid(format!("ctxIdx 超出范围: {}", ctx_idx)))?;
        let value = check_bin(bin)?;
        self.push(Bin::Decision { ctx_idx, value });
        Ok(())
    }

    fn encode_bypass(&mut self, bin: u32) -> ResynResult<()> {
        let value = check_bin(bin)?;
        self.push(Bin::Bypass(value));
        Ok(())
    }

    fn encode_terminate(&mut self, bin: u32) -> ResynResult<()> {
        let value = check_bin(bin)?;
        self.push(Bin::Terminate(value));
        Ok(())
    }

    fn write_raw_bits(&mut self, value: u32, n: u32) -> ResynResult<()> {
        if n > 32 {
            return Err(ResynError::invalid(format!("原始比特宽度超过 32: {}", n)));
        }
        self.raw_bits += n as usize;
        self.push(Bin::Raw { value, bits: n as u8 });
        Ok(())
    }

    fn is_raw_aligned(&self) -> bool {
        self.raw_bits % 8 == 0
    }

    fn restart(&mut self) -> ResynResult<()> {
        self.push(Bin::Restart);
        Ok(())
    }
}

/// 回放型解码引擎
#[derive(Debug, Clone)]
pub struct BinReplay<'a> {
    bins: &'a [Bin],
    pos: usize,
    raw_bits: usize,
}

impl<'a> BinReplay<'a> {
    pub fn new(bins: &'a [Bin]) -> Self {
        Self {
            bins,
            pos: 0,
            raw_bits: 0,
        }
    }

    /// 已消费的 bin 个数
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 是否已消费全部记录
    pub fn is_finished(&self) -> bool {
        self.pos == self.bins.len()
    }

    fn next(&mut self) -> ResynResult<Bin> {
        let bin = *self.bins.get(self.pos).ok_or(ResynError::StreamExhausted)?;
        self.pos += 1;
        Ok(bin)
    }

    fn mismatch(&self, expected: &str, got: Bin) -> ResynError {
        ResynError::malformed(format!(
            "bin 序列不一致: 位置 {}, 请求 {}, 记录 {:?}",
            self.pos - 1,
            expected,
            got
        ))
    }
}

impl CabacDecoder for BinReplay<'_> {
    fn decode_decision(&mut self, ctx_idx: usize) -> ResynResult<u32> {
        match self.next()? {
            Bin::Decision { ctx_idx: c, value } if c as usize == ctx_idx => Ok(value as u32),
            other => Err(self.mismatch(&format!("Decision(ctx={})", ctx_idx), other)),
        }
    }

    fn decode_bypass(&mut self) -> ResynResult<u32> {
        match self.next()? {
            Bin::Bypass(value) => Ok(value as u32),
            other => Err(self.mismatch("Bypass", other)),
        }
    }

    fn decode_terminate(&mut self) -> ResynResult<u32> {
        match self.next()? {
            Bin::Terminate(value) => Ok(value as u32),
            other => Err(self.mismatch("Terminate", other)),
        }
    }

    fn read_raw_bits(&mut self, n: u32) -> ResynResult<u32> {
        match self.next()? {
            Bin::Raw { value, bits } if bits as u32 == n => {
                self.raw_bits += n as usize;
                Ok(value)
            }
            other => Err(self.mismatch(&format!("Raw({})", n), other)),
        }
    }

    fn is_raw_aligned(&self) -> bool {
        self.raw_bits % 8 == 0
    }

    fn restart(&mut self) -> ResynResult<()> {
        match self.next()? {
            Bin::Restart => Ok(()),
            other => Err(self.mismatch("Restart", other)),
        }
    }
}
