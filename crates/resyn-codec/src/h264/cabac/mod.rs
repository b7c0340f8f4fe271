//! CABAC 语法层.
//!
//! 本模块只负责决定请求哪些二值判决 (bin) 以及如何解释返回值;
//! 算术编码引擎 (上下文状态、重归一化) 由调用方通过 [`CabacDecoder`] /
//! [`CabacEncoder`] 提供. [`trace`] 提供按 bin 记录/回放的引擎实现.

mod block;
mod ctx;
pub mod syntax;
pub mod trace;

pub use block::{CabacBlock, coded_block_flag_ctx_inc, reads_coded_block_flag};
pub use trace::{Bin, BinReplay, BinTrace};

use resyn_core::{ResynError, ResynResult};

/// CABAC 解码引擎
pub trait CabacDecoder {
    /// 上下文自适应判决
    fn decode_decision(&mut self, ctx_idx: usize) -> ResynResult<u32>;

    /// 旁路判决
    fn decode_bypass(&mut self) -> ResynResult<u32>;

    /// 终止判决 (ctxIdx 276)
    fn decode_terminate(&mut self) -> ResynResult<u32>;

    /// 终止判决为 1 之后直接读取原始比特 (I_PCM)
    fn read_raw_bits(&mut self, n: u32) -> ResynResult<u32>;

    /// 原始比特位置是否字节对齐
    fn is_raw_aligned(&self) -> bool;

    /// I_PCM 样本之后重新初始化引擎
    fn restart(&mut self) -> ResynResult<()>;
}

/// CABAC 编码引擎
pub trait CabacEncoder {
    fn encode_decision(&mut self, ctx_idx: usize, bin: u32) -> ResynResult<()>;

    fn encode_bypass(&mut self, bin: u32) -> ResynResult<()>;

    fn encode_terminate(&mut self, bin: u32) -> ResynResult<()>;

    /// 终止判决为 1 之后直接写出原始比特 (I_PCM)
    fn write_raw_bits(&mut self, value: u32, n: u32) -> ResynResult<()>;

    fn is_raw_aligned(&self) -> bool;

    fn restart(&mut self) -> ResynResult<()>;
}

/// k 阶 Exp-Golomb 旁路码前缀上限
const MAX_EGK_PREFIX: u32 = 16;

/// 解码 k 阶 Exp-Golomb 旁路码 (UEGk 后缀)
pub(crate) fn decode_exp_golomb_bypass<D: CabacDecoder + ?Sized>(engine: &mut D, k: u32) -> ResynResult<u32> {
    let mut k = k;
    let mut value = 0u32;
    let mut ones = 0u32;
    while engine.decode_bypass()? == 1 {
        value += 1 << k;
        k += 1;
        ones += 1;
        if ones > MAX_EGK_PREFIX {
            return Err(ResynError::UnboundedLoop(format!(
                "Exp-Golomb 旁路前缀超过 {}",
                MAX_EGK_PREFIX
            )));
        }
    }
    while k > 0 {
        k -= 1;
        value += engine.decode_bypass()? << k;
    }
    Ok(value)
}

/// 编码 k 阶 Exp-Golomb 旁路码
pub(crate) fn encode_exp_golomb_bypass<E: CabacEncoder + ?Sized>(
    engine: &mut E,
    value: u32,
    k: u32,
) -> ResynResult<()> {
    let mut k = k;
    let mut value = value;
    let mut ones = 0u32;
    while value >= (1 << k) {
        engine.encode_bypass(1)?;
        value -= 1 << k;
        k += 1;
        ones += 1;
        if ones > MAX_EGK_PREFIX {
            return Err(ResynError::invalid(format!("Exp-Golomb 旁路值过大: k={}", k)));
        }
    }
    engine.encode_bypass(0)?;
    while k > 0 {
        k -= 1;
        engine.encode_bypass((value >> k) & 1)?;
    }
    Ok(())
}
