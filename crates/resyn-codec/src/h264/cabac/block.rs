//! CABAC 残差块 (residual_block_cabac) 解码与编码.

use resyn_core::{ResynError, ResynResult};

use super::ctx::ResidualCtx;
use super::{CabacDecoder, CabacEncoder, decode_exp_golomb_bypass, encode_exp_golomb_bypass};
use crate::h264::block::{BlockAddress, BlockLocation, CoeffArray, chroma4x4_index, chroma4x4_xy, luma4x4_index, luma4x4_xy};
use crate::h264::context::{ChromaArrayType, SliceContext};
use crate::h264::neighbor::{BlockNeighbor, NeighborKind, NeighborMacroblock, NeighborSource, above_block, left_block};

/// coeff_abs_level_minus1 前缀的 cMax
const ABS_LEVEL_PREFIX_MAX: u32 = 14;

/// coded_block_flag 是否出现在码流中
///
/// 64 系数块仅在 4:4:4 时携带该标志, 其余情况推断为 1.
/// 条件与 H.264 7.3.5.3.3 residual_block_cabac 一致:
/// `if (maxNumCoeff != 64 || ChromaArrayType == 3) coded_block_flag`.
pub fn reads_coded_block_flag(max_coeff: usize, chroma_array_type: ChromaArrayType) -> bool {
    max_coeff != 64 || chroma_array_type == ChromaArrayType::Yuv444
}

/// 一个 CABAC 残差块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabacBlock {
    pub address: BlockAddress,
    /// coded_block_flag (未出现时为推断值)
    pub coded_block_flag: bool,
    /// significant_coeff_flag, 以块内位置为下标
    pub significant: [bool; 64],
    /// 最后一个非零系数的位置 (未编码时为 None)
    pub last_position: Option<usize>,
    pub coeffs: CoeffArray,
}

impl CabacBlock {
    fn empty(address: BlockAddress) -> Self {
        Self {
            address,
            coded_block_flag: false,
            significant: [false; 64],
            last_position: None,
            coeffs: CoeffArray::zeroed(address.max_coeff()),
        }
    }

    /// 解码一个块
    ///
    /// `cbf_ctx_inc` 为 coded_block_flag 的 ctxIdxInc; 为 None 时不读取该标志 (推断为 1).
    pub fn decode<D: CabacDecoder + ?Sized>(
        engine: &mut D,
        address: BlockAddress,
        cbf_ctx_inc: Option<usize>,
        field: bool,
        chroma_array_type: ChromaArrayType,
    ) -> ResynResult<Self> {
        let ctx = ResidualCtx::new(address.category(), field, chroma_array_type.num_c8x8());
        let mut block = Self::empty(address);

        block.coded_block_flag = match cbf_ctx_inc {
            Some(inc) => engine.decode_decision(ctx.coded_block_flag + inc)? == 1,
            None => true,
        };
        if !block.coded_block_flag {
            log::trace!("CABAC 块 {:?}: coded_block_flag=0", address.category());
            return Ok(block);
        }

        // 显著性图
        let start = address.start();
        let mut num_coeff = address.end() + 1;
        let mut i = start;
        while i + 1 < num_coeff {
            if engine.decode_decision(ctx.significant_ctx(i))? == 1 {
                block.significant[i] = true;
                if engine.decode_decision(ctx.last_ctx(i))? == 1 {
                    num_coeff = i + 1;
                }
            }
            i += 1;
        }
        let last = num_coeff - 1;
        block.significant[last] = true;
        block.last_position = Some(last);

        // 电平: 从最后一个非零系数反向
        let mut num_eq1 = 0usize;
        let mut num_gt1 = 0usize;
        for pos in (start..=last).rev() {
            if !block.significant[pos] {
                continue;
            }
            let abs_minus1 = decode_abs_level_minus1(engine, &ctx, num_eq1, num_gt1)?;
            let sign = engine.decode_bypass()?;
            let magnitude = i32::try_from(abs_minus1 as u64 + 1)
                .map_err(|_| ResynError::malformed("coeff_abs_level_minus1 超出范围"))?;
            block.coeffs[pos] = if sign == 1 { -magnitude } else { magnitude };
            if abs_minus1 == 0 {
                num_eq1 += 1;
            } else {
                num_gt1 += 1;
            }
        }
        log::trace!(
            "CABAC 块 {:?}: 非零系数 {}, 末位置 {}",
            address.category(),
            block.coeffs.count_nonzero(),
            last
        );
        Ok(block)
    }

    /// 由系数数组构造
    pub fn from_coefficients(address: BlockAddress, coeffs: &[i32]) -> ResynResult<Self> {
        if coeffs.len() != address.max_coeff() {
            return Err(ResynError::invalid(format!(
                "系数个数与块容量不符: {} != {}",
                coeffs.len(),
                address.max_coeff()
            )));
        }
        let mut block = Self::empty(address);
        for (pos, &c) in coeffs.iter().enumerate() {
            if c == 0 {
                continue;
            }
            if pos < address.start() || pos > address.end() {
                return Err(ResynError::invalid("扫描区间外存在非零系数"));
            }
            block.significant[pos] = true;
            block.last_position = Some(pos);
        }
        block.coded_block_flag = block.last_position.is_some();
        block.coeffs = CoeffArray::from_slice(coeffs)?;
        Ok(block)
    }

    /// 编码一个块, bin 序列与 [`CabacBlock::decode`] 的请求顺序一致
    pub fn encode<E: CabacEncoder + ?Sized>(
        &self,
        engine: &mut E,
        cbf_ctx_inc: Option<usize>,
        field: bool,
        chroma_array_type: ChromaArrayType,
    ) -> ResynResult<()> {
        let ctx = ResidualCtx::new(self.address.category(), field, chroma_array_type.num_c8x8());
        let coded = !self.coeffs.is_all_zero();
        match cbf_ctx_inc {
            Some(inc) => engine.encode_decision(ctx.coded_block_flag + inc, coded as u32)?,
            None if !coded => {
                return Err(ResynError::UnsupportedPath(format!(
                    "coded_block_flag 推断为 1 的块 {:?} 不能全零",
                    self.address.category()
                )));
            }
            None => {}
        }
        if !coded {
            return Ok(());
        }

        let start = self.address.start();
        let end = self.address.end();
        let coeffs = self.coeffs.as_slice();
        let last = (start..=end).rev().find(|&p| coeffs[p] != 0).unwrap_or(start);
        for i in start..last.min(end) {
            let sig = coeffs[i] != 0;
            engine.encode_decision(ctx.significant_ctx(i), sig as u32)?;
            if sig {
                engine.encode_decision(ctx.last_ctx(i), 0)?;
            }
        }
        if last < end {
            engine.encode_decision(ctx.significant_ctx(last), 1)?;
            engine.encode_decision(ctx.last_ctx(last), 1)?;
        }

        let mut num_eq1 = 0usize;
        let mut num_gt1 = 0usize;
        for pos in (start..=last).rev() {
            let c = coeffs[pos];
            if c == 0 {
                continue;
            }
            let abs_minus1 = c.unsigned_abs() - 1;
            encode_abs_level_minus1(engine, &ctx, abs_minus1, num_eq1, num_gt1)?;
            engine.encode_bypass((c < 0) as u32)?;
            if abs_minus1 == 0 {
                num_eq1 += 1;
            } else {
                num_gt1 += 1;
            }
        }
        Ok(())
    }

    pub fn coefficients(&self) -> &[i32] {
        self.coeffs.as_slice()
    }
}

/// coeff_abs_level_minus1: TU 前缀 (cMax 14) + EG0 旁路后缀
fn decode_abs_level_minus1<D: CabacDecoder + ?Sized>(
    engine: &mut D,
    ctx: &ResidualCtx,
    num_eq1: usize,
    num_gt1: usize,
) -> ResynResult<u32> {
    let mut prefix = 0u32;
    while prefix < ABS_LEVEL_PREFIX_MAX {
        let bin = engine.decode_decision(ctx.abs_level_ctx(prefix as usize, num_eq1, num_gt1))?;
        if bin == 0 {
            return Ok(prefix);
        }
        prefix += 1;
    }
    let suffix = decode_exp_golomb_bypass(engine, 0)?;
    Ok(prefix + suffix)
}

fn encode_abs_level_minus1<E: CabacEncoder + ?Sized>(
    engine: &mut E,
    ctx: &ResidualCtx,
    value: u32,
    num_eq1: usize,
    num_gt1: usize,
) -> ResynResult<()> {
    let prefix = value.min(ABS_LEVEL_PREFIX_MAX);
    for bin_idx in 0..prefix {
        engine.encode_decision(ctx.abs_level_ctx(bin_idx as usize, num_eq1, num_gt1), 1)?;
    }
    if prefix < ABS_LEVEL_PREFIX_MAX {
        engine.encode_decision(ctx.abs_level_ctx(prefix as usize, num_eq1, num_gt1), 0)?;
        return Ok(());
    }
    encode_exp_golomb_bypass(engine, value - ABS_LEVEL_PREFIX_MAX, 0)
}

// ============================================================
// coded_block_flag 的 ctxIdxInc
// ============================================================

/// coded_block_flag 的 ctxIdxInc (`condTermFlagA + 2 * condTermFlagB`)
///
/// `current` 为当前宏块摘要: 种类、cbp、变换尺寸与已解码块的 coded_block_flag.
pub fn coded_block_flag_ctx_inc(
    location: BlockLocation,
    current: &NeighborMacroblock,
    neighbors: &dyn NeighborSource,
    slice: &SliceContext,
) -> usize {
    let (a, b) = match location {
        BlockLocation::PlaneDc(_) | BlockLocation::ChromaDc(_) => (
            neighbors.left().map(outside),
            neighbors.above().map(outside),
        ),
        BlockLocation::Plane4x4(_, idx) => {
            let (x, y) = luma4x4_xy(idx);
            (
                left_block(current, neighbors, x, y, 4),
                above_block(current, neighbors, x, y, 4),
            )
        }
        BlockLocation::Plane8x8(_, idx) => {
            let (x, y) = (idx % 2, idx / 2);
            (
                left_block(current, neighbors, x, y, 2),
                above_block(current, neighbors, x, y, 2),
            )
        }
        BlockLocation::ChromaAc(_, idx) => {
            let (x, y) = chroma4x4_xy(idx);
            let rows = slice.chroma_array_type.mb_height_c() / 4;
            (
                left_block(current, neighbors, x, y, 2),
                above_block(current, neighbors, x, y, rows),
            )
        }
    };
    cond_term(a, location, current, slice) + 2 * cond_term(b, location, current, slice)
}

fn outside(mb: &NeighborMacroblock) -> BlockNeighbor<'_> {
    BlockNeighbor {
        mb,
        x: 0,
        y: 0,
        in_current: false,
    }
}

fn cond_term(
    neighbor: Option<BlockNeighbor<'_>>,
    location: BlockLocation,
    current: &NeighborMacroblock,
    slice: &SliceContext,
) -> usize {
    let Some(n) = neighbor else {
        return current.kind.is_intra() as usize;
    };
    if !n.in_current
        && current.kind.is_intra()
        && slice.constrained_intra_pred
        && !n.mb.kind.is_intra()
        && slice.data_partitioned
    {
        return 0;
    }
    if n.mb.kind.is_pcm() {
        return 1;
    }
    trans_block_flag(&n, location).map_or(0, |flag| flag as usize)
}

/// 邻居变换块的 coded_block_flag; 变换块不可用时为 None
fn trans_block_flag(n: &BlockNeighbor<'_>, location: BlockLocation) -> Option<bool> {
    let mb = n.mb;
    if mb.kind.is_skip() {
        return None;
    }
    match location {
        BlockLocation::PlaneDc(c) => (mb.kind == NeighborKind::Intra16x16).then(|| mb.blocks.coded_dc(c)),
        BlockLocation::Plane4x4(c, _) => {
            let blk8 = (n.y / 2) * 2 + n.x / 2;
            if !mb.has_luma_residual(blk8) {
                return None;
            }
            if mb.transform_8x8 {
                Some(mb.blocks.coded_8x8(c, blk8))
            } else {
                Some(mb.blocks.coded_4x4(c, luma4x4_index(n.x, n.y)))
            }
        }
        BlockLocation::Plane8x8(c, _) => {
            let blk8 = n.y * 2 + n.x;
            (mb.has_luma_residual(blk8) && mb.transform_8x8).then(|| mb.blocks.coded_8x8(c, blk8))
        }
        BlockLocation::ChromaDc(c) => (mb.cbp_chroma != 0).then(|| mb.blocks.coded_dc(c)),
        BlockLocation::ChromaAc(c, _) => {
            (mb.cbp_chroma == 2).then(|| mb.blocks.coded_4x4(c, chroma4x4_index(n.x, n.y)))
        }
    }
}
