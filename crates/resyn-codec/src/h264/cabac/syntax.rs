//! CABAC 宏块层语法元素的二值化与上下文选择.
//!
//! 每个元素成对提供 `decode_*` / `encode_*`, 两者请求的 bin 序列完全一致.

use resyn_core::{ResynError, ResynResult};

use super::{CabacDecoder, CabacEncoder, decode_exp_golomb_bypass, encode_exp_golomb_bypass};
use crate::h264::block::{luma4x4_index, luma4x4_xy};
use crate::h264::context::SliceType;
use crate::h264::mb_type::{MbType, SubMbType};
use crate::h264::neighbor::{BlockNeighbor, NeighborKind, NeighborMacroblock, above_block, left_block};
use crate::h264::syntax::SyntaxEnv;

const CTX_MB_TYPE_SI: usize = 0;
const CTX_MB_TYPE_I: usize = 3;
const CTX_MB_TYPE_P_PREFIX: usize = 14;
const CTX_MB_TYPE_P_SUFFIX: usize = 17;
const CTX_SUB_MB_TYPE_P: usize = 21;
const CTX_MB_TYPE_B_PREFIX: usize = 27;
const CTX_MB_TYPE_B_SUFFIX: usize = 32;
const CTX_SUB_MB_TYPE_B: usize = 36;
const CTX_MVD_X: usize = 40;
const CTX_MVD_Y: usize = 47;
const CTX_REF_IDX: usize = 54;
const CTX_MB_QP_DELTA: usize = 60;
const CTX_INTRA_CHROMA_PRED_MODE: usize = 64;
const CTX_PREV_INTRA_PRED_FLAG: usize = 68;
const CTX_REM_INTRA_PRED_MODE: usize = 69;
const CTX_CBP_LUMA: usize = 73;
const CTX_CBP_CHROMA: usize = 77;
const CTX_TRANSFORM_8X8: usize = 399;

/// mb_qp_delta 一元码 bin 数上限
const MAX_QP_DELTA_BINS: u32 = 128;
/// ref_idx 一元码 bin 数上限
const MAX_REF_IDX_BINS: u32 = 64;
/// mvd 前缀 uCoff
const MVD_PREFIX_MAX: u32 = 9;

fn cond(n: Option<&NeighborMacroblock>, f: impl FnOnce(&NeighborMacroblock) -> bool) -> usize {
    n.is_some_and(f) as usize
}

// ============================================================
// mb_type
// ============================================================

/// I 宏块类型的上下文布局
#[derive(Debug, Clone, Copy)]
struct IntraCtx {
    bin0: usize,
    luma: usize,
    chroma0: usize,
    chroma1: usize,
    pred0: usize,
    pred1: usize,
}

impl IntraCtx {
    /// I 片 (前缀与后缀共用 ctxIdxOffset 3)
    fn i_slice(env: &SyntaxEnv<'_>) -> Self {
        let is_i_nxn_free = |mb: &NeighborMacroblock| mb.kind != NeighborKind::IntraNxN;
        let inc = cond(env.neighbors.left(), is_i_nxn_free) + cond(env.neighbors.above(), is_i_nxn_free);
        Self {
            bin0: CTX_MB_TYPE_I + inc,
            luma: CTX_MB_TYPE_I + 3,
            chroma0: CTX_MB_TYPE_I + 4,
            chroma1: CTX_MB_TYPE_I + 5,
            pred0: CTX_MB_TYPE_I + 6,
            pred1: CTX_MB_TYPE_I + 7,
        }
    }

    /// P/B 片帧内后缀
    fn suffix(base: usize) -> Self {
        Self {
            bin0: base,
            luma: base + 1,
            chroma0: base + 2,
            chroma1: base + 2,
            pred0: base + 3,
            pred1: base + 3,
        }
    }
}

/// 解码 I 片语义的 mb_type (0..=25)
fn decode_intra_mb_type<D: CabacDecoder + ?Sized>(engine: &mut D, ctx: IntraCtx) -> ResynResult<u32> {
    if engine.decode_decision(ctx.bin0)? == 0 {
        return Ok(0);
    }
    if engine.decode_terminate()? == 1 {
        return Ok(25);
    }
    let luma = engine.decode_decision(ctx.luma)?;
    let chroma = if engine.decode_decision(ctx.chroma0)? == 1 {
        1 + engine.decode_decision(ctx.chroma1)?
    } else {
        0
    };
    let pred = (engine.decode_decision(ctx.pred0)? << 1) | engine.decode_decision(ctx.pred1)?;
    Ok(1 + pred + 4 * chroma + 12 * luma)
}

fn encode_intra_mb_type<E: CabacEncoder + ?Sized>(engine: &mut E, ctx: IntraCtx, mb_type: MbType) -> ResynResult<()> {
    match mb_type {
        MbType::INxN => engine.encode_decision(ctx.bin0, 0),
        MbType::IPcm => {
            engine.encode_decision(ctx.bin0, 1)?;
            engine.encode_terminate(1)
        }
        MbType::I16x16 {
            pred_mode,
            cbp_chroma,
            cbp_luma,
        } => {
            engine.encode_decision(ctx.bin0, 1)?;
            engine.encode_terminate(0)?;
            engine.encode_decision(ctx.luma, u32::from(cbp_luma != 0))?;
            engine.encode_decision(ctx.chroma0, u32::from(cbp_chroma != 0))?;
            if cbp_chroma != 0 {
                engine.encode_decision(ctx.chroma1, u32::from(cbp_chroma == 2))?;
            }
            engine.encode_decision(ctx.pred0, u32::from(pred_mode >> 1) & 1)?;
            engine.encode_decision(ctx.pred1, u32::from(pred_mode) & 1)
        }
        other => Err(ResynError::invalid(format!("{:?} 不是 I 宏块类型", other))),
    }
}

/// 解码 mb_type
pub fn decode_mb_type<D: CabacDecoder + ?Sized>(engine: &mut D, env: &SyntaxEnv<'_>) -> ResynResult<MbType> {
    let slice_type = env.slice.slice_type;
    let raw = match slice_type {
        SliceType::I => decode_intra_mb_type(engine, IntraCtx::i_slice(env))?,
        SliceType::Si => {
            let not_si = |mb: &NeighborMacroblock| mb.kind != NeighborKind::Si;
            let inc = cond(env.neighbors.left(), not_si) + cond(env.neighbors.above(), not_si);
            if engine.decode_decision(CTX_MB_TYPE_SI + inc)? == 0 {
                0
            } else {
                1 + decode_intra_mb_type(engine, IntraCtx::i_slice(env))?
            }
        }
        SliceType::P | SliceType::Sp => {
            if engine.decode_decision(CTX_MB_TYPE_P_PREFIX)? == 1 {
                5 + decode_intra_mb_type(engine, IntraCtx::suffix(CTX_MB_TYPE_P_SUFFIX))?
            } else if engine.decode_decision(CTX_MB_TYPE_P_PREFIX + 1)? == 0 {
                3 * engine.decode_decision(CTX_MB_TYPE_P_PREFIX + 2)?
            } else {
                2 - engine.decode_decision(CTX_MB_TYPE_P_PREFIX + 3)?
            }
        }
        SliceType::B => decode_b_mb_type(engine, env)?,
    };
    MbType::from_raw(slice_type, raw)
}

fn b_prefix_inc(env: &SyntaxEnv<'_>) -> usize {
    let counts = |mb: &NeighborMacroblock| !mb.kind.is_skip() && mb.kind != NeighborKind::Direct16x16;
    cond(env.neighbors.left(), counts) + cond(env.neighbors.above(), counts)
}

fn decode_b_mb_type<D: CabacDecoder + ?Sized>(engine: &mut D, env: &SyntaxEnv<'_>) -> ResynResult<u32> {
    let base = CTX_MB_TYPE_B_PREFIX;
    if engine.decode_decision(base + b_prefix_inc(env))? == 0 {
        return Ok(0);
    }
    if engine.decode_decision(base + 3)? == 0 {
        return Ok(1 + engine.decode_decision(base + 5)?);
    }
    let mut bits = engine.decode_decision(base + 4)? << 3;
    bits |= engine.decode_decision(base + 5)? << 2;
    bits |= engine.decode_decision(base + 5)? << 1;
    bits |= engine.decode_decision(base + 5)?;
    Ok(match bits {
        0..=7 => bits + 3,
        13 => 23 + decode_intra_mb_type(engine, IntraCtx::suffix(CTX_MB_TYPE_B_SUFFIX))?,
        14 => 11,
        15 => 22,
        _ => ((bits << 1) | engine.decode_decision(base + 5)?) - 4,
    })
}

/// 编码 mb_type
pub fn encode_mb_type<E: CabacEncoder + ?Sized>(
    engine: &mut E,
    env: &SyntaxEnv<'_>,
    mb_type: MbType,
) -> ResynResult<()> {
    let slice_type = env.slice.slice_type;
    match slice_type {
        SliceType::I => encode_intra_mb_type(engine, IntraCtx::i_slice(env), mb_type),
        SliceType::Si => {
            let not_si = |mb: &NeighborMacroblock| mb.kind != NeighborKind::Si;
            let inc = cond(env.neighbors.left(), not_si) + cond(env.neighbors.above(), not_si);
            if mb_type == MbType::Si {
                return engine.encode_decision(CTX_MB_TYPE_SI + inc, 0);
            }
            engine.encode_decision(CTX_MB_TYPE_SI + inc, 1)?;
            encode_intra_mb_type(engine, IntraCtx::i_slice(env), mb_type)
        }
        SliceType::P | SliceType::Sp => {
            let p = CTX_MB_TYPE_P_PREFIX;
            let (b1, b2) = match mb_type {
                MbType::P16x16 => (0, 0),
                MbType::P8x8 => (0, 1),
                MbType::P16x8 => (1, 1),
                MbType::P8x16 => (1, 0),
                MbType::P8x8Ref0 => {
                    return Err(ResynError::UnsupportedPath("CABAC 不能表示 P_8x8ref0".into()));
                }
                intra => {
                    engine.encode_decision(p, 1)?;
                    return encode_intra_mb_type(engine, IntraCtx::suffix(CTX_MB_TYPE_P_SUFFIX), intra);
                }
            };
            engine.encode_decision(p, 0)?;
            engine.encode_decision(p + 1, b1)?;
            engine.encode_decision(if b1 == 0 { p + 2 } else { p + 3 }, b2)
        }
        SliceType::B => encode_b_mb_type(engine, env, mb_type),
    }
}

fn encode_b_mb_type<E: CabacEncoder + ?Sized>(engine: &mut E, env: &SyntaxEnv<'_>, mb_type: MbType) -> ResynResult<()> {
    let base = CTX_MB_TYPE_B_PREFIX;
    let bin0_ctx = base + b_prefix_inc(env);
    if mb_type == MbType::BDirect16x16 {
        return engine.encode_decision(bin0_ctx, 0);
    }
    engine.encode_decision(bin0_ctx, 1)?;
    let raw = if mb_type.is_intra() { None } else { Some(mb_type.raw(SliceType::B)?) };
    if let Some(raw @ 1..=2) = raw {
        engine.encode_decision(base + 3, 0)?;
        return engine.encode_decision(base + 5, raw - 1);
    }
    engine.encode_decision(base + 3, 1)?;
    let (bits, tail) = match raw {
        None => (13, None),
        Some(raw @ 3..=10) => (raw - 3, None),
        Some(11) => (14, None),
        Some(22) => (15, None),
        Some(raw) => {
            let v = raw + 4;
            (v >> 1, Some(v & 1))
        }
    };
    engine.encode_decision(base + 4, (bits >> 3) & 1)?;
    engine.encode_decision(base + 5, (bits >> 2) & 1)?;
    engine.encode_decision(base + 5, (bits >> 1) & 1)?;
    engine.encode_decision(base + 5, bits & 1)?;
    if let Some(bit) = tail {
        engine.encode_decision(base + 5, bit)?;
    }
    if raw.is_none() {
        encode_intra_mb_type(engine, IntraCtx::suffix(CTX_MB_TYPE_B_SUFFIX), mb_type)?;
    }
    Ok(())
}

// ============================================================
// sub_mb_type
// ============================================================

/// 解码 sub_mb_type
pub fn decode_sub_mb_type<D: CabacDecoder + ?Sized>(engine: &mut D, slice_type: SliceType) -> ResynResult<SubMbType> {
    let raw = if slice_type.is_b() {
        let c = CTX_SUB_MB_TYPE_B;
        if engine.decode_decision(c)? == 0 {
            0
        } else if engine.decode_decision(c + 1)? == 0 {
            1 + engine.decode_decision(c + 3)?
        } else {
            let mut ty = 3;
            if engine.decode_decision(c + 2)? == 1 {
                if engine.decode_decision(c + 3)? == 1 {
                    return SubMbType::from_raw(slice_type, 11 + engine.decode_decision(c + 3)?);
                }
                ty += 4;
            }
            ty += engine.decode_decision(c + 3)? << 1;
            ty + engine.decode_decision(c + 3)?
        }
    } else {
        let c = CTX_SUB_MB_TYPE_P;
        if engine.decode_decision(c)? == 1 {
            0
        } else if engine.decode_decision(c + 1)? == 0 {
            1
        } else if engine.decode_decision(c + 2)? == 1 {
            2
        } else {
            3
        }
    };
    SubMbType::from_raw(slice_type, raw)
}

/// 编码 sub_mb_type
pub fn encode_sub_mb_type<E: CabacEncoder + ?Sized>(engine: &mut E, sub_mb_type: SubMbType) -> ResynResult<()> {
    let raw = sub_mb_type.raw();
    if !sub_mb_type.is_b() {
        let c = CTX_SUB_MB_TYPE_P;
        return match raw {
            0 => engine.encode_decision(c, 1),
            1 => {
                engine.encode_decision(c, 0)?;
                engine.encode_decision(c + 1, 0)
            }
            _ => {
                engine.encode_decision(c, 0)?;
                engine.encode_decision(c + 1, 1)?;
                engine.encode_decision(c + 2, u32::from(raw == 2))
            }
        };
    }

    let c = CTX_SUB_MB_TYPE_B;
    if raw == 0 {
        return engine.encode_decision(c, 0);
    }
    engine.encode_decision(c, 1)?;
    if raw <= 2 {
        engine.encode_decision(c + 1, 0)?;
        return engine.encode_decision(c + 3, raw - 1);
    }
    engine.encode_decision(c + 1, 1)?;
    match raw {
        3..=6 => {
            engine.encode_decision(c + 2, 0)?;
            engine.encode_decision(c + 3, (raw - 3) >> 1)?;
            engine.encode_decision(c + 3, (raw - 3) & 1)
        }
        7..=10 => {
            engine.encode_decision(c + 2, 1)?;
            engine.encode_decision(c + 3, 0)?;
            engine.encode_decision(c + 3, (raw - 7) >> 1)?;
            engine.encode_decision(c + 3, (raw - 7) & 1)
        }
        _ => {
            engine.encode_decision(c + 2, 1)?;
            engine.encode_decision(c + 3, 1)?;
            engine.encode_decision(c + 3, raw - 11)
        }
    }
}

// ============================================================
// transform_size_8x8_flag / coded_block_pattern / mb_qp_delta
// ============================================================

fn transform_8x8_ctx(env: &SyntaxEnv<'_>) -> usize {
    let t = |mb: &NeighborMacroblock| mb.transform_8x8;
    CTX_TRANSFORM_8X8 + cond(env.neighbors.left(), t) + cond(env.neighbors.above(), t)
}

pub fn decode_transform_size_8x8_flag<D: CabacDecoder + ?Sized>(engine: &mut D, env: &SyntaxEnv<'_>) -> ResynResult<bool> {
    Ok(engine.decode_decision(transform_8x8_ctx(env))? == 1)
}

pub fn encode_transform_size_8x8_flag<E: CabacEncoder + ?Sized>(
    engine: &mut E,
    env: &SyntaxEnv<'_>,
    flag: bool,
) -> ResynResult<()> {
    engine.encode_decision(transform_8x8_ctx(env), u32::from(flag))
}

/// 亮度 cbp 第 `blk8` 个 bin 的 ctxIdx; `luma` 为本宏块已确定的低位
fn cbp_luma_ctx(env: &SyntaxEnv<'_>, blk8: usize, luma: u8) -> usize {
    let outside = |n: Option<&NeighborMacroblock>, bit: usize| match n {
        None => 0,
        Some(mb) if mb.kind.is_pcm() => 0,
        Some(mb) if !mb.kind.is_skip() && mb.cbp_luma & (1 << bit) != 0 => 0,
        Some(_) => 1,
    };
    let inside = |bit: usize| usize::from(luma & (1 << bit) == 0);
    let a = if blk8 % 2 == 1 {
        inside(blk8 - 1)
    } else {
        outside(env.neighbors.left(), blk8 + 1)
    };
    let b = if blk8 >= 2 {
        inside(blk8 - 2)
    } else {
        outside(env.neighbors.above(), blk8 + 2)
    };
    CTX_CBP_LUMA + a + 2 * b
}

/// 色度 cbp 第 `bin_idx` 个 bin 的 ctxIdx
fn cbp_chroma_ctx(env: &SyntaxEnv<'_>, bin_idx: usize) -> usize {
    let term = |mb: &NeighborMacroblock| {
        mb.kind.is_pcm() || (!mb.kind.is_skip() && if bin_idx == 0 { mb.cbp_chroma != 0 } else { mb.cbp_chroma == 2 })
    };
    let a = cond(env.neighbors.left(), term);
    let b = cond(env.neighbors.above(), term);
    CTX_CBP_CHROMA + a + 2 * b + 4 * bin_idx
}

/// 解码 coded_block_pattern, 返回 `(cbp_luma, cbp_chroma)`
pub fn decode_coded_block_pattern<D: CabacDecoder + ?Sized>(engine: &mut D, env: &SyntaxEnv<'_>) -> ResynResult<(u8, u8)> {
    let mut luma = 0u8;
    for blk8 in 0..4 {
        let bin = engine.decode_decision(cbp_luma_ctx(env, blk8, luma))?;
        luma |= (bin as u8) << blk8;
    }
    let mut chroma = 0u8;
    if env.slice.chroma_array_type.has_chroma_dc_ac() && engine.decode_decision(cbp_chroma_ctx(env, 0))? == 1 {
        chroma = 1 + engine.decode_decision(cbp_chroma_ctx(env, 1))? as u8;
    }
    Ok((luma, chroma))
}

pub fn encode_coded_block_pattern<E: CabacEncoder + ?Sized>(
    engine: &mut E,
    env: &SyntaxEnv<'_>,
    cbp_luma: u8,
    cbp_chroma: u8,
) -> ResynResult<()> {
    if cbp_luma > 15 || cbp_chroma > 2 {
        return Err(ResynError::invalid(format!("cbp 超出范围: luma={}, chroma={}", cbp_luma, cbp_chroma)));
    }
    for blk8 in 0..4 {
        let bin = u32::from(cbp_luma >> blk8) & 1;
        let known = cbp_luma & ((1 << blk8) - 1);
        engine.encode_decision(cbp_luma_ctx(env, blk8, known), bin)?;
    }
    if env.slice.chroma_array_type.has_chroma_dc_ac() {
        engine.encode_decision(cbp_chroma_ctx(env, 0), u32::from(cbp_chroma != 0))?;
        if cbp_chroma != 0 {
            engine.encode_decision(cbp_chroma_ctx(env, 1), u32::from(cbp_chroma == 2))?;
        }
    } else if cbp_chroma != 0 {
        return Err(ResynError::invalid("该色度格式下 cbp_chroma 必须为 0"));
    }
    Ok(())
}

fn qp_delta_ctx(env: &SyntaxEnv<'_>, bin_idx: u32) -> usize {
    match bin_idx {
        0 => CTX_MB_QP_DELTA + usize::from(env.mb.prev_qp_delta_nonzero),
        1 => CTX_MB_QP_DELTA + 2,
        _ => CTX_MB_QP_DELTA + 3,
    }
}

/// 解码 mb_qp_delta (一元码, 按 se 映射)
pub fn decode_mb_qp_delta<D: CabacDecoder + ?Sized>(engine: &mut D, env: &SyntaxEnv<'_>) -> ResynResult<i32> {
    let mut k = 0u32;
    while engine.decode_decision(qp_delta_ctx(env, k))? == 1 {
        k += 1;
        if k > MAX_QP_DELTA_BINS {
            return Err(ResynError::UnboundedLoop(format!("mb_qp_delta 超过 {} 个 bin", MAX_QP_DELTA_BINS)));
        }
    }
    let magnitude = k.div_ceil(2) as i32;
    Ok(if k % 2 == 1 { magnitude } else { -magnitude })
}

pub fn encode_mb_qp_delta<E: CabacEncoder + ?Sized>(engine: &mut E, env: &SyntaxEnv<'_>, value: i32) -> ResynResult<()> {
    let k = if value > 0 {
        2 * value.unsigned_abs() - 1
    } else {
        2 * value.unsigned_abs()
    };
    if k > MAX_QP_DELTA_BINS {
        return Err(ResynError::invalid(format!("mb_qp_delta 超出范围: {}", value)));
    }
    for bin_idx in 0..k {
        engine.encode_decision(qp_delta_ctx(env, bin_idx), 1)?;
    }
    engine.encode_decision(qp_delta_ctx(env, k), 0)
}

// ============================================================
// 帧内预测模式
// ============================================================

pub fn decode_prev_intra_pred_mode_flag<D: CabacDecoder + ?Sized>(engine: &mut D) -> ResynResult<bool> {
    Ok(engine.decode_decision(CTX_PREV_INTRA_PRED_FLAG)? == 1)
}

pub fn encode_prev_intra_pred_mode_flag<E: CabacEncoder + ?Sized>(engine: &mut E, flag: bool) -> ResynResult<()> {
    engine.encode_decision(CTX_PREV_INTRA_PRED_FLAG, u32::from(flag))
}

/// rem_intra_pred_mode: 3 个定长 bin, 低位在前
pub fn decode_rem_intra_pred_mode<D: CabacDecoder + ?Sized>(engine: &mut D) -> ResynResult<u8> {
    let mut mode = 0u8;
    for bit in 0..3 {
        mode |= (engine.decode_decision(CTX_REM_INTRA_PRED_MODE)? as u8) << bit;
    }
    Ok(mode)
}

pub fn encode_rem_intra_pred_mode<E: CabacEncoder + ?Sized>(engine: &mut E, mode: u8) -> ResynResult<()> {
    if mode > 7 {
        return Err(ResynError::invalid(format!("rem_intra_pred_mode 超出范围: {}", mode)));
    }
    for bit in 0..3 {
        engine.encode_decision(CTX_REM_INTRA_PRED_MODE, u32::from(mode >> bit) & 1)?;
    }
    Ok(())
}

fn chroma_pred_ctx(env: &SyntaxEnv<'_>, bin_idx: u32) -> usize {
    if bin_idx > 0 {
        return CTX_INTRA_CHROMA_PRED_MODE + 3;
    }
    let term = |mb: &NeighborMacroblock| mb.kind.is_intra() && !mb.kind.is_pcm() && mb.intra_chroma_pred_mode != 0;
    CTX_INTRA_CHROMA_PRED_MODE + cond(env.neighbors.left(), term) + cond(env.neighbors.above(), term)
}

/// intra_chroma_pred_mode: TU, cMax 3
pub fn decode_intra_chroma_pred_mode<D: CabacDecoder + ?Sized>(engine: &mut D, env: &SyntaxEnv<'_>) -> ResynResult<u8> {
    let mut mode = 0u32;
    while mode < 3 && engine.decode_decision(chroma_pred_ctx(env, mode))? == 1 {
        mode += 1;
    }
    Ok(mode as u8)
}

pub fn encode_intra_chroma_pred_mode<E: CabacEncoder + ?Sized>(
    engine: &mut E,
    env: &SyntaxEnv<'_>,
    mode: u8,
) -> ResynResult<()> {
    if mode > 3 {
        return Err(ResynError::invalid(format!("intra_chroma_pred_mode 超出范围: {}", mode)));
    }
    let mode = u32::from(mode);
    for bin_idx in 0..mode {
        engine.encode_decision(chroma_pred_ctx(env, bin_idx), 1)?;
    }
    if mode < 3 {
        engine.encode_decision(chroma_pred_ctx(env, mode), 0)?;
    }
    Ok(())
}

// ============================================================
// ref_idx / mvd
// ============================================================

fn ref_idx_cond(env: &SyntaxEnv<'_>, n: Option<BlockNeighbor<'_>>, list: usize) -> usize {
    let Some(n) = n else {
        return 0;
    };
    if n.mb.kind.is_skip() || n.mb.kind.is_intra() {
        return 0;
    }
    let threshold = i8::from(env.slice.mbaff_frame && !env.mb.mb_field_decoding && n.mb.field_coded);
    usize::from(n.mb.motion.ref_idx[list][n.y * 2 + n.x] > threshold)
}

fn ref_idx_ctx(env: &SyntaxEnv<'_>, list: usize, blk8: usize, bin_idx: u32) -> usize {
    match bin_idx {
        0 => {
            let (x, y) = (blk8 % 2, blk8 / 2);
            let a = ref_idx_cond(env, left_block(env.current, env.neighbors, x, y, 2), list);
            let b = ref_idx_cond(env, above_block(env.current, env.neighbors, x, y, 2), list);
            CTX_REF_IDX + a + 2 * b
        }
        1 => CTX_REF_IDX + 4,
        _ => CTX_REF_IDX + 5,
    }
}

/// 解码 ref_idx_lX; `blk8` 为分区左上角所在的 8x8 块
pub fn decode_ref_idx<D: CabacDecoder + ?Sized>(
    engine: &mut D,
    env: &SyntaxEnv<'_>,
    list: usize,
    blk8: usize,
) -> ResynResult<u32> {
    let mut value = 0u32;
    while engine.decode_decision(ref_idx_ctx(env, list, blk8, value))? == 1 {
        value += 1;
        if value > MAX_REF_IDX_BINS {
            return Err(ResynError::UnboundedLoop(format!("ref_idx 超过 {} 个 bin", MAX_REF_IDX_BINS)));
        }
    }
    Ok(value)
}

pub fn encode_ref_idx<E: CabacEncoder + ?Sized>(
    engine: &mut E,
    env: &SyntaxEnv<'_>,
    list: usize,
    blk8: usize,
    value: u32,
) -> ResynResult<()> {
    if value > MAX_REF_IDX_BINS {
        return Err(ResynError::invalid(format!("ref_idx 超出范围: {}", value)));
    }
    for bin_idx in 0..value {
        engine.encode_decision(ref_idx_ctx(env, list, blk8, bin_idx), 1)?;
    }
    engine.encode_decision(ref_idx_ctx(env, list, blk8, value), 0)
}

fn abs_mvd_of(env: &SyntaxEnv<'_>, n: Option<BlockNeighbor<'_>>, list: usize, comp: usize) -> u32 {
    let Some(n) = n else {
        return 0;
    };
    if n.mb.kind.is_skip() || n.mb.kind.is_intra() {
        return 0;
    }
    let abs = u32::from(n.mb.motion.abs_mvd[list][luma4x4_index(n.x, n.y)][comp]);
    if comp == 1 && env.slice.mbaff_frame && !n.in_current {
        match (env.mb.mb_field_decoding, n.mb.field_coded) {
            (false, true) => return abs * 2,
            (true, false) => return abs / 2,
            _ => {}
        }
    }
    abs
}

fn mvd_ctx(env: &SyntaxEnv<'_>, list: usize, blk4: usize, comp: usize, bin_idx: u32) -> usize {
    let base = if comp == 0 { CTX_MVD_X } else { CTX_MVD_Y };
    if bin_idx > 0 {
        return base + [3, 4, 5, 6][(bin_idx as usize - 1).min(3)];
    }
    let (x, y) = luma4x4_xy(blk4);
    let sum = abs_mvd_of(env, left_block(env.current, env.neighbors, x, y, 4), list, comp)
        + abs_mvd_of(env, above_block(env.current, env.neighbors, x, y, 4), list, comp);
    base + match sum {
        0..=2 => 0,
        3..=32 => 1,
        _ => 2,
    }
}

/// 解码 mvd_lX 的一个分量 (UEG3, 有符号, uCoff 9); `blk4` 为分区左上角 4x4 块
pub fn decode_mvd<D: CabacDecoder + ?Sized>(
    engine: &mut D,
    env: &SyntaxEnv<'_>,
    list: usize,
    blk4: usize,
    comp: usize,
) -> ResynResult<i32> {
    let mut prefix = 0u32;
    while prefix < MVD_PREFIX_MAX && engine.decode_decision(mvd_ctx(env, list, blk4, comp, prefix))? == 1 {
        prefix += 1;
    }
    if prefix == 0 {
        return Ok(0);
    }
    let mut abs = prefix;
    if prefix == MVD_PREFIX_MAX {
        abs += decode_exp_golomb_bypass(engine, 3)?;
    }
    let abs = i32::try_from(abs).map_err(|_| ResynError::malformed("mvd 超出范围"))?;
    Ok(if engine.decode_bypass()? == 1 { -abs } else { abs })
}

pub fn encode_mvd<E: CabacEncoder + ?Sized>(
    engine: &mut E,
    env: &SyntaxEnv<'_>,
    list: usize,
    blk4: usize,
    comp: usize,
    value: i32,
) -> ResynResult<()> {
    let abs = value.unsigned_abs();
    let prefix = abs.min(MVD_PREFIX_MAX);
    for bin_idx in 0..prefix {
        engine.encode_decision(mvd_ctx(env, list, blk4, comp, bin_idx), 1)?;
    }
    if prefix < MVD_PREFIX_MAX {
        engine.encode_decision(mvd_ctx(env, list, blk4, comp, prefix), 0)?;
    } else {
        encode_exp_golomb_bypass(engine, abs - MVD_PREFIX_MAX, 3)?;
    }
    if abs != 0 {
        engine.encode_bypass(u32::from(value < 0))?;
    }
    Ok(())
}
