//! 预测语法: mb_pred 与 sub_mb_pred.
//!
//! 帧间元素的读取顺序为: 全部分区的 ref_idx_l0, 全部分区的 ref_idx_l1,
//! 然后是 mvd_l0 与 mvd_l1. 每读出一个元素都会更新当前宏块的运动摘要,
//! 供后续分区的 CABAC 上下文推导使用.

use log::trace;
use resyn_core::{ResynError, ResynResult};

use super::block::luma4x4_index;
use super::context::ChromaArrayType;
use super::mb_type::{MbType, PartPredMode, PartRect, SubMbType};
use super::neighbor::NeighborMacroblock;
use super::syntax::{SyntaxEnv, SyntaxReader, SyntaxWriter};

/// 帧内亮度预测模式语法
///
/// 每项为 None 表示 prev_intra_pred_mode_flag=1, Some(rem) 表示传输了 rem_intra_pred_mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntraPredModes {
    Luma4x4([Option<u8>; 16]),
    Luma8x8([Option<u8>; 4]),
}

impl IntraPredModes {
    fn modes(&self) -> &[Option<u8>] {
        match self {
            Self::Luma4x4(m) => m,
            Self::Luma8x8(m) => m,
        }
    }
}

/// mb_pred 语法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacroblockPrediction {
    /// I_NxN / SI 的亮度预测模式
    pub intra_modes: Option<IntraPredModes>,
    /// intra_chroma_pred_mode (ChromaArrayType 1/2 的帧内宏块)
    pub intra_chroma_pred_mode: Option<u8>,
    /// `[列表][分区]`, 未出现在码流中的为 None
    pub ref_idx: [[Option<u32>; 2]; 2],
    /// `[列表][分区]` 的 (水平, 垂直) 分量
    pub mvd: [[Option<[i32; 2]>; 2]; 2],
}

/// sub_mb_pred 语法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMacroblockPrediction {
    pub sub_mb_type: [SubMbType; 4],
    /// `[列表][8x8 块]`
    pub ref_idx: [[Option<u32>; 4]; 2],
    /// `[列表][8x8 块][子分区]`
    pub mvd: [[[Option<[i32; 2]>; 4]; 4]; 2],
}

/// 宏块的预测语法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionSyntax {
    Mb(MacroblockPrediction),
    Sub(SubMacroblockPrediction),
}

fn rect_blk8(rect: PartRect) -> usize {
    (rect.1 / 2) * 2 + rect.0 / 2
}

fn rect_blk4(rect: PartRect) -> usize {
    luma4x4_index(rect.0, rect.1)
}

fn store_ref_idx(current: &mut NeighborMacroblock, list: usize, rect: PartRect, value: i8) {
    let (x, y, w, h) = rect;
    for by in (y / 2)..((y + h).div_ceil(2)) {
        for bx in (x / 2)..((x + w).div_ceil(2)) {
            current.motion.ref_idx[list][by * 2 + bx] = value;
        }
    }
}

fn store_abs_mvd(current: &mut NeighborMacroblock, list: usize, rect: PartRect, comp: usize, value: i32) {
    let abs = u16::try_from(value.unsigned_abs()).unwrap_or(u16::MAX);
    let (x, y, w, h) = rect;
    for by in y..y + h {
        for bx in x..x + w {
            current.motion.abs_mvd[list][luma4x4_index(bx, by)][comp] = abs;
        }
    }
}

fn ref_value(value: u32) -> i8 {
    i8::try_from(value).unwrap_or(i8::MAX)
}

/// 列表 `list` 的 ref_idx 是否出现及其 te(v) 范围
fn ref_idx_syntax(env: &SyntaxEnv<'_>, list: usize) -> (bool, u32) {
    let minus1 = if list == 0 {
        env.slice.num_ref_idx_l0_active_minus1
    } else {
        env.slice.num_ref_idx_l1_active_minus1
    };
    (
        env.mb.ref_idx_present(env.slice, minus1),
        env.mb.ref_idx_range(env.slice, minus1),
    )
}

fn reads_intra_chroma(env: &SyntaxEnv<'_>) -> bool {
    matches!(env.slice.chroma_array_type, ChromaArrayType::Yuv420 | ChromaArrayType::Yuv422)
}

fn intra_mode_count(mb_type: MbType, transform_8x8: bool) -> Option<usize> {
    match mb_type.part_pred_mode(0) {
        PartPredMode::IntraNxN if transform_8x8 && mb_type.is_i_nxn() => Some(4),
        PartPredMode::IntraNxN => Some(16),
        _ => None,
    }
}

/// 帧间分区预先写入运动摘要: 未使用的列表为 -1, 不出现的 ref_idx 推断为 0
fn seed_motion(current: &mut NeighborMacroblock, list: usize, rect: PartRect, mode: PartPredMode) {
    let value = if mode.uses_list(list) { 0 } else { -1 };
    store_ref_idx(current, list, rect, value);
}

impl MacroblockPrediction {
    /// 解码 mb_pred; `current` 为当前宏块摘要, 随解码推进更新
    pub fn decode<R: SyntaxReader + ?Sized>(
        reader: &mut R,
        env: &SyntaxEnv<'_>,
        mb_type: MbType,
        transform_8x8: bool,
        current: &mut NeighborMacroblock,
    ) -> ResynResult<Self> {
        let mut pred = Self::default();

        if mb_type.is_intra() {
            if let Some(count) = intra_mode_count(mb_type, transform_8x8) {
                let mut modes = [None; 16];
                for mode in modes.iter_mut().take(count) {
                    if !reader.read_prev_intra_pred_mode_flag()? {
                        *mode = Some(reader.read_rem_intra_pred_mode()?);
                    }
                }
                pred.intra_modes = Some(if count == 4 {
                    IntraPredModes::Luma8x8([modes[0], modes[1], modes[2], modes[3]])
                } else {
                    IntraPredModes::Luma4x4(modes)
                });
            }
            if reads_intra_chroma(env) {
                let mode = reader.read_intra_chroma_pred_mode(&env.with_current(current))?;
                current.intra_chroma_pred_mode = mode;
                pred.intra_chroma_pred_mode = Some(mode);
            }
            return Ok(pred);
        }

        if mb_type.part_pred_mode(0) == PartPredMode::Direct {
            return Ok(pred);
        }

        let parts = mb_type.num_mb_part();
        for list in 0..2 {
            for part in 0..parts {
                seed_motion(current, list, mb_type.part_rect(part), mb_type.part_pred_mode(part));
            }
        }
        for list in 0..2 {
            let (present, range) = ref_idx_syntax(env, list);
            for part in 0..parts {
                if !present || !mb_type.part_pred_mode(part).uses_list(list) {
                    continue;
                }
                let rect = mb_type.part_rect(part);
                let value = reader.read_ref_idx(&env.with_current(current), list, rect_blk8(rect), range)?;
                store_ref_idx(current, list, rect, ref_value(value));
                pred.ref_idx[list][part] = Some(value);
            }
        }
        for list in 0..2 {
            for part in 0..parts {
                if !mb_type.part_pred_mode(part).uses_list(list) {
                    continue;
                }
                let rect = mb_type.part_rect(part);
                let mut mvd = [0i32; 2];
                for (comp, slot) in mvd.iter_mut().enumerate() {
                    *slot = reader.read_mvd(&env.with_current(current), list, rect_blk4(rect), comp)?;
                    store_abs_mvd(current, list, rect, comp, *slot);
                }
                trace!("mb_pred: list={} part={} mvd={:?}", list, part, mvd);
                pred.mvd[list][part] = Some(mvd);
            }
        }
        Ok(pred)
    }

    /// 编码 mb_pred, 元素顺序与 [`MacroblockPrediction::decode`] 一致
    pub fn encode<W: SyntaxWriter + ?Sized>(
        &self,
        writer: &mut W,
        env: &SyntaxEnv<'_>,
        mb_type: MbType,
        transform_8x8: bool,
        current: &mut NeighborMacroblock,
    ) -> ResynResult<()> {
        if mb_type.is_intra() {
            if let Some(count) = intra_mode_count(mb_type, transform_8x8) {
                let modes = self
                    .intra_modes
                    .as_ref()
                    .map(IntraPredModes::modes)
                    .filter(|m| m.len() == count)
                    .ok_or_else(|| {
                        ResynError::invalid(format!("{:?} 需要 {} 个帧内预测模式", mb_type, count))
                    })?;
                for mode in modes {
                    writer.write_prev_intra_pred_mode_flag(mode.is_none())?;
                    if let Some(rem) = mode {
                        writer.write_rem_intra_pred_mode(*rem)?;
                    }
                }
            }
            if reads_intra_chroma(env) {
                let mode = self
                    .intra_chroma_pred_mode
                    .ok_or_else(|| ResynError::invalid("缺少 intra_chroma_pred_mode"))?;
                writer.write_intra_chroma_pred_mode(&env.with_current(current), mode)?;
                current.intra_chroma_pred_mode = mode;
            }
            return Ok(());
        }

        if mb_type.part_pred_mode(0) == PartPredMode::Direct {
            return Ok(());
        }

        let parts = mb_type.num_mb_part();
        for list in 0..2 {
            for part in 0..parts {
                seed_motion(current, list, mb_type.part_rect(part), mb_type.part_pred_mode(part));
            }
        }
        for list in 0..2 {
            let (present, range) = ref_idx_syntax(env, list);
            for part in 0..parts {
                if !present || !mb_type.part_pred_mode(part).uses_list(list) {
                    continue;
                }
                let rect = mb_type.part_rect(part);
                let value = self.ref_idx[list][part]
                    .ok_or_else(|| ResynError::invalid(format!("缺少 ref_idx_l{}[{}]", list, part)))?;
                writer.write_ref_idx(&env.with_current(current), list, rect_blk8(rect), range, value)?;
                store_ref_idx(current, list, rect, ref_value(value));
            }
        }
        for list in 0..2 {
            for part in 0..parts {
                if !mb_type.part_pred_mode(part).uses_list(list) {
                    continue;
                }
                let rect = mb_type.part_rect(part);
                let mvd = self.mvd[list][part]
                    .ok_or_else(|| ResynError::invalid(format!("缺少 mvd_l{}[{}]", list, part)))?;
                for (comp, value) in mvd.into_iter().enumerate() {
                    writer.write_mvd(&env.with_current(current), list, rect_blk4(rect), comp, value)?;
                    store_abs_mvd(current, list, rect, comp, value);
                }
            }
        }
        Ok(())
    }
}

fn sub_rect(blk8: usize) -> PartRect {
    ((blk8 % 2) * 2, (blk8 / 2) * 2, 2, 2)
}

/// 8x8 块的 ref_idx 是否出现 (P_8x8ref0 与直接预测子宏块除外)
fn sub_reads_ref_idx(mb_type: MbType, sub: SubMbType, list: usize) -> bool {
    mb_type != MbType::P8x8Ref0 && !sub.is_direct() && sub.pred_mode().uses_list(list)
}

impl SubMacroblockPrediction {
    pub fn decode<R: SyntaxReader + ?Sized>(
        reader: &mut R,
        env: &SyntaxEnv<'_>,
        mb_type: MbType,
        current: &mut NeighborMacroblock,
    ) -> ResynResult<Self> {
        let mut sub_mb_type = [SubMbType::P8x8; 4];
        for sub in sub_mb_type.iter_mut() {
            *sub = reader.read_sub_mb_type(&env.with_current(current))?;
        }
        let mut pred = Self {
            sub_mb_type,
            ref_idx: [[None; 4]; 2],
            mvd: [[[None; 4]; 4]; 2],
        };

        for list in 0..2 {
            for (blk8, sub) in sub_mb_type.iter().enumerate() {
                seed_motion(current, list, sub_rect(blk8), sub.pred_mode());
            }
        }
        for list in 0..2 {
            let (present, range) = ref_idx_syntax(env, list);
            for (blk8, sub) in sub_mb_type.iter().enumerate() {
                if !present || !sub_reads_ref_idx(mb_type, *sub, list) {
                    continue;
                }
                let value = reader.read_ref_idx(&env.with_current(current), list, blk8, range)?;
                store_ref_idx(current, list, sub_rect(blk8), ref_value(value));
                pred.ref_idx[list][blk8] = Some(value);
            }
        }
        for list in 0..2 {
            for (blk8, sub) in sub_mb_type.iter().enumerate() {
                if sub.is_direct() || !sub.pred_mode().uses_list(list) {
                    continue;
                }
                for part in 0..sub.num_sub_mb_part() {
                    let rect = sub.sub_part_rect(blk8, part);
                    let mut mvd = [0i32; 2];
                    for (comp, slot) in mvd.iter_mut().enumerate() {
                        *slot = reader.read_mvd(&env.with_current(current), list, rect_blk4(rect), comp)?;
                        store_abs_mvd(current, list, rect, comp, *slot);
                    }
                    pred.mvd[list][blk8][part] = Some(mvd);
                }
            }
        }
        Ok(pred)
    }

    pub fn encode<W: SyntaxWriter + ?Sized>(
        &self,
        writer: &mut W,
        env: &SyntaxEnv<'_>,
        mb_type: MbType,
        current: &mut NeighborMacroblock,
    ) -> ResynResult<()> {
        for sub in self.sub_mb_type {
            writer.write_sub_mb_type(&env.with_current(current), sub)?;
        }

        for list in 0..2 {
            for (blk8, sub) in self.sub_mb_type.iter().enumerate() {
                seed_motion(current, list, sub_rect(blk8), sub.pred_mode());
            }
        }
        for list in 0..2 {
            let (present, range) = ref_idx_syntax(env, list);
            for (blk8, sub) in self.sub_mb_type.iter().enumerate() {
                if !present || !sub_reads_ref_idx(mb_type, *sub, list) {
                    continue;
                }
                let value = self.ref_idx[list][blk8]
                    .ok_or_else(|| ResynError::invalid(format!("缺少 ref_idx_l{}[{}]", list, blk8)))?;
                writer.write_ref_idx(&env.with_current(current), list, blk8, range, value)?;
                store_ref_idx(current, list, sub_rect(blk8), ref_value(value));
            }
        }
        for list in 0..2 {
            for (blk8, sub) in self.sub_mb_type.iter().enumerate() {
                if sub.is_direct() || !sub.pred_mode().uses_list(list) {
                    continue;
                }
                for part in 0..sub.num_sub_mb_part() {
                    let rect = sub.sub_part_rect(blk8, part);
                    let mvd = self.mvd[list][blk8][part].ok_or_else(|| {
                        ResynError::invalid(format!("缺少 mvd_l{}[{}][{}]", list, blk8, part))
                    })?;
                    for (comp, value) in mvd.into_iter().enumerate() {
                        writer.write_mvd(&env.with_current(current), list, rect_blk4(rect), comp, value)?;
                        store_abs_mvd(current, list, rect, comp, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// noSubMbPartSizeLessThan8x8Flag
    pub fn no_sub_partition_smaller_than_8x8(&self, direct_8x8_inference: bool) -> bool {
        self.sub_mb_type.iter().all(|sub| {
            if sub.is_direct() {
                direct_8x8_inference
            } else {
                !sub.is_smaller_than_8x8()
            }
        })
    }
}
