//! 宏块层 (macroblock_layer).
//!
//! 按 mb_type 决定出现哪些语法结构:
//! - I_PCM: 字节对齐后直接携带原始样本
//! - 其他: mb_pred 或 sub_mb_pred, coded_block_pattern, transform_size_8x8_flag,
//!   以及存在残差时的 mb_qp_delta 与 residual
//!
//! 解码过程中维护当前宏块的 [`NeighborMacroblock`] 摘要, 结束时交还调用方,
//! 作为后续宏块的邻居.

use log::{debug, warn};
use resyn_core::{ResynError, ResynResult};

use super::block::BlockIndexCursor;
use super::context::{MacroblockContext, SliceContext};
use super::mb_type::MbType;
use super::neighbor::{NeighborKind, NeighborMacroblock, NeighborSource};
use super::prediction::{MacroblockPrediction, PredictionSyntax, SubMacroblockPrediction};
use super::residual::{Residual, ResidualParams};
use super::syntax::{SyntaxEnv, SyntaxReader, SyntaxWriter};

/// I_PCM 样本
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PcmSamples {
    /// 256 个亮度样本 (光栅顺序)
    pub luma: Vec<u16>,
    /// 2 * MbWidthC * MbHeightC 个色度样本, Cb 在前
    pub chroma: Vec<u16>,
}

impl PcmSamples {
    /// (亮度样本数, 色度样本数)
    pub fn sample_counts(slice: &SliceContext) -> (usize, usize) {
        let chroma = slice.chroma_array_type;
        (256, 2 * chroma.mb_width_c() * chroma.mb_height_c())
    }

    /// 按位深逐个读取样本, `read(bits)` 返回一个样本
    pub(crate) fn read_with<F>(slice: &SliceContext, mut read: F) -> ResynResult<Self>
    where
        F: FnMut(u32) -> ResynResult<u32>,
    {
        let (luma_count, chroma_count) = Self::sample_counts(slice);
        let luma_bits = u32::from(slice.bit_depth_luma);
        let chroma_bits = u32::from(slice.bit_depth_chroma);
        let mut samples = Self {
            luma: Vec::with_capacity(luma_count),
            chroma: Vec::with_capacity(chroma_count),
        };
        for _ in 0..luma_count {
            samples.luma.push(read(luma_bits)? as u16);
        }
        for _ in 0..chroma_count {
            samples.chroma.push(read(chroma_bits)? as u16);
        }
        Ok(samples)
    }

    /// 校验样本数与取值范围后逐个写出, `write(value, bits)`
    pub(crate) fn write_with<F>(&self, slice: &SliceContext, mut write: F) -> ResynResult<()>
    where
        F: FnMut(u32, u32) -> ResynResult<()>,
    {
        let (luma_count, chroma_count) = Self::sample_counts(slice);
        if self.luma.len() != luma_count || self.chroma.len() != chroma_count {
            return Err(ResynError::invalid(format!(
                "PCM 样本数不符: 亮度 {}/{}, 色度 {}/{}",
                self.luma.len(),
                luma_count,
                self.chroma.len(),
                chroma_count
            )));
        }
        for (samples, depth) in [
            (&self.luma, slice.bit_depth_luma),
            (&self.chroma, slice.bit_depth_chroma),
        ] {
            let bits = u32::from(depth);
            for &sample in samples.iter() {
                if u32::from(sample) >> bits != 0 {
                    return Err(ResynError::invalid(format!("PCM 样本 {} 超出 {} 位", sample, bits)));
                }
                write(u32::from(sample), bits)?;
            }
        }
        Ok(())
    }
}

/// 一个宏块的语法
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroblockLayer {
    pub mb_type: MbType,
    /// I_PCM 样本
    pub pcm: Option<PcmSamples>,
    /// transform_size_8x8_flag (未出现时为 false)
    pub transform_8x8: bool,
    /// CodedBlockPatternLuma (Intra16x16 由 mb_type 给出)
    pub cbp_luma: u8,
    /// CodedBlockPatternChroma
    pub cbp_chroma: u8,
    pub qp_delta: i32,
    pub prediction: Option<PredictionSyntax>,
    pub residual: Option<Residual>,
}

/// mb_qp_delta 的合法范围
fn qp_delta_range(slice: &SliceContext) -> (i32, i32) {
    let qp_bd_offset = 6 * (i32::from(slice.bit_depth_luma) - 8);
    (-(26 + qp_bd_offset / 2), 25 + qp_bd_offset / 2)
}

/// 8x8 预测后的 transform_size_8x8_flag 是否出现
fn reads_late_transform_flag(slice: &SliceContext, mb_type: MbType, cbp_luma: u8, no_sub_smaller_than_8x8: bool) -> bool {
    cbp_luma > 0
        && slice.transform_8x8_mode
        && !mb_type.is_i_nxn()
        && no_sub_smaller_than_8x8
        && (mb_type != MbType::BDirect16x16 || slice.direct_8x8_inference)
}

fn has_residual(mb_type: MbType, cbp_luma: u8, cbp_chroma: u8) -> bool {
    cbp_luma > 0 || cbp_chroma > 0 || mb_type.is_intra16x16()
}

impl MacroblockLayer {
    /// 解码一个宏块, 返回语法与当前宏块摘要
    pub fn decode<R: SyntaxReader + ?Sized>(
        reader: &mut R,
        slice: &SliceContext,
        mb: &MacroblockContext,
        neighbors: &dyn NeighborSource,
    ) -> ResynResult<(Self, NeighborMacroblock)> {
        let result = Self::decode_inner(reader, slice, mb, neighbors);
        match &result {
            Ok((layer, _)) => debug!(
                "宏块: mb_type={:?}, cbp=({}, {}), transform_8x8={}, qp_delta={}",
                layer.mb_type, layer.cbp_luma, layer.cbp_chroma, layer.transform_8x8, layer.qp_delta
            ),
            Err(err) => warn!("宏块层解码失败: {}", err),
        }
        result
    }

    fn decode_inner<R: SyntaxReader + ?Sized>(
        reader: &mut R,
        slice: &SliceContext,
        mb: &MacroblockContext,
        neighbors: &dyn NeighborSource,
    ) -> ResynResult<(Self, NeighborMacroblock)> {
        slice.validate()?;
        let placeholder = NeighborMacroblock::new(NeighborKind::Inter).with_field(mb.mb_field_decoding);
        let env = SyntaxEnv::new(slice, mb, neighbors, &placeholder);

        let mb_type = reader.read_mb_type(&env)?;
        let mut current = NeighborMacroblock::new(mb_type.neighbor_kind()).with_field(mb.mb_field_decoding);
        let mut layer = Self {
            mb_type,
            pcm: None,
            transform_8x8: false,
            cbp_luma: 0,
            cbp_chroma: 0,
            qp_delta: 0,
            prediction: None,
            residual: None,
        };

        if mb_type.is_pcm() {
            layer.pcm = Some(reader.read_pcm_samples(&env.with_current(&current))?);
            return Ok((layer, NeighborMacroblock::pcm().with_field(mb.mb_field_decoding)));
        }

        let mut no_sub_smaller_than_8x8 = true;
        if mb_type.has_sub_mb_pred() {
            let sub = SubMacroblockPrediction::decode(reader, &env, mb_type, &mut current)?;
            no_sub_smaller_than_8x8 = sub.no_sub_partition_smaller_than_8x8(slice.direct_8x8_inference);
            layer.prediction = Some(PredictionSyntax::Sub(sub));
        } else {
            if slice.transform_8x8_mode && mb_type.is_i_nxn() {
                layer.transform_8x8 = reader.read_transform_size_8x8_flag(&env.with_current(&current))?;
                current.transform_8x8 = layer.transform_8x8;
            }
            let pred = MacroblockPrediction::decode(reader, &env, mb_type, layer.transform_8x8, &mut current)?;
            layer.prediction = Some(PredictionSyntax::Mb(pred));
        }

        let (cbp_luma, cbp_chroma) = match mb_type.intra16x16_params() {
            Some((_, luma, chroma)) => (luma, chroma),
            None => reader.read_coded_block_pattern(&env.with_current(&current), mb_type)?,
        };
        layer.cbp_luma = cbp_luma;
        layer.cbp_chroma = cbp_chroma;
        current.cbp_luma = cbp_luma;
        current.cbp_chroma = cbp_chroma;

        if !mb_type.is_intra16x16() && reads_late_transform_flag(slice, mb_type, cbp_luma, no_sub_smaller_than_8x8) {
            layer.transform_8x8 = reader.read_transform_size_8x8_flag(&env.with_current(&current))?;
            current.transform_8x8 = layer.transform_8x8;
        }

        if has_residual(mb_type, cbp_luma, cbp_chroma) {
            let qp_delta = reader.read_mb_qp_delta(&env.with_current(&current))?;
            let (min, max) = qp_delta_range(slice);
            if !(min..=max).contains(&qp_delta) {
                return Err(ResynError::malformed(format!(
                    "mb_qp_delta 超出范围: {} 不在 [{}, {}]",
                    qp_delta, min, max
                )));
            }
            layer.qp_delta = qp_delta;

            let params = ResidualParams::new(mb_type, cbp_luma, cbp_chroma, layer.transform_8x8);
            let (residual, cursor) =
                Residual::decode(reader, &env.with_current(&current), &params, BlockIndexCursor::new())?;
            current.blocks = cursor;
            layer.residual = Some(residual);
        }
        Ok((layer, current))
    }

    /// 编码一个宏块, 返回当前宏块摘要
    pub fn encode<W: SyntaxWriter + ?Sized>(
        &self,
        writer: &mut W,
        slice: &SliceContext,
        mb: &MacroblockContext,
        neighbors: &dyn NeighborSource,
    ) -> ResynResult<NeighborMacroblock> {
        slice.validate()?;
        let mb_type = self.mb_type;
        let placeholder = NeighborMacroblock::new(NeighborKind::Inter).with_field(mb.mb_field_decoding);
        let env = SyntaxEnv::new(slice, mb, neighbors, &placeholder);
        let mut current = NeighborMacroblock::new(mb_type.neighbor_kind()).with_field(mb.mb_field_decoding);

        if mb_type.is_pcm() {
            let pcm = self
                .pcm
                .as_ref()
                .ok_or_else(|| ResynError::invalid("I_PCM 宏块缺少样本"))?;
            writer.write_mb_type(&env, mb_type)?;
            writer.write_pcm_samples(&env.with_current(&current), pcm)?;
            return Ok(NeighborMacroblock::pcm().with_field(mb.mb_field_decoding));
        }

        if let Some((_, luma, chroma)) = mb_type.intra16x16_params() {
            if (luma, chroma) != (self.cbp_luma, self.cbp_chroma) {
                return Err(ResynError::invalid(format!(
                    "cbp ({}, {}) 与 {:?} 不符",
                    self.cbp_luma, self.cbp_chroma, mb_type
                )));
            }
        }
        writer.write_mb_type(&env, mb_type)?;

        let mut no_sub_smaller_than_8x8 = true;
        let mut early_transform = false;
        match (&self.prediction, mb_type.has_sub_mb_pred()) {
            (Some(PredictionSyntax::Sub(sub)), true) => {
                sub.encode(writer, &env, mb_type, &mut current)?;
                no_sub_smaller_than_8x8 = sub.no_sub_partition_smaller_than_8x8(slice.direct_8x8_inference);
            }
            (Some(PredictionSyntax::Mb(pred)), false) => {
                if slice.transform_8x8_mode && mb_type.is_i_nxn() {
                    writer.write_transform_size_8x8_flag(&env.with_current(&current), self.transform_8x8)?;
                    current.transform_8x8 = self.transform_8x8;
                    early_transform = true;
                }
                pred.encode(writer, &env, mb_type, self.transform_8x8, &mut current)?;
            }
            _ => {
                return Err(ResynError::invalid(format!("{:?} 的预测语法结构不符", mb_type)));
            }
        }

        current.cbp_luma = self.cbp_luma;
        current.cbp_chroma = self.cbp_chroma;
        if !mb_type.is_intra16x16() {
            writer.write_coded_block_pattern(&env.with_current(&current), mb_type, self.cbp_luma, self.cbp_chroma)?;
        }

        let late_transform = !mb_type.is_intra16x16()
            && reads_late_transform_flag(slice, mb_type, self.cbp_luma, no_sub_smaller_than_8x8);
        if late_transform {
            writer.write_transform_size_8x8_flag(&env.with_current(&current), self.transform_8x8)?;
            current.transform_8x8 = self.transform_8x8;
        } else if self.transform_8x8 && !early_transform {
            return Err(ResynError::invalid(format!(
                "{:?} 在当前条件下不能携带 transform_size_8x8_flag",
                mb_type
            )));
        }

        match (&self.residual, has_residual(mb_type, self.cbp_luma, self.cbp_chroma)) {
            (Some(residual), true) => {
                let (min, max) = qp_delta_range(slice);
                if !(min..=max).contains(&self.qp_delta) {
                    return Err(ResynError::invalid(format!("mb_qp_delta 超出范围: {}", self.qp_delta)));
                }
                writer.write_mb_qp_delta(&env.with_current(&current), self.qp_delta)?;
                let params = ResidualParams::new(mb_type, self.cbp_luma, self.cbp_chroma, self.transform_8x8);
                current.blocks =
                    residual.encode(writer, &env.with_current(&current), &params, BlockIndexCursor::new())?;
            }
            (None, false) if self.qp_delta == 0 => {}
            _ => {
                return Err(ResynError::invalid(format!(
                    "{:?} cbp=({}, {}) 的残差结构不符",
                    mb_type, self.cbp_luma, self.cbp_chroma
                )));
            }
        }
        debug!("宏块编码: mb_type={:?}, cbp=({}, {})", mb_type, self.cbp_luma, self.cbp_chroma);
        Ok(current)
    }

    /// 下一宏块 CABAC mb_qp_delta 上下文所需的标志
    pub fn qp_delta_nonzero(&self) -> bool {
        self.qp_delta != 0
    }
}
