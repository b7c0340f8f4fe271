//! 熵编码无关的语法元素读写接口.
//!
//! 宏块层、预测语法与残差组装器只通过 [`SyntaxReader`] / [`SyntaxWriter`] 访问码流,
//! CAVLC 与 CABAC 各提供一组实现:
//! - [`CavlcSyntaxReader`] / [`CavlcSyntaxWriter`]: 基于比特游标的 Exp-Golomb 与 VLC
//! - [`CabacSyntaxReader`] / [`CabacSyntaxWriter`]: 基于外部算术引擎的二值化

use log::trace;
use resyn_core::{BitReader, BitWriter, ResynError, ResynResult};

use super::block::{BlockAddress, BlockIndexCursor, BlockLocation};
use super::cabac::{self, CabacBlock, CabacDecoder, CabacEncoder, coded_block_flag_ctx_inc, reads_coded_block_flag};
use super::cavlc::{CavlcBlock, derive_nc};
use super::context::{EntropyMode, MacroblockContext, SliceContext};
use super::exp_golomb::{read_me, read_se, read_te, read_ue, write_me, write_se, write_te, write_ue};
use super::macroblock::PcmSamples;
use super::mb_type::{MbType, SubMbType};
use super::neighbor::{NeighborMacroblock, NeighborSource};

/// 语法元素的解码环境
///
/// `current` 为当前宏块到目前为止的摘要, 用于宏块内部的邻居推导.
#[derive(Clone, Copy)]
pub struct SyntaxEnv<'a> {
    pub slice: &'a SliceContext,
    pub mb: &'a MacroblockContext,
    pub neighbors: &'a dyn NeighborSource,
    pub current: &'a NeighborMacroblock,
}

impl<'a> SyntaxEnv<'a> {
    pub fn new(
        slice: &'a SliceContext,
        mb: &'a MacroblockContext,
        neighbors: &'a dyn NeighborSource,
        current: &'a NeighborMacroblock,
    ) -> Self {
        Self {
            slice,
            mb,
            neighbors,
            current,
        }
    }

    /// 替换当前宏块摘要
    pub fn with_current<'b>(&self, current: &'b NeighborMacroblock) -> SyntaxEnv<'b>
    where
        'a: 'b,
    {
        SyntaxEnv {
            slice: self.slice,
            mb: self.mb,
            neighbors: self.neighbors,
            current,
        }
    }
}

/// 一个残差块的解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoeffBlock {
    Cavlc(CavlcBlock),
    Cabac(CabacBlock),
}

impl CoeffBlock {
    pub fn address(&self) -> BlockAddress {
        match self {
            Self::Cavlc(b) => b.address,
            Self::Cabac(b) => b.address,
        }
    }

    pub fn coefficients(&self) -> &[i32] {
        match self {
            Self::Cavlc(b) => b.coefficients(),
            Self::Cabac(b) => b.coefficients(),
        }
    }

    /// 非零系数个数
    pub fn total_coeff(&self) -> u8 {
        match self {
            Self::Cavlc(b) => b.total_coeff,
            Self::Cabac(b) => b.coeffs.count_nonzero() as u8,
        }
    }

    /// 块是否携带非零系数 (CABAC 8x8 的推断 coded_block_flag 视为已编码)
    pub fn is_coded(&self) -> bool {
        match self {
            Self::Cavlc(b) => b.total_coeff > 0,
            Self::Cabac(b) => b.coded_block_flag,
        }
    }
}

/// 语法元素读取
pub trait SyntaxReader {
    fn entropy(&self) -> EntropyMode;

    fn read_mb_type(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<MbType>;

    fn read_sub_mb_type(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<SubMbType>;

    fn read_transform_size_8x8_flag(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<bool>;

    /// 返回 `(cbp_luma, cbp_chroma)`
    fn read_coded_block_pattern(&mut self, env: &SyntaxEnv<'_>, mb_type: MbType) -> ResynResult<(u8, u8)>;

    fn read_mb_qp_delta(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<i32>;

    fn read_prev_intra_pred_mode_flag(&mut self) -> ResynResult<bool>;

    fn read_rem_intra_pred_mode(&mut self) -> ResynResult<u8>;

    fn read_intra_chroma_pred_mode(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<u8>;

    /// `blk8` 为分区左上角所在 8x8 块, `range` 为 te(v) 上界
    fn read_ref_idx(&mut self, env: &SyntaxEnv<'_>, list: usize, blk8: usize, range: u32) -> ResynResult<u32>;

    /// `blk4` 为分区左上角的 luma4x4BlkIdx, `comp` 0=水平 1=垂直
    fn read_mvd(&mut self, env: &SyntaxEnv<'_>, list: usize, blk4: usize, comp: usize) -> ResynResult<i32>;

    /// 读取一个残差块, 返回块与更新后的游标
    fn read_block(
        &mut self,
        env: &SyntaxEnv<'_>,
        address: BlockAddress,
        location: BlockLocation,
        cursor: BlockIndexCursor,
    ) -> ResynResult<(CoeffBlock, BlockIndexCursor)>;

    /// 读取 pcm_alignment_zero_bit 与 I_PCM 样本
    fn read_pcm_samples(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<PcmSamples>;
}

/// 语法元素写出, 与 [`SyntaxReader`] 一一对应
pub trait SyntaxWriter {
    fn entropy(&self) -> EntropyMode;

    fn write_mb_type(&mut self, env: &SyntaxEnv<'_>, mb_type: MbType) -> ResynResult<()>;

    fn write_sub_mb_type(&mut self, env: &SyntaxEnv<'_>, sub_mb_type: SubMbType) -> ResynResult<()>;

    fn write_transform_size_8x8_flag(&mut self, env: &SyntaxEnv<'_>, flag: bool) -> ResynResult<()>;

    fn write_coded_block_pattern(
        &mut self,
        env: &SyntaxEnv<'_>,
        mb_type: MbType,
        cbp_luma: u8,
        cbp_chroma: u8,
    ) -> ResynResult<()>;

    fn write_mb_qp_delta(&mut self, env: &SyntaxEnv<'_>, value: i32) -> ResynResult<()>;

    fn write_prev_intra_pred_mode_flag(&mut self, flag: bool) -> ResynResult<()>;

    fn write_rem_intra_pred_mode(&mut self, mode: u8) -> ResynResult<()>;

    fn write_intra_chroma_pred_mode(&mut self, env: &SyntaxEnv<'_>, mode: u8) -> ResynResult<()>;

    fn write_ref_idx(&mut self, env: &SyntaxEnv<'_>, list: usize, blk8: usize, range: u32, value: u32) -> ResynResult<()>;

    fn write_mvd(&mut self, env: &SyntaxEnv<'_>, list: usize, blk4: usize, comp: usize, value: i32) -> ResynResult<()>;

    /// 写出一个残差块, 返回更新后的游标
    ///
    /// 块的熵编码形式与写出端不一致时按系数重新推导语法值.
    fn write_block(
        &mut self,
        env: &SyntaxEnv<'_>,
        block: &CoeffBlock,
        location: BlockLocation,
        cursor: BlockIndexCursor,
    ) -> ResynResult<BlockIndexCursor>;

    fn write_pcm_samples(&mut self, env: &SyntaxEnv<'_>, samples: &PcmSamples) -> ResynResult<()>;
}

/// 记录块的 TotalCoeff 与 coded_block_flag
fn record_block(cursor: BlockIndexCursor, location: BlockLocation, coded: bool, total: u8) -> BlockIndexCursor {
    match location {
        BlockLocation::PlaneDc(c) | BlockLocation::ChromaDc(c) => cursor.with_coded_dc(c, coded),
        BlockLocation::Plane4x4(c, idx) | BlockLocation::ChromaAc(c, idx) => {
            cursor.with_total_coeff(c, idx, total).with_coded_4x4(c, idx, coded)
        }
        BlockLocation::Plane8x8(c, idx) => cursor.with_coded_8x8(c, idx, coded),
    }
}

fn check_ref_idx(value: u32, range: u32) -> ResynResult<u32> {
    if value > range {
        return Err(ResynError::malformed(format!("ref_idx 超出范围: {} > {}", value, range)));
    }
    Ok(value)
}

fn current_with_cursor(env: &SyntaxEnv<'_>, cursor: BlockIndexCursor) -> NeighborMacroblock {
    let mut current = *env.current;
    current.blocks = cursor;
    current
}

// ============================================================
// CAVLC
// ============================================================

/// CAVLC 语法读取
pub struct CavlcSyntaxReader<'a, 'b> {
    br: &'a mut BitReader<'b>,
}

impl<'a, 'b> CavlcSyntaxReader<'a, 'b> {
    pub fn new(br: &'a mut BitReader<'b>) -> Self {
        Self { br }
    }

    pub fn bits_read(&self) -> usize {
        self.br.bits_read()
    }
}

impl SyntaxReader for CavlcSyntaxReader<'_, '_> {
    fn entropy(&self) -> EntropyMode {
        EntropyMode::Cavlc
    }

    fn read_mb_type(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<MbType> {
        let raw = read_ue(self.br)?;
        MbType::from_raw(env.slice.slice_type, raw)
    }

    fn read_sub_mb_type(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<SubMbType> {
        let raw = read_ue(self.br)?;
        SubMbType::from_raw(env.slice.slice_type, raw)
    }

    fn read_transform_size_8x8_flag(&mut self, _env: &SyntaxEnv<'_>) -> ResynResult<bool> {
        self.br.read_flag()
    }

    fn read_coded_block_pattern(&mut self, env: &SyntaxEnv<'_>, mb_type: MbType) -> ResynResult<(u8, u8)> {
        let cbp = read_me(self.br, env.slice.chroma_array_type, mb_type.uses_intra_cbp_mapping())?;
        Ok((cbp & 0x0F, cbp >> 4))
    }

    fn read_mb_qp_delta(&mut self, _env: &SyntaxEnv<'_>) -> ResynResult<i32> {
        read_se(self.br)
    }

    fn read_prev_intra_pred_mode_flag(&mut self) -> ResynResult<bool> {
        self.br.read_flag()
    }

    fn read_rem_intra_pred_mode(&mut self) -> ResynResult<u8> {
        Ok(self.br.read_bits(3)? as u8)
    }

    fn read_intra_chroma_pred_mode(&mut self, _env: &SyntaxEnv<'_>) -> ResynResult<u8> {
        let mode = read_ue(self.br)?;
        if mode > 3 {
            return Err(ResynError::malformed(format!("intra_chroma_pred_mode 超出范围: {}", mode)));
        }
        Ok(mode as u8)
    }

    fn read_ref_idx(&mut self, _env: &SyntaxEnv<'_>, _list: usize, _blk8: usize, range: u32) -> ResynResult<u32> {
        check_ref_idx(read_te(self.br, range)?, range)
    }

    fn read_mvd(&mut self, _env: &SyntaxEnv<'_>, _list: usize, _blk4: usize, _comp: usize) -> ResynResult<i32> {
        read_se(self.br)
    }

    fn read_block(
        &mut self,
        env: &SyntaxEnv<'_>,
        address: BlockAddress,
        location: BlockLocation,
        cursor: BlockIndexCursor,
    ) -> ResynResult<(CoeffBlock, BlockIndexCursor)> {
        let current = current_with_cursor(env, cursor);
        let nc = derive_nc(location, &current, env.neighbors, env.slice)?;
        let block = CoeffBlock::Cavlc(CavlcBlock::decode(self.br, address, nc)?);
        trace!("{:?}: nC={}, total_coeff={}", location, nc, block.total_coeff());
        let cursor = record_block(cursor, location, block.is_coded(), block.total_coeff());
        Ok((block, cursor))
    }

    fn read_pcm_samples(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<PcmSamples> {
        while !self.br.is_byte_aligned() {
            if self.br.read_bit()? != 0 {
                return Err(ResynError::malformed("pcm_alignment_zero_bit 不为 0"));
            }
        }
        PcmSamples::read_with(env.slice, |bits| self.br.read_bits(bits))
    }
}

/// CAVLC 语法写出
pub struct CavlcSyntaxWriter<'a> {
    bw: &'a mut BitWriter,
}

impl<'a> CavlcSyntaxWriter<'a> {
    pub fn new(bw: &'a mut BitWriter) -> Self {
        Self { bw }
    }

    pub fn bits_written(&self) -> usize {
        self.bw.bits_written()
    }
}

impl SyntaxWriter for CavlcSyntaxWriter<'_> {
    fn entropy(&self) -> EntropyMode {
        EntropyMode::Cavlc
    }

    fn write_mb_type(&mut self, env: &SyntaxEnv<'_>, mb_type: MbType) -> ResynResult<()> {
        write_ue(self.bw, mb_type.raw(env.slice.slice_type)?);
        Ok(())
    }

    fn write_sub_mb_type(&mut self, _env: &SyntaxEnv<'_>, sub_mb_type: SubMbType) -> ResynResult<()> {
        write_ue(self.bw, sub_mb_type.raw());
        Ok(())
    }

    fn write_transform_size_8x8_flag(&mut self, _env: &SyntaxEnv<'_>, flag: bool) -> ResynResult<()> {
        self.bw.write_flag(flag);
        Ok(())
    }

    fn write_coded_block_pattern(
        &mut self,
        env: &SyntaxEnv<'_>,
        mb_type: MbType,
        cbp_luma: u8,
        cbp_chroma: u8,
    ) -> ResynResult<()> {
        if cbp_luma > 15 || cbp_chroma > 2 {
            return Err(ResynError::invalid(format!("cbp 超出范围: luma={}, chroma={}", cbp_luma, cbp_chroma)));
        }
        write_me(
            self.bw,
            cbp_luma | (cbp_chroma << 4),
            env.slice.chroma_array_type,
            mb_type.uses_intra_cbp_mapping(),
        )
    }

    fn write_mb_qp_delta(&mut self, _env: &SyntaxEnv<'_>, value: i32) -> ResynResult<()> {
        write_se(self.bw, value)
    }

    fn write_prev_intra_pred_mode_flag(&mut self, flag: bool) -> ResynResult<()> {
        self.bw.write_flag(flag);
        Ok(())
    }

    fn write_rem_intra_pred_mode(&mut self, mode: u8) -> ResynResult<()> {
        if mode > 7 {
            return Err(ResynError::invalid(format!("rem_intra_pred_mode 超出范围: {}", mode)));
        }
        self.bw.write_bits(u32::from(mode), 3);
        Ok(())
    }

    fn write_intra_chroma_pred_mode(&mut self, _env: &SyntaxEnv<'_>, mode: u8) -> ResynResult<()> {
        if mode > 3 {
            return Err(ResynError::invalid(format!("intra_chroma_pred_mode 超出范围: {}", mode)));
        }
        write_ue(self.bw, u32::from(mode));
        Ok(())
    }

    fn write_ref_idx(&mut self, _env: &SyntaxEnv<'_>, _list: usize, _blk8: usize, range: u32, value: u32) -> ResynResult<()> {
        write_te(self.bw, value, range)
    }

    fn write_mvd(&mut self, _env: &SyntaxEnv<'_>, _list: usize, _blk4: usize, _comp: usize, value: i32) -> ResynResult<()> {
        write_se(self.bw, value)
    }

    fn write_block(
        &mut self,
        env: &SyntaxEnv<'_>,
        block: &CoeffBlock,
        location: BlockLocation,
        cursor: BlockIndexCursor,
    ) -> ResynResult<BlockIndexCursor> {
        let current = current_with_cursor(env, cursor);
        let nc = derive_nc(location, &current, env.neighbors, env.slice)?;
        let converted;
        let cavlc = match block {
            CoeffBlock::Cavlc(b) => b,
            CoeffBlock::Cabac(b) => {
                converted = CavlcBlock::from_coefficients(b.address, b.coefficients())?;
                &converted
            }
        };
        cavlc.encode(self.bw, nc)?;
        Ok(record_block(cursor, location, cavlc.total_coeff > 0, cavlc.total_coeff))
    }

    fn write_pcm_samples(&mut self, env: &SyntaxEnv<'_>, samples: &PcmSamples) -> ResynResult<()> {
        self.bw.align_to_byte();
        samples.write_with(env.slice, |value, bits| {
            self.bw.write_bits(value, bits);
            Ok(())
        })
    }
}

// ============================================================
// CABAC
// ============================================================

/// CABAC 语法读取, 借用外部解码引擎
pub struct CabacSyntaxReader<'a, D: CabacDecoder + ?Sized> {
    engine: &'a mut D,
}

impl<'a, D: CabacDecoder + ?Sized> CabacSyntaxReader<'a, D> {
    pub fn new(engine: &'a mut D) -> Self {
        Self { engine }
    }
}

impl<D: CabacDecoder + ?Sized> SyntaxReader for CabacSyntaxReader<'_, D> {
    fn entropy(&self) -> EntropyMode {
        EntropyMode::Cabac
    }

    fn read_mb_type(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<MbType> {
        cabac::syntax::decode_mb_type(self.engine, env)
    }

    fn read_sub_mb_type(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<SubMbType> {
        cabac::syntax::decode_sub_mb_type(self.engine, env.slice.slice_type)
    }

    fn read_transform_size_8x8_flag(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<bool> {
        cabac::syntax::decode_transform_size_8x8_flag(self.engine, env)
    }

    fn read_coded_block_pattern(&mut self, env: &SyntaxEnv<'_>, _mb_type: MbType) -> ResynResult<(u8, u8)> {
        cabac::syntax::decode_coded_block_pattern(self.engine, env)
    }

    fn read_mb_qp_delta(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<i32> {
        cabac::syntax::decode_mb_qp_delta(self.engine, env)
    }

    fn read_prev_intra_pred_mode_flag(&mut self) -> ResynResult<bool> {
        cabac::syntax::decode_prev_intra_pred_mode_flag(self.engine)
    }

    fn read_rem_intra_pred_mode(&mut self) -> ResynResult<u8> {
        cabac::syntax::decode_rem_intra_pred_mode(self.engine)
    }

    fn read_intra_chroma_pred_mode(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<u8> {
        cabac::syntax::decode_intra_chroma_pred_mode(self.engine, env)
    }

    fn read_ref_idx(&mut self, env: &SyntaxEnv<'_>, list: usize, blk8: usize, range: u32) -> ResynResult<u32> {
        check_ref_idx(cabac::syntax::decode_ref_idx(self.engine, env, list, blk8)?, range)
    }

    fn read_mvd(&mut self, env: &SyntaxEnv<'_>, list: usize, blk4: usize, comp: usize) -> ResynResult<i32> {
        cabac::syntax::decode_mvd(self.engine, env, list, blk4, comp)
    }

    fn read_block(
        &mut self,
        env: &SyntaxEnv<'_>,
        address: BlockAddress,
        location: BlockLocation,
        cursor: BlockIndexCursor,
    ) -> ResynResult<(CoeffBlock, BlockIndexCursor)> {
        let chroma = env.slice.chroma_array_type;
        let current = current_with_cursor(env, cursor);
        let cbf_inc = reads_coded_block_flag(address.max_coeff(), chroma)
            .then(|| coded_block_flag_ctx_inc(location, &current, env.neighbors, env.slice));
        let field = env.mb.is_field_coded(env.slice);
        let block = CoeffBlock::Cabac(CabacBlock::decode(self.engine, address, cbf_inc, field, chroma)?);
        trace!("{:?}: coded_block_flag={} (ctxIdxInc={:?})", location, block.is_coded(), cbf_inc);
        let cursor = record_block(cursor, location, block.is_coded(), block.total_coeff());
        Ok((block, cursor))
    }

    fn read_pcm_samples(&mut self, env: &SyntaxEnv<'_>) -> ResynResult<PcmSamples> {
        while !self.engine.is_raw_aligned() {
            if self.engine.read_raw_bits(1)? != 0 {
                return Err(ResynError::malformed("pcm_alignment_zero_bit 不为 0"));
            }
        }
        let samples = PcmSamples::read_with(env.slice, |bits| self.engine.read_raw_bits(bits))?;
        self.engine.restart()?;
        Ok(samples)
    }
}

/// CABAC 语法写出, 借用外部编码引擎
pub struct CabacSyntaxWriter<'a, E: CabacEncoder + ?Sized> {
    engine: &'a mut E,
}

impl<'a, E: CabacEncoder + ?Sized> CabacSyntaxWriter<'a, E> {
    pub fn new(engine: &'a mut E) -> Self {
        Self { engine }
    }
}

impl<E: CabacEncoder + ?Sized> SyntaxWriter for CabacSyntaxWriter<'_, E> {
    fn entropy(&self) -> EntropyMode {
        EntropyMode::Cabac
    }

    fn write_mb_type(&mut self, env: &SyntaxEnv<'_>, mb_type: MbType) -> ResynResult<()> {
        cabac::syntax::encode_mb_type(self.engine, env, mb_type)
    }

    fn write_sub_mb_type(&mut self, env: &SyntaxEnv<'_>, sub_mb_type: SubMbType) -> ResynResult<()> {
        if sub_mb_type.is_b() != env.slice.slice_type.is_b() {
            return Err(ResynError::invalid(format!(
                "{:?} 不能出现在 {:?} 片中",
                sub_mb_type, env.slice.slice_type
            )));
        }
        cabac::syntax::encode_sub_mb_type(self.engine, sub_mb_type)
    }

    fn write_transform_size_8x8_flag(&mut self, env: &SyntaxEnv<'_>, flag: bool) -> ResynResult<()> {
        cabac::syntax::encode_transform_size_8x8_flag(self.engine, env, flag)
    }

    fn write_coded_block_pattern(
        &mut self,
        env: &SyntaxEnv<'_>,
        _mb_type: MbType,
        cbp_luma: u8,
        cbp_chroma: u8,
    ) -> ResynResult<()> {
        cabac::syntax::encode_coded_block_pattern(self.engine, env, cbp_luma, cbp_chroma)
    }

    fn write_mb_qp_delta(&mut self, env: &SyntaxEnv<'_>, value: i32) -> ResynResult<()> {
        cabac::syntax::encode_mb_qp_delta(self.engine, env, value)
    }

    fn write_prev_intra_pred_mode_flag(&mut self, flag: bool) -> ResynResult<()> {
        cabac::syntax::encode_prev_intra_pred_mode_flag(self.engine, flag)
    }

    fn write_rem_intra_pred_mode(&mut self, mode: u8) -> ResynResult<()> {
        cabac::syntax::encode_rem_intra_pred_mode(self.engine, mode)
    }

    fn write_intra_chroma_pred_mode(&mut self, env: &SyntaxEnv<'_>, mode: u8) -> ResynResult<()> {
        cabac::syntax::encode_intra_chroma_pred_mode(self.engine, env, mode)
    }

    fn write_ref_idx(&mut self, env: &SyntaxEnv<'_>, list: usize, blk8: usize, range: u32, value: u32) -> ResynResult<()> {
        if value > range {
            return Err(ResynError::invalid(format!("ref_idx 超出范围: {} > {}", value, range)));
        }
        cabac::syntax::encode_ref_idx(self.engine, env, list, blk8, value)
    }

    fn write_mvd(&mut self, env: &SyntaxEnv<'_>, list: usize, blk4: usize, comp: usize, value: i32) -> ResynResult<()> {
        cabac::syntax::encode_mvd(self.engine, env, list, blk4, comp, value)
    }

    fn write_block(
        &mut self,
        env: &SyntaxEnv<'_>,
        block: &CoeffBlock,
        location: BlockLocation,
        cursor: BlockIndexCursor,
    ) -> ResynResult<BlockIndexCursor> {
        let chroma = env.slice.chroma_array_type;
        let converted;
        let cabac_block = match block {
            CoeffBlock::Cabac(b) => b,
            CoeffBlock::Cavlc(b) => {
                converted = CabacBlock::from_coefficients(b.address, b.coefficients())?;
                &converted
            }
        };
        let address = cabac_block.address;
        let current = current_with_cursor(env, cursor);
        let cbf_inc = reads_coded_block_flag(address.max_coeff(), chroma)
            .then(|| coded_block_flag_ctx_inc(location, &current, env.neighbors, env.slice));
        let field = env.mb.is_field_coded(env.slice);
        cabac_block.encode(self.engine, cbf_inc, field, chroma)?;

        // 推断的 coded_block_flag 恒为 1
        let coded = cbf_inc.is_none() || !cabac_block.coeffs.is_all_zero();
        let total = cabac_block.coeffs.count_nonzero() as u8;
        Ok(record_block(cursor, location, coded, total))
    }

    fn write_pcm_samples(&mut self, env: &SyntaxEnv<'_>, samples: &PcmSamples) -> ResynResult<()> {
        while !self.engine.is_raw_aligned() {
            self.engine.write_raw_bits(0, 1)?;
        }
        samples.write_with(env.slice, |value, bits| self.engine.write_raw_bits(value, bits))?;
        self.engine.restart()
    }
}
