//! 宏块残差 (residual).
//!
//! 先解码亮度平面, 再按 ChromaArrayType 解码色度:
//! - 1/2: 每个色度分量一个 DC 块与 4*NumC8x8 个 AC 块
//! - 3: Cb 与 Cr 各按亮度方式组织
//! - 0: 无色度

use log::trace;
use resyn_core::{ResynError, ResynResult};

use super::block::{BlockAddress, BlockCategory, BlockIndexCursor, BlockLocation, Component};
use super::context::ChromaArrayType;
use super::mb_type::MbType;
use super::residual_luma::{ResidualLuma, stored_or_derived};
use super::syntax::{CoeffBlock, SyntaxEnv, SyntaxReader, SyntaxWriter};

const CHROMA_COMPONENTS: [Component; 2] = [Component::Cb, Component::Cr];

/// 残差解码参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidualParams {
    pub mb_type: MbType,
    pub cbp_luma: u8,
    pub cbp_chroma: u8,
    /// transform_size_8x8_flag
    pub transform_8x8: bool,
    /// 扫描起点 (0..=15)
    pub start: usize,
    /// 扫描终点 (start..=15)
    pub end: usize,
}

impl ResidualParams {
    /// 完整扫描区间 `[0, 15]`
    pub fn new(mb_type: MbType, cbp_luma: u8, cbp_chroma: u8, transform_8x8: bool) -> Self {
        Self {
            mb_type,
            cbp_luma,
            cbp_chroma,
            transform_8x8,
            start: 0,
            end: 15,
        }
    }

    pub fn validate(&self) -> ResynResult<()> {
        if self.start > self.end || self.end > 15 {
            return Err(ResynError::invalid(format!("扫描区间非法: [{}, {}]", self.start, self.end)));
        }
        if self.cbp_luma > 15 || self.cbp_chroma > 2 {
            return Err(ResynError::invalid(format!(
                "cbp 超出范围: luma={}, chroma={}",
                self.cbp_luma, self.cbp_chroma
            )));
        }
        Ok(())
    }
}

/// 色度残差
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChromaResidual {
    /// ChromaArrayType 0
    None,
    /// ChromaArrayType 1/2, 以 iCbCr 为第一维
    DcAc {
        dc: [Option<CoeffBlock>; 2],
        /// chroma4x4BlkIdx 0..4*NumC8x8
        ac: [[Option<CoeffBlock>; 8]; 2],
        /// DC 系数, 前 4*NumC8x8 项有效
        dc_level: [[i32; 8]; 2],
        ac_level: [[[i32; 15]; 8]; 2],
    },
    /// ChromaArrayType 3
    Planes { cb: Box<ResidualLuma>, cr: Box<ResidualLuma> },
}

/// 宏块残差
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residual {
    pub luma: ResidualLuma,
    pub chroma: ChromaResidual,
}

impl Residual {
    /// 解码 residual(startIdx, endIdx), 返回残差与更新后的块状态游标
    pub fn decode<R: SyntaxReader + ?Sized>(
        reader: &mut R,
        env: &SyntaxEnv<'_>,
        params: &ResidualParams,
        cursor: BlockIndexCursor,
    ) -> ResynResult<(Self, BlockIndexCursor)> {
        params.validate()?;
        let (luma, mut cursor) = ResidualLuma::decode(reader, env, params, Component::Y, cursor)?;

        let chroma = match env.slice.chroma_array_type {
            ChromaArrayType::Monochrome => ChromaResidual::None,
            ChromaArrayType::Yuv444 => {
                let (cb, next) = ResidualLuma::decode(reader, env, params, Component::Cb, cursor)?;
                let (cr, next) = ResidualLuma::decode(reader, env, params, Component::Cr, next)?;
                cursor = next;
                ChromaResidual::Planes {
                    cb: Box::new(cb),
                    cr: Box::new(cr),
                }
            }
            chroma_type => {
                let num_blocks = 4 * chroma_type.num_c8x8();
                let mut dc: [Option<CoeffBlock>; 2] = [None, None];
                let mut ac: [[Option<CoeffBlock>; 8]; 2] = std::array::from_fn(|_| std::array::from_fn(|_| None));
                let mut dc_level = [[0i32; 8]; 2];
                let mut ac_level = [[[0i32; 15]; 8]; 2];

                if let Some(address) = chroma_dc_address(params, chroma_type)? {
                    for (i, component) in CHROMA_COMPONENTS.into_iter().enumerate() {
                        let (block, next) = reader.read_block(env, address, BlockLocation::ChromaDc(component), cursor)?;
                        cursor = next;
                        dc_level[i][..num_blocks].copy_from_slice(block.coefficients());
                        trace!("{:?} 色度 DC: total_coeff={}", component, block.total_coeff());
                        dc[i] = Some(block);
                    }
                }
                if let Some(address) = chroma_ac_address(params)? {
                    for (i, component) in CHROMA_COMPONENTS.into_iter().enumerate() {
                        for blk in 0..num_blocks {
                            let (block, next) =
                                reader.read_block(env, address, BlockLocation::ChromaAc(component, blk), cursor)?;
                            cursor = next;
                            ac_level[i][blk].copy_from_slice(block.coefficients());
                            ac[i][blk] = Some(block);
                        }
                    }
                }
                ChromaResidual::DcAc {
                    dc,
                    ac,
                    dc_level,
                    ac_level,
                }
            }
        };
        Ok((Self { luma, chroma }, cursor))
    }

    /// 编码残差, 块顺序与 [`Residual::decode`] 一致
    pub fn encode<W: SyntaxWriter + ?Sized>(
        &self,
        writer: &mut W,
        env: &SyntaxEnv<'_>,
        params: &ResidualParams,
        cursor: BlockIndexCursor,
    ) -> ResynResult<BlockIndexCursor> {
        params.validate()?;
        let mut cursor = self.luma.encode(writer, env, params, cursor)?;
        let entropy = writer.entropy();

        match (env.slice.chroma_array_type, &self.chroma) {
            (ChromaArrayType::Monochrome, ChromaResidual::None) => {}
            (ChromaArrayType::Yuv444, ChromaResidual::Planes { cb, cr }) => {
                cursor = cb.encode(writer, env, params, cursor)?;
                cursor = cr.encode(writer, env, params, cursor)?;
            }
            (
                chroma_type @ (ChromaArrayType::Yuv420 | ChromaArrayType::Yuv422),
                ChromaResidual::DcAc {
                    dc,
                    ac,
                    dc_level,
                    ac_level,
                },
            ) => {
                let num_blocks = 4 * chroma_type.num_c8x8();
                if let Some(address) = chroma_dc_address(params, chroma_type)? {
                    for (i, component) in CHROMA_COMPONENTS.into_iter().enumerate() {
                        let block = stored_or_derived(entropy, dc[i].as_ref(), address, &dc_level[i][..num_blocks])?;
                        cursor = writer.write_block(env, &block, BlockLocation::ChromaDc(component), cursor)?;
                    }
                }
                if let Some(address) = chroma_ac_address(params)? {
                    for (i, component) in CHROMA_COMPONENTS.into_iter().enumerate() {
                        for blk in 0..num_blocks {
                            let block = stored_or_derived(entropy, ac[i][blk].as_ref(), address, &ac_level[i][blk])?;
                            cursor = writer.write_block(env, &block, BlockLocation::ChromaAc(component, blk), cursor)?;
                        }
                    }
                }
            }
            (chroma_type, _) => {
                return Err(ResynError::invalid(format!(
                    "色度残差结构与 ChromaArrayType {:?} 不符",
                    chroma_type
                )));
            }
        }
        Ok(cursor)
    }
}

fn chroma_dc_address(params: &ResidualParams, chroma_type: ChromaArrayType) -> ResynResult<Option<BlockAddress>> {
    if params.cbp_chroma & 3 == 0 || params.start != 0 {
        return Ok(None);
    }
    let count = 4 * chroma_type.num_c8x8();
    BlockAddress::new(BlockCategory::ChromaDc, 0, count - 1, count).map(Some)
}

fn chroma_ac_address(params: &ResidualParams) -> ResynResult<Option<BlockAddress>> {
    if params.cbp_chroma & 2 == 0 {
        return Ok(None);
    }
    if params.end == 0 {
        return Err(ResynError::UnsupportedPath("扫描终点为 0 时色度 AC 块为空区间".into()));
    }
    BlockAddress::new(BlockCategory::ChromaAc, params.start.saturating_sub(1), params.end - 1, 15).map(Some)
}
