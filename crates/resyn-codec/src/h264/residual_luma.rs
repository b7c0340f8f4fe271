//! 亮度式平面残差 (residual_luma).
//!
//! 亮度平面, 以及 ChromaArrayType 为 3 时的 Cb/Cr 平面, 按同一结构组织:
//! 可选的 Intra16x16 DC 块, 然后按 8x8 组遍历 cbp_luma 置位的块.

use log::trace;
use resyn_core::{ResynError, ResynResult};

use super::block::{BlockAddress, BlockCategory, BlockIndexCursor, BlockLocation, Component, PlaneBlockKind};
use super::cabac::CabacBlock;
use super::cavlc::CavlcBlock;
use super::context::EntropyMode;
use super::residual::ResidualParams;
use super::syntax::{CoeffBlock, SyntaxEnv, SyntaxReader, SyntaxWriter};

/// 平面内的变换块
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LumaBlocks {
    /// 4x4 变换块 (含 Intra16x16 AC), 以 luma4x4BlkIdx 为下标
    Blocks4x4([Option<CoeffBlock>; 16]),
    /// CAVLC 的 8x8 变换: 每个 8x8 块由 4 次交织的 4x4 读取组成
    Interleaved8x8([Option<CoeffBlock>; 16]),
    /// CABAC 的 8x8 变换, 以 luma8x8BlkIdx 为下标
    Blocks8x8([Option<CoeffBlock>; 4]),
}

/// 一个亮度式平面的残差
///
/// 未读取的块为 None, 对应的系数数组全零.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidualLuma {
    pub component: Component,
    /// Intra16x16 DC 块
    pub dc: Option<CoeffBlock>,
    pub blocks: LumaBlocks,
    /// Intra16x16 DC 系数
    pub dc_level: [i32; 16],
    /// 各 4x4 块的系数; Intra16x16 AC 块只使用前 15 项
    pub level4x4: [[i32; 16]; 16],
    /// 各 8x8 块的系数 (8x8 变换时有效)
    pub level8x8: [[i32; 64]; 4],
}

impl ResidualLuma {
    /// 全零平面, 块结构按熵编码模式与变换尺寸选择
    pub fn new(component: Component, entropy: EntropyMode, transform_8x8: bool) -> Self {
        let blocks = match (transform_8x8, entropy) {
            (false, _) => LumaBlocks::Blocks4x4(std::array::from_fn(|_| None)),
            (true, EntropyMode::Cavlc) => LumaBlocks::Interleaved8x8(std::array::from_fn(|_| None)),
            (true, EntropyMode::Cabac) => LumaBlocks::Blocks8x8(std::array::from_fn(|_| None)),
        };
        Self {
            component,
            dc: None,
            blocks,
            dc_level: [0; 16],
            level4x4: [[0; 16]; 16],
            level8x8: [[0; 64]; 4],
        }
    }

    /// 解码一个平面
    pub fn decode<R: SyntaxReader + ?Sized>(
        reader: &mut R,
        env: &SyntaxEnv<'_>,
        params: &ResidualParams,
        component: Component,
        mut cursor: BlockIndexCursor,
    ) -> ResynResult<(Self, BlockIndexCursor)> {
        let mut plane = Self::new(component, reader.entropy(), params.transform_8x8);

        if let Some(address) = dc_address(params, component)? {
            let (block, next) = reader.read_block(env, address, BlockLocation::PlaneDc(component), cursor)?;
            cursor = next;
            plane.dc_level.copy_from_slice(block.coefficients());
            trace!("{:?} DC: total_coeff={}", component, block.total_coeff());
            plane.dc = Some(block);
        }

        for blk8 in 0..4 {
            if params.cbp_luma & (1 << blk8) == 0 {
                continue;
            }
            if let LumaBlocks::Blocks8x8(blocks) = &mut plane.blocks {
                let address = level8x8_address(params, component)?;
                let (block, next) = reader.read_block(env, address, BlockLocation::Plane8x8(component, blk8), cursor)?;
                cursor = next;
                plane.level8x8[blk8].copy_from_slice(block.coefficients());
                blocks[blk8] = Some(block);
                continue;
            }
            for sub in 0..4 {
                let blk = blk8 * 4 + sub;
                let address = block4x4_address(params, component)?;
                let (block, next) = reader.read_block(env, address, BlockLocation::Plane4x4(component, blk), cursor)?;
                cursor = next;
                let coeffs = block.coefficients();
                plane.level4x4[blk][..coeffs.len()].copy_from_slice(coeffs);
                match &mut plane.blocks {
                    LumaBlocks::Interleaved8x8(blocks) => {
                        for (i, &level) in plane.level4x4[blk].iter().enumerate() {
                            plane.level8x8[blk8][4 * i + sub] = level;
                        }
                        blocks[blk] = Some(block);
                    }
                    LumaBlocks::Blocks4x4(blocks) => blocks[blk] = Some(block),
                    LumaBlocks::Blocks8x8(_) => {}
                }
            }
        }
        Ok((plane, cursor))
    }

    /// 编码一个平面; 缺失的块按系数数组重新推导
    pub fn encode<W: SyntaxWriter + ?Sized>(
        &self,
        writer: &mut W,
        env: &SyntaxEnv<'_>,
        params: &ResidualParams,
        mut cursor: BlockIndexCursor,
    ) -> ResynResult<BlockIndexCursor> {
        let component = self.component;
        let entropy = writer.entropy();
        let expected = Self::new(component, entropy, params.transform_8x8);
        if std::mem::discriminant(&expected.blocks) != std::mem::discriminant(&self.blocks) {
            return Err(ResynError::invalid(format!(
                "{:?} 平面的块结构与 transform_size_8x8_flag={} 不符",
                component, params.transform_8x8
            )));
        }

        if let Some(address) = dc_address(params, component)? {
            let block = stored_or_derived(entropy, self.dc.as_ref(), address, &self.dc_level)?;
            cursor = writer.write_block(env, &block, BlockLocation::PlaneDc(component), cursor)?;
        }

        for blk8 in 0..4 {
            if params.cbp_luma & (1 << blk8) == 0 {
                continue;
            }
            match &self.blocks {
                LumaBlocks::Blocks8x8(blocks) => {
                    let address = level8x8_address(params, component)?;
                    let block = stored_or_derived(entropy, blocks[blk8].as_ref(), address, &self.level8x8[blk8])?;
                    cursor = writer.write_block(env, &block, BlockLocation::Plane8x8(component, blk8), cursor)?;
                }
                LumaBlocks::Blocks4x4(blocks) | LumaBlocks::Interleaved8x8(blocks) => {
                    for sub in 0..4 {
                        let blk = blk8 * 4 + sub;
                        let address = block4x4_address(params, component)?;
                        let levels = &self.level4x4[blk][..address.max_coeff()];
                        let block = stored_or_derived(entropy, blocks[blk].as_ref(), address, levels)?;
                        cursor = writer.write_block(env, &block, BlockLocation::Plane4x4(component, blk), cursor)?;
                    }
                }
            }
        }
        Ok(cursor)
    }
}

/// 已有块须与期望地址一致; 没有块时由系数推导出与写出端一致的形式
pub(crate) fn stored_or_derived(
    entropy: EntropyMode,
    stored: Option<&CoeffBlock>,
    address: BlockAddress,
    levels: &[i32],
) -> ResynResult<CoeffBlock> {
    match stored {
        Some(block) if block.address() == address => Ok(block.clone()),
        Some(block) => Err(ResynError::invalid(format!(
            "块地址不符: 期望 {:?}, 实际 {:?}",
            address,
            block.address()
        ))),
        None => Ok(match entropy {
            EntropyMode::Cavlc => CoeffBlock::Cavlc(CavlcBlock::from_coefficients(address, levels)?),
            EntropyMode::Cabac => CoeffBlock::Cabac(CabacBlock::from_coefficients(address, levels)?),
        }),
    }
}

fn dc_address(params: &ResidualParams, component: Component) -> ResynResult<Option<BlockAddress>> {
    if params.start != 0 || !params.mb_type.is_intra16x16() {
        return Ok(None);
    }
    let category = BlockCategory::for_plane(component, PlaneBlockKind::Dc);
    BlockAddress::new(category, 0, 15, 16).map(Some)
}

/// Intra16x16 AC (15 个系数) 或 4x4 块 (16 个系数)
fn block4x4_address(params: &ResidualParams, component: Component) -> ResynResult<BlockAddress> {
    if params.mb_type.is_intra16x16() {
        if params.end == 0 {
            return Err(ResynError::UnsupportedPath(format!(
                "扫描终点为 0 时 {:?} 平面的 Intra16x16 AC 块为空区间",
                component
            )));
        }
        let category = BlockCategory::for_plane(component, PlaneBlockKind::Ac);
        BlockAddress::new(category, params.start.saturating_sub(1), params.end - 1, 15)
    } else {
        let category = BlockCategory::for_plane(component, PlaneBlockKind::Level4x4);
        BlockAddress::new(category, params.start, params.end, 16)
    }
}

fn level8x8_address(params: &ResidualParams, component: Component) -> ResynResult<BlockAddress> {
    let category = BlockCategory::for_plane(component, PlaneBlockKind::Level8x8);
    BlockAddress::new(category, 4 * params.start, 4 * params.end + 3, 64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h264::context::{ChromaArrayType, MacroblockContext, SliceContext, SliceType};
    use crate::h264::mb_type::MbType;
    use crate::h264::neighbor::{NeighborKind, NeighborMacroblock, NoNeighbors};
    use crate::h264::syntax::{CavlcSyntaxReader, CavlcSyntaxWriter};
    use resyn_core::{BitReader, BitWriter};

    fn params(mb_type: MbType, cbp_luma: u8, transform_8x8: bool) -> ResidualParams {
        ResidualParams {
            mb_type,
            cbp_luma,
            cbp_chroma: 0,
            transform_8x8,
            start: 0,
            end: 15,
        }
    }

    #[test]
    fn test_block_addresses_follow_scan_window() {
        let mut p = params(MbType::P16x16, 1, false);
        p.start = 2;
        p.end = 9;
        assert_eq!(
            block4x4_address(&p, Component::Y).unwrap(),
            BlockAddress::new(BlockCategory::Luma4x4, 2, 9, 16).unwrap()
        );
        assert_eq!(
            level8x8_address(&p, Component::Cb).unwrap(),
            BlockAddress::new(BlockCategory::Cb8x8, 8, 39, 64).unwrap()
        );
        assert!(dc_address(&p, Component::Y).unwrap().is_none(), "非 Intra16x16 没有 DC 块");

        let mut p = params(MbType::from_raw(SliceType::I, 13).unwrap(), 15, false);
        p.start = 0;
        p.end = 0;
        let err = block4x4_address(&p, Component::Y).unwrap_err();
        assert!(matches!(err, ResynError::UnsupportedPath(_)));
        p.end = 15;
        let ac = block4x4_address(&p, Component::Cr).unwrap();
        assert_eq!((ac.category(), ac.start(), ac.end(), ac.max_coeff()), (BlockCategory::CrAc, 0, 14, 15));
    }

    #[test]
    fn test_cavlc_interleaved_8x8_levels() {
        let slice = SliceContext::new(EntropyMode::Cavlc, ChromaArrayType::Yuv420, SliceType::P);
        let mb = MacroblockContext::default();
        let current = NeighborMacroblock::new(NeighborKind::Inter);
        let env = SyntaxEnv::new(&slice, &mb, &NoNeighbors, &current);
        let p = params(MbType::P16x16, 0b0001, true);

        let mut plane = ResidualLuma::new(Component::Y, EntropyMode::Cavlc, true);
        // 第 i4x4 个 4x4 读取承载 8x8 系数 4*i + i4x4
        for sub in 0..4 {
            plane.level4x4[sub][0] = (sub as i32) + 1;
            plane.level4x4[sub][2] = -1;
        }
        let mut bw = BitWriter::new();
        plane
            .encode(&mut CavlcSyntaxWriter::new(&mut bw), &env, &p, BlockIndexCursor::new())
            .unwrap();
        let data = bw.finish();

        let mut br = BitReader::new(&data);
        let (decoded, cursor) =
            ResidualLuma::decode(&mut CavlcSyntaxReader::new(&mut br), &env, &p, Component::Y, BlockIndexCursor::new())
                .unwrap();
        assert_eq!(decoded.level4x4, plane.level4x4);
        assert_eq!(&decoded.level8x8[0][..4], &[1, 2, 3, 4], "8x8 前四个系数来自四次读取的首系数");
        assert_eq!(decoded.level8x8[0][8], -1);
        assert_eq!(cursor.total_coeff(Component::Y, 3), 2);
        assert!(matches!(decoded.blocks, LumaBlocks::Interleaved8x8(_)));
    }

    #[test]
    fn test_encode_rejects_layout_mismatch() {
        let slice = SliceContext::new(EntropyMode::Cavlc, ChromaArrayType::Yuv420, SliceType::P);
        let mb = MacroblockContext::default();
        let current = NeighborMacroblock::new(NeighborKind::Inter);
        let env = SyntaxEnv::new(&slice, &mb, &NoNeighbors, &current);
        let plane = ResidualLuma::new(Component::Y, EntropyMode::Cavlc, false);
        let mut bw = BitWriter::new();
        let err = plane
            .encode(
                &mut CavlcSyntaxWriter::new(&mut bw),
                &env,
                &params(MbType::P16x16, 1, true),
                BlockIndexCursor::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ResynError::InvalidArgument(_)));
    }
}
