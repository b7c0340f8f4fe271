use resyn_core::{BitReader, BitWriter};

use super::super::cabac::BinTrace;
use super::super::{
    ChromaArrayType, ChromaResidual, Component, EntropyMode, LumaBlocks, MacroblockContext, MacroblockLayer, MbType,
    NeighborMacroblock, NeighborSource, Residual, ResidualLuma, SliceContext, SliceType,
};
use super::super::{CabacSyntaxReader, CabacSyntaxWriter, CavlcSyntaxReader, CavlcSyntaxWriter};

/// 由 "0101..." 形式的比特串构造字节流, 末尾补零
pub fn bits(pattern: &str) -> Vec<u8> {
    let mut bw = BitWriter::new();
    for c in pattern.chars().filter(|c| !c.is_whitespace()) {
        bw.write_bit(u32::from(c == '1'));
    }
    bw.finish()
}

/// 测试日志, 通过 RUST_LOG 查看块级 trace
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn build_slice(entropy: EntropyMode, chroma: ChromaArrayType, slice_type: SliceType) -> SliceContext {
    SliceContext::new(entropy, chroma, slice_type)
}

/// 确定性的伪随机序列
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed ^ 0x9E37_79B9_7F4A_7C15)
    }

    pub fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }

    pub fn below(&mut self, n: u32) -> u32 {
        self.next() % n
    }

    /// 稀疏系数: 约四分之一非零, 偶尔出现大幅值
    pub fn level(&mut self) -> i32 {
        if self.below(4) != 0 {
            return 0;
        }
        let magnitude = match self.below(8) {
            0 => 20 + self.below(300) as i32,
            1 | 2 => 2 + self.below(6) as i32,
            _ => 1,
        };
        if self.below(2) == 0 { magnitude } else { -magnitude }
    }

    pub fn fill(&mut self, levels: &mut [i32]) {
        for level in levels.iter_mut() {
            *level = self.level();
        }
    }
}

/// 全零残差, 结构与片的熵编码模式、色度格式一致
pub fn empty_residual(slice: &SliceContext, transform_8x8: bool) -> Residual {
    let entropy = slice.entropy;
    let chroma = match slice.chroma_array_type {
        ChromaArrayType::Monochrome => ChromaResidual::None,
        ChromaArrayType::Yuv444 => ChromaResidual::Planes {
            cb: Box::new(ResidualLuma::new(Component::Cb, entropy, transform_8x8)),
            cr: Box::new(ResidualLuma::new(Component::Cr, entropy, transform_8x8)),
        },
        _ => ChromaResidual::DcAc {
            dc: [None, None],
            ac: std::array::from_fn(|_| std::array::from_fn(|_| None)),
            dc_level: [[0; 8]; 2],
            ac_level: [[[0; 15]; 8]; 2],
        },
    };
    Residual {
        luma: ResidualLuma::new(Component::Y, entropy, transform_8x8),
        chroma,
    }
}

/// 按 cbp 填充一个平面的系数; 只写入会被传输的位置
pub fn fill_plane(plane: &mut ResidualLuma, mb_type: MbType, cbp_luma: u8, rng: &mut Lcg) {
    if mb_type.is_intra16x16() {
        rng.fill(&mut plane.dc_level);
    }
    for blk8 in 0..4 {
        if cbp_luma & (1 << blk8) == 0 {
            continue;
        }
        match plane.blocks {
            LumaBlocks::Blocks8x8(_) => {
                let levels = &mut plane.level8x8[blk8];
                rng.fill(levels);
                // 4:2:0 下 8x8 块不传 coded_block_flag, 必须含非零系数
                if levels.iter().all(|&l| l == 0) {
                    levels[0] = 1 + rng.below(5) as i32;
                }
            }
            LumaBlocks::Blocks4x4(_) | LumaBlocks::Interleaved8x8(_) => {
                for sub in 0..4 {
                    let levels = &mut plane.level4x4[blk8 * 4 + sub];
                    let len = if mb_type.is_intra16x16() { 15 } else { 16 };
                    rng.fill(&mut levels[..len]);
                }
            }
        }
    }
    if matches!(plane.blocks, LumaBlocks::Interleaved8x8(_)) {
        interleave(plane);
    }
}

/// CAVLC 8x8 变换: 由 4 个交织的 4x4 读取组装 8x8 系数
pub fn interleave(plane: &mut ResidualLuma) {
    for blk8 in 0..4 {
        for sub in 0..4 {
            for i in 0..16 {
                plane.level8x8[blk8][4 * i + sub] = plane.level4x4[blk8 * 4 + sub][i];
            }
        }
    }
}

/// 按 cbp 构造整个宏块的残差
pub fn random_residual(slice: &SliceContext, mb_type: MbType, cbp_luma: u8, cbp_chroma: u8, t8: bool, seed: u64) -> Residual {
    let mut rng = Lcg::new(seed);
    let mut residual = empty_residual(slice, t8);
    fill_plane(&mut residual.luma, mb_type, cbp_luma, &mut rng);
    match &mut residual.chroma {
        ChromaResidual::None => {}
        ChromaResidual::Planes { cb, cr } => {
            fill_plane(cb, mb_type, cbp_luma, &mut rng);
            fill_plane(cr, mb_type, cbp_luma, &mut rng);
        }
        ChromaResidual::DcAc { dc_level, ac_level, .. } => {
            let num_blocks = 4 * slice.chroma_array_type.num_c8x8();
            for i in 0..2 {
                if cbp_chroma & 3 != 0 {
                    rng.fill(&mut dc_level[i][..num_blocks]);
                }
                if cbp_chroma & 2 != 0 {
                    for blk in ac_level[i].iter_mut().take(num_blocks) {
                        rng.fill(blk);
                    }
                }
            }
        }
    }
    residual
}

fn strip_plane(plane: &mut ResidualLuma) {
    plane.dc = None;
    match &mut plane.blocks {
        LumaBlocks::Blocks4x4(blocks) | LumaBlocks::Interleaved8x8(blocks) => blocks.iter_mut().for_each(|b| *b = None),
        LumaBlocks::Blocks8x8(blocks) => blocks.iter_mut().for_each(|b| *b = None),
    }
}

/// 去掉解码保留的块语法, 只留系数, 以便与手工构造的宏块比较
pub fn strip_blocks(layer: &MacroblockLayer) -> MacroblockLayer {
    let mut layer = layer.clone();
    if let Some(residual) = layer.residual.as_mut() {
        strip_plane(&mut residual.luma);
        match &mut residual.chroma {
            ChromaResidual::None => {}
            ChromaResidual::Planes { cb, cr } => {
                strip_plane(cb);
                strip_plane(cr);
            }
            ChromaResidual::DcAc { dc, ac, .. } => {
                *dc = [None, None];
                for row in ac.iter_mut() {
                    row.iter_mut().for_each(|b| *b = None);
                }
            }
        }
    }
    layer
}

/// CAVLC 编码 -> 解码 -> 再编码, 返回解码结果、宏块摘要与比特串
pub fn cavlc_roundtrip(
    layer: &MacroblockLayer,
    slice: &SliceContext,
    mb: &MacroblockContext,
    neighbors: &dyn NeighborSource,
) -> (MacroblockLayer, NeighborMacroblock, String) {
    init_logger();
    let mut bw = BitWriter::new();
    let encoded = layer
        .encode(&mut CavlcSyntaxWriter::new(&mut bw), slice, mb, neighbors)
        .unwrap();
    let bit_string = bw.to_bit_string();
    let data = bw.finish();

    let mut br = BitReader::new(&data);
    let (decoded, summary) =
        MacroblockLayer::decode(&mut CavlcSyntaxReader::new(&mut br), slice, mb, neighbors).unwrap();
    assert_eq!(br.bits_read(), bit_string.len(), "解码应恰好消费编码写出的比特");
    assert_eq!(summary, encoded, "编解码两端的宏块摘要应一致");
    assert_eq!(&strip_blocks(&decoded), layer, "解码出的语法值应与输入一致");

    let mut again = BitWriter::new();
    decoded
        .encode(&mut CavlcSyntaxWriter::new(&mut again), slice, mb, neighbors)
        .unwrap();
    assert_eq!(again.to_bit_string(), bit_string, "解码结果重新编码应逐比特一致");
    (decoded, summary, bit_string)
}

/// CABAC 编码 -> 回放解码 -> 再编码, 返回解码结果、宏块摘要与 bin 记录
pub fn cabac_roundtrip(
    layer: &MacroblockLayer,
    slice: &SliceContext,
    mb: &MacroblockContext,
    neighbors: &dyn NeighborSource,
) -> (MacroblockLayer, NeighborMacroblock, BinTrace) {
    init_logger();
    let mut trace = BinTrace::new();
    let encoded = layer
        .encode(&mut CabacSyntaxWriter::new(&mut trace), slice, mb, neighbors)
        .unwrap();

    let mut replay = trace.replay();
    let (decoded, summary) =
        MacroblockLayer::decode(&mut CabacSyntaxReader::new(&mut replay), slice, mb, neighbors).unwrap();
    assert!(replay.is_finished(), "解码应恰好消费全部 bin");
    assert_eq!(summary, encoded, "编解码两端的宏块摘要应一致");
    assert_eq!(&strip_blocks(&decoded), layer, "解码出的语法值应与输入一致");

    let mut again = BinTrace::new();
    decoded
        .encode(&mut CabacSyntaxWriter::new(&mut again), slice, mb, neighbors)
        .unwrap();
    assert_eq!(again, trace, "解码结果重新编码应得到相同的 bin 序列");
    (decoded, summary, trace)
}

/// 按片的熵编码模式选择往返路径, 返回解码结果与宏块摘要
pub fn roundtrip(
    layer: &MacroblockLayer,
    slice: &SliceContext,
    mb: &MacroblockContext,
    neighbors: &dyn NeighborSource,
) -> (MacroblockLayer, NeighborMacroblock) {
    match slice.entropy {
        EntropyMode::Cavlc => {
            let (decoded, summary, _) = cavlc_roundtrip(layer, slice, mb, neighbors);
            (decoded, summary)
        }
        EntropyMode::Cabac => {
            let (decoded, summary, _) = cabac_roundtrip(layer, slice, mb, neighbors);
            (decoded, summary)
        }
    }
}
