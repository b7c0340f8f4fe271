use resyn_core::{BitReader, BitWriter};

use super::super::cabac::BinTrace;
use super::super::{
    AdjacentMacroblocks, CabacSyntaxReader, CabacSyntaxWriter, CavlcSyntaxReader, CavlcSyntaxWriter, ChromaArrayType,
    EntropyMode, IntraPredModes, MacroblockContext, MacroblockLayer, MacroblockPrediction, MbType, NeighborMacroblock,
    NoNeighbors, PcmSamples, PredictionSyntax, SliceContext, SliceType, SyntaxReader, SyntaxWriter,
};
use super::helpers::{Lcg, build_slice, cavlc_roundtrip, random_residual, roundtrip, strip_blocks};

/// 每行宏块数
const MBS_PER_ROW: usize = 4;

fn random_mvd(rng: &mut Lcg) -> [i32; 2] {
    [rng.below(129) as i32 - 64, rng.below(129) as i32 - 64]
}

fn random_layer(slice: &SliceContext, rng: &mut Lcg, seed: u64) -> MacroblockLayer {
    let intra_chroma = match slice.chroma_array_type {
        ChromaArrayType::Yuv420 | ChromaArrayType::Yuv422 => Some(rng.below(4) as u8),
        _ => None,
    };
    // 单色与 4:4:4 没有 CodedBlockPatternChroma
    let chroma_cbp = |rng: &mut Lcg| {
        if slice.chroma_array_type.has_chroma_dc_ac() {
            rng.below(3) as u8
        } else {
            0
        }
    };
    let kind = if slice.slice_type == SliceType::I {
        rng.below(3)
    } else {
        rng.below(6)
    };
    let (mb_type, prediction, cbp_luma, cbp_chroma) = match kind {
        0 => {
            let cbp_luma = if rng.below(2) == 0 { 0 } else { 15 };
            let cbp_chroma = chroma_cbp(rng);
            let mb_type = MbType::I16x16 {
                pred_mode: rng.below(4) as u8,
                cbp_chroma,
                cbp_luma,
            };
            let pred = MacroblockPrediction {
                intra_chroma_pred_mode: intra_chroma,
                ..Default::default()
            };
            (mb_type, PredictionSyntax::Mb(pred), cbp_luma, cbp_chroma)
        }
        1 => {
            let modes = std::array::from_fn(|_| {
                if rng.below(2) == 0 {
                    None
                } else {
                    Some(rng.below(8) as u8)
                }
            });
            let pred = MacroblockPrediction {
                intra_modes: Some(IntraPredModes::Luma4x4(modes)),
                intra_chroma_pred_mode: intra_chroma,
                ..Default::default()
            };
            (MbType::INxN, PredictionSyntax::Mb(pred), rng.below(16) as u8, chroma_cbp(rng))
        }
        2 => {
            // I_PCM 单独处理
            (MbType::IPcm, PredictionSyntax::Mb(MacroblockPrediction::default()), 0, 0)
        }
        3 => {
            let pred = MacroblockPrediction {
                mvd: [[Some(random_mvd(rng)), None], [None, None]],
                ..Default::default()
            };
            (MbType::P16x16, PredictionSyntax::Mb(pred), rng.below(16) as u8, chroma_cbp(rng))
        }
        4 => {
            let pred = MacroblockPrediction {
                mvd: [[Some(random_mvd(rng)), Some(random_mvd(rng))], [None, None]],
                ..Default::default()
            };
            (MbType::P16x8, PredictionSyntax::Mb(pred), rng.below(16) as u8, chroma_cbp(rng))
        }
        _ => {
            let pred = MacroblockPrediction {
                mvd: [[Some(random_mvd(rng)), Some(random_mvd(rng))], [None, None]],
                ..Default::default()
            };
            (MbType::P8x16, PredictionSyntax::Mb(pred), 0, 0)
        }
    };

    if mb_type.is_pcm() {
        let (luma_count, chroma_count) = PcmSamples::sample_counts(slice);
        return MacroblockLayer {
            mb_type,
            pcm: Some(PcmSamples {
                luma: (0..luma_count).map(|_| rng.below(256) as u16).collect(),
                chroma: (0..chroma_count).map(|_| rng.below(256) as u16).collect(),
            }),
            transform_8x8: false,
            cbp_luma: 0,
            cbp_chroma: 0,
            qp_delta: 0,
            prediction: None,
            residual: None,
        };
    }

    let coded = cbp_luma != 0 || cbp_chroma != 0 || mb_type.is_intra16x16();
    MacroblockLayer {
        mb_type,
        pcm: None,
        transform_8x8: false,
        cbp_luma,
        cbp_chroma,
        qp_delta: if coded { rng.below(52) as i32 - 26 } else { 0 },
        prediction: Some(prediction),
        residual: coded.then(|| random_residual(slice, mb_type, cbp_luma, cbp_chroma, false, seed)),
    }
}

fn neighbours(summaries: &[NeighborMacroblock]) -> AdjacentMacroblocks {
    let addr = summaries.len();
    let left = (addr % MBS_PER_ROW != 0).then(|| summaries[addr - 1]);
    let above = addr.checked_sub(MBS_PER_ROW).map(|a| summaries[a]);
    AdjacentMacroblocks::new(left, above)
}

/// 依次编码一组宏块, 每个宏块以已编码宏块的摘要作为邻居
fn encode_sequence<W: SyntaxWriter + ?Sized>(
    writer: &mut W,
    slice: &SliceContext,
    layers: &[MacroblockLayer],
) -> Vec<NeighborMacroblock> {
    let mut summaries = Vec::with_capacity(layers.len());
    let mut mb = MacroblockContext::default();
    for layer in layers {
        let summary = layer.encode(writer, slice, &mb, &neighbours(&summaries)).unwrap();
        mb.prev_qp_delta_nonzero = layer.qp_delta_nonzero();
        summaries.push(summary);
    }
    summaries
}

fn decode_sequence<R: SyntaxReader + ?Sized>(
    reader: &mut R,
    slice: &SliceContext,
    count: usize,
) -> (Vec<MacroblockLayer>, Vec<NeighborMacroblock>) {
    let mut layers = Vec::with_capacity(count);
    let mut summaries = Vec::with_capacity(count);
    let mut mb = MacroblockContext::default();
    for _ in 0..count {
        let (layer, summary) = MacroblockLayer::decode(reader, slice, &mb, &neighbours(&summaries)).unwrap();
        mb.prev_qp_delta_nonzero = layer.qp_delta_nonzero();
        layers.push(layer);
        summaries.push(summary);
    }
    (layers, summaries)
}

fn check_sequence(slice: &SliceContext, seed: u64, count: usize) {
    let mut rng = Lcg::new(seed);
    let layers: Vec<MacroblockLayer> = (0..count)
        .map(|i| random_layer(slice, &mut rng, seed * 100 + i as u64))
        .collect();

    match slice.entropy {
        EntropyMode::Cavlc => {
            let mut bw = BitWriter::new();
            let encoded = encode_sequence(&mut CavlcSyntaxWriter::new(&mut bw), slice, &layers);
            let total = bw.bits_written();
            let data = bw.finish();
            let mut br = BitReader::new(&data);
            let (decoded, summaries) = decode_sequence(&mut CavlcSyntaxReader::new(&mut br), slice, count);
            assert_eq!(br.bits_read(), total, "种子 {}: 应恰好消费全部比特", seed);
            assert_eq!(summaries, encoded, "种子 {}: 宏块摘要应一致", seed);
            for (d, l) in decoded.iter().zip(&layers) {
                assert_eq!(&strip_blocks(d), l, "种子 {}: 宏块语法应一致", seed);
            }
        }
        EntropyMode::Cabac => {
            let mut trace = BinTrace::new();
            let encoded = encode_sequence(&mut CabacSyntaxWriter::new(&mut trace), slice, &layers);
            let mut replay = trace.replay();
            let (decoded, summaries) = decode_sequence(&mut CabacSyntaxReader::new(&mut replay), slice, count);
            assert!(replay.is_finished(), "种子 {}: 应恰好消费全部 bin", seed);
            assert_eq!(summaries, encoded, "种子 {}: 宏块摘要应一致", seed);
            for (d, l) in decoded.iter().zip(&layers) {
                assert_eq!(&strip_blocks(d), l, "种子 {}: 宏块语法应一致", seed);
            }
        }
    }
}

#[test]
fn test_cavlc_macroblock_sequences() {
    for chroma in [ChromaArrayType::Monochrome, ChromaArrayType::Yuv420, ChromaArrayType::Yuv422, ChromaArrayType::Yuv444] {
        for slice_type in [SliceType::I, SliceType::P] {
            let slice = build_slice(EntropyMode::Cavlc, chroma, slice_type);
            for seed in 0..6 {
                check_sequence(&slice, seed, 8);
            }
        }
    }
}

#[test]
fn test_cabac_macroblock_sequences() {
    for chroma in [ChromaArrayType::Monochrome, ChromaArrayType::Yuv420, ChromaArrayType::Yuv422, ChromaArrayType::Yuv444] {
        for slice_type in [SliceType::I, SliceType::P] {
            let slice = build_slice(EntropyMode::Cabac, chroma, slice_type);
            for seed in 0..6 {
                check_sequence(&slice, seed, 8);
            }
        }
    }
}

#[test]
fn test_neighbour_totals_select_coeff_token_table() {
    let slice = build_slice(EntropyMode::Cavlc, ChromaArrayType::Monochrome, SliceType::I);
    let mb = MacroblockContext::default();
    let mut residual = random_residual(&slice, MbType::INxN, 0b0001, 0, false, 31);
    residual.luma.level4x4[0] = [3, 0, -1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    let layer = MacroblockLayer {
        mb_type: MbType::INxN,
        pcm: None,
        transform_8x8: false,
        cbp_luma: 0b0001,
        cbp_chroma: 0,
        qp_delta: 0,
        prediction: Some(PredictionSyntax::Mb(MacroblockPrediction {
            intra_modes: Some(IntraPredModes::Luma4x4([None; 16])),
            ..Default::default()
        })),
        residual: Some(residual),
    };

    let (_, alone, isolated) = cavlc_roundtrip(&layer, &slice, &mb, &NoNeighbors);
    let pcm = AdjacentMacroblocks::new(Some(NeighborMacroblock::pcm()), Some(NeighborMacroblock::pcm()));
    let (_, beside, with_pcm) = cavlc_roundtrip(&layer, &slice, &mb, &pcm);
    assert_ne!(isolated, with_pcm, "PCM 邻居使 nC=16, coeff_token 码表不同");
    assert_eq!(alone.blocks, beside.blocks, "块状态只取决于当前宏块的系数");
}

#[test]
fn test_skip_neighbour_counts_as_empty() {
    let slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::P);
    let mb = MacroblockContext::default();
    let layer = MacroblockLayer {
        mb_type: MbType::P16x16,
        pcm: None,
        transform_8x8: false,
        cbp_luma: 0b1111,
        cbp_chroma: 2,
        qp_delta: 0,
        prediction: Some(PredictionSyntax::Mb(MacroblockPrediction {
            mvd: [[Some([4, 4]), None], [None, None]],
            ..Default::default()
        })),
        residual: Some(random_residual(&slice, MbType::P16x16, 0b1111, 2, false, 32)),
    };
    let skip = AdjacentMacroblocks::new(Some(NeighborMacroblock::skip()), Some(NeighborMacroblock::skip()));
    let (decoded, summary) = roundtrip(&layer, &slice, &mb, &skip);
    assert_eq!(summary.cbp_luma, 0b1111);
    assert_eq!(strip_blocks(&decoded), layer);
}
