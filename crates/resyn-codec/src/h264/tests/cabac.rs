use resyn_core::ResynError;

use super::super::cabac::{Bin, BinTrace};
use super::super::{
    CabacSyntaxWriter, ChromaArrayType, EntropyMode, IntraPredModes, MacroblockContext, MacroblockLayer,
    MacroblockPrediction, MbType, NoNeighbors, PcmSamples, PredDir, PredictionSyntax, SliceType,
    SubMacroblockPrediction, SubMbType,
};
use super::helpers::{build_slice, cabac_roundtrip, empty_residual, random_residual};

/// mb_qp_delta 的上下文 60..=63
fn qp_delta_contexts(trace: &BinTrace) -> Vec<u16> {
    trace
        .bins()
        .iter()
        .filter_map(|b| match b {
            Bin::Decision { ctx_idx, .. } if (60..=63).contains(ctx_idx) => Some(*ctx_idx),
            _ => None,
        })
        .collect()
}

fn inter_layer(mb_type: MbType, prediction: PredictionSyntax) -> MacroblockLayer {
    MacroblockLayer {
        mb_type,
        pcm: None,
        transform_8x8: false,
        cbp_luma: 0,
        cbp_chroma: 0,
        qp_delta: 0,
        prediction: Some(prediction),
        residual: None,
    }
}

#[test]
fn test_i16x16_roundtrip_420() {
    let slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::I);
    let mb = MacroblockContext::default();
    let mb_type = MbType::I16x16 {
        pred_mode: 1,
        cbp_chroma: 2,
        cbp_luma: 15,
    };
    let layer = MacroblockLayer {
        mb_type,
        pcm: None,
        transform_8x8: false,
        cbp_luma: 15,
        cbp_chroma: 2,
        qp_delta: -7,
        prediction: Some(PredictionSyntax::Mb(MacroblockPrediction {
            intra_chroma_pred_mode: Some(3),
            ..Default::default()
        })),
        residual: Some(random_residual(&slice, mb_type, 15, 2, false, 21)),
    };
    let (_, summary, _) = cabac_roundtrip(&layer, &slice, &mb, &NoNeighbors);
    assert_eq!(summary.intra_chroma_pred_mode, 3);
}

#[test]
fn test_i_nxn_4x4_and_8x8_roundtrip() {
    let mut slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::I);
    let mb = MacroblockContext::default();
    let mut modes = [None; 16];
    modes[3] = Some(6);
    modes[9] = Some(0);
    let layer = MacroblockLayer {
        mb_type: MbType::INxN,
        pcm: None,
        transform_8x8: false,
        cbp_luma: 0b0111,
        cbp_chroma: 1,
        qp_delta: 3,
        prediction: Some(PredictionSyntax::Mb(MacroblockPrediction {
            intra_modes: Some(IntraPredModes::Luma4x4(modes)),
            intra_chroma_pred_mode: Some(0),
            ..Default::default()
        })),
        residual: Some(random_residual(&slice, MbType::INxN, 0b0111, 1, false, 22)),
    };
    cabac_roundtrip(&layer, &slice, &mb, &NoNeighbors);

    slice.transform_8x8_mode = true;
    let layer8 = MacroblockLayer {
        transform_8x8: true,
        cbp_luma: 0b1010,
        cbp_chroma: 2,
        prediction: Some(PredictionSyntax::Mb(MacroblockPrediction {
            intra_modes: Some(IntraPredModes::Luma8x8([None, Some(1), None, Some(7)])),
            intra_chroma_pred_mode: Some(2),
            ..Default::default()
        })),
        residual: Some(random_residual(&slice, MbType::INxN, 0b1010, 2, true, 23)),
        ..layer
    };
    let (_, summary, _) = cabac_roundtrip(&layer8, &slice, &mb, &NoNeighbors);
    assert!(summary.transform_8x8);
}

#[test]
fn test_field_macroblock_uses_field_contexts() {
    let mut slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::I);
    slice.transform_8x8_mode = true;
    slice.mbaff_frame = true;
    let layer = MacroblockLayer {
        mb_type: MbType::INxN,
        pcm: None,
        transform_8x8: true,
        cbp_luma: 0b1111,
        cbp_chroma: 0,
        qp_delta: 0,
        prediction: Some(PredictionSyntax::Mb(MacroblockPrediction {
            intra_modes: Some(IntraPredModes::Luma8x8([None; 4])),
            intra_chroma_pred_mode: Some(0),
            ..Default::default()
        })),
        residual: Some(random_residual(&slice, MbType::INxN, 0b1111, 0, true, 24)),
    };
    let (_, frame_summary, frame) = cabac_roundtrip(&layer, &slice, &MacroblockContext::new(false), &NoNeighbors);
    let (_, field_summary, field) = cabac_roundtrip(&layer, &slice, &MacroblockContext::new(true), &NoNeighbors);
    assert_ne!(frame, field, "场宏块的显著性上下文与帧宏块不同");
    assert_eq!(frame.len(), field.len(), "上下文不同但 bin 个数一致");
    assert!(field_summary.field_coded && !frame_summary.field_coded);
}

#[test]
fn test_p16x16_ref_idx_and_late_transform_flag() {
    let mut slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::P);
    slice.transform_8x8_mode = true;
    slice.num_ref_idx_l0_active_minus1 = 4;
    let mb = MacroblockContext::default();
    let layer = MacroblockLayer {
        transform_8x8: true,
        cbp_luma: 0b0011,
        cbp_chroma: 2,
        qp_delta: 25,
        residual: Some(random_residual(&slice, MbType::P16x16, 0b0011, 2, true, 25)),
        ..inter_layer(
            MbType::P16x16,
            PredictionSyntax::Mb(MacroblockPrediction {
                ref_idx: [[Some(3), None], [None, None]],
                mvd: [[Some([-200, 75]), None], [None, None]],
                ..Default::default()
            }),
        )
    };
    let (_, summary, _) = cabac_roundtrip(&layer, &slice, &mb, &NoNeighbors);
    assert_eq!(summary.motion.ref_idx[0], [3; 4]);
    assert_eq!(summary.motion.abs_mvd[0][0], [200, 75]);
}

#[test]
fn test_p16x8_and_p8x8_roundtrip() {
    let mut slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::P);
    slice.num_ref_idx_l0_active_minus1 = 2;
    let mb = MacroblockContext::default();
    let layer = inter_layer(
        MbType::P16x8,
        PredictionSyntax::Mb(MacroblockPrediction {
            ref_idx: [[Some(0), Some(2)], [None, None]],
            mvd: [[Some([0, 0]), Some([12, -3])], [None, None]],
            ..Default::default()
        }),
    );
    let (_, summary, _) = cabac_roundtrip(&layer, &slice, &mb, &NoNeighbors);
    assert_eq!(summary.motion.ref_idx[0], [0, 0, 2, 2]);

    let mut mvd = [[[None; 4]; 4]; 2];
    mvd[0][0][0] = Some([1, 1]);
    mvd[0][1][0] = Some([-4, 0]);
    mvd[0][1][1] = Some([0, 2]);
    mvd[0][2][0] = Some([9, 9]);
    mvd[0][2][1] = Some([-9, -9]);
    for sub in 0..4 {
        mvd[0][3][sub] = Some([sub as i32 * 10, 1]);
    }
    let sub_layer = MacroblockLayer {
        cbp_luma: 0b1000,
        cbp_chroma: 1,
        qp_delta: -1,
        residual: Some(random_residual(&slice, MbType::P8x8, 0b1000, 1, false, 26)),
        ..inter_layer(
            MbType::P8x8,
            PredictionSyntax::Sub(SubMacroblockPrediction {
                sub_mb_type: [SubMbType::P8x8, SubMbType::P8x4, SubMbType::P4x8, SubMbType::P4x4],
                ref_idx: [[Some(1), Some(0), Some(2), Some(1)], [None; 4]],
                mvd,
            }),
        )
    };
    let (_, summary, _) = cabac_roundtrip(&sub_layer, &slice, &mb, &NoNeighbors);
    assert_eq!(summary.motion.ref_idx[0], [1, 0, 2, 1]);
    assert_eq!(summary.motion.abs_mvd[0][15], [30, 1]);
}

#[test]
fn test_p8x8ref0_is_unsupported() {
    let slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::P);
    let mb = MacroblockContext::default();
    let layer = inter_layer(
        MbType::P8x8Ref0,
        PredictionSyntax::Sub(SubMacroblockPrediction {
            sub_mb_type: [SubMbType::P8x8; 4],
            ref_idx: [[None; 4]; 2],
            mvd: [[[Some([0, 0]), None, None, None]; 4], [[None; 4]; 4]],
        }),
    );
    let mut trace = BinTrace::new();
    let err = layer
        .encode(&mut CabacSyntaxWriter::new(&mut trace), &slice, &mb, &NoNeighbors)
        .unwrap_err();
    assert!(matches!(err, ResynError::UnsupportedPath(_)));
}

#[test]
fn test_b_macroblocks_roundtrip() {
    let mut slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::B);
    slice.num_ref_idx_l0_active_minus1 = 1;
    slice.num_ref_idx_l1_active_minus1 = 1;
    slice.transform_8x8_mode = true;
    let mb = MacroblockContext::default();

    let bi = inter_layer(
        MbType::B16x16(PredDir::Bi),
        PredictionSyntax::Mb(MacroblockPrediction {
            ref_idx: [[Some(1), None], [Some(0), None]],
            mvd: [[Some([2, -2]), None], [Some([-30, 0]), None]],
            ..Default::default()
        }),
    );
    let (_, summary, _) = cabac_roundtrip(&bi, &slice, &mb, &NoNeighbors);
    assert_eq!(summary.motion.ref_idx, [[1; 4], [0; 4]]);

    let split = inter_layer(
        MbType::B8x16(PredDir::L1, PredDir::L0),
        PredictionSyntax::Mb(MacroblockPrediction {
            ref_idx: [[None, Some(1)], [Some(1), None]],
            mvd: [[None, Some([0, 5])], [Some([7, 0]), None]],
            ..Default::default()
        }),
    );
    let (_, summary, _) = cabac_roundtrip(&split, &slice, &mb, &NoNeighbors);
    assert_eq!(summary.motion.ref_idx[0], [-1, 1, -1, 1]);
    assert_eq!(summary.motion.ref_idx[1], [1, -1, 1, -1]);

    let direct = MacroblockLayer {
        transform_8x8: true,
        cbp_luma: 0b0101,
        cbp_chroma: 0,
        qp_delta: 2,
        residual: Some(random_residual(&slice, MbType::BDirect16x16, 0b0101, 0, true, 27)),
        ..inter_layer(MbType::BDirect16x16, PredictionSyntax::Mb(MacroblockPrediction::default()))
    };
    cabac_roundtrip(&direct, &slice, &mb, &NoNeighbors);
}

#[test]
fn test_b8x8_with_direct_sub_blocks() {
    let mut slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::B);
    slice.transform_8x8_mode = true;
    slice.direct_8x8_inference = false;
    let mb = MacroblockContext::default();
    let mut mvd = [[[None; 4]; 4]; 2];
    mvd[0][0][0] = Some([1, 2]);
    mvd[0][0][1] = Some([3, 4]);
    mvd[1][2][0] = Some([-5, 0]);
    mvd[1][2][1] = Some([0, -5]);
    mvd[0][3][0] = Some([6, 6]);
    mvd[1][3][0] = Some([-6, -6]);
    let layer = MacroblockLayer {
        cbp_luma: 0b1111,
        cbp_chroma: 2,
        qp_delta: 0,
        residual: Some(random_residual(&slice, MbType::B8x8, 0b1111, 2, false, 28)),
        ..inter_layer(
            MbType::B8x8,
            PredictionSyntax::Sub(SubMacroblockPrediction {
                sub_mb_type: [
                    SubMbType::B8x4(PredDir::L0),
                    SubMbType::BDirect8x8,
                    SubMbType::B4x8(PredDir::L1),
                    SubMbType::B8x8(PredDir::Bi),
                ],
                ref_idx: [[None; 4]; 2],
                mvd,
            }),
        )
    };
    let (_, summary, _) = cabac_roundtrip(&layer, &slice, &mb, &NoNeighbors);
    assert!(!summary.transform_8x8, "存在小于 8x8 的子分区时不出现 8x8 变换标志");
    assert_eq!(summary.motion.ref_idx[0], [0, -1, -1, 0]);
}

#[test]
fn test_pcm_bins() {
    let slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::P);
    let mb = MacroblockContext::default();
    let (luma_count, chroma_count) = PcmSamples::sample_counts(&slice);
    let layer = MacroblockLayer {
        mb_type: MbType::IPcm,
        pcm: Some(PcmSamples {
            luma: (0..luma_count).map(|i| (i % 251) as u16).collect(),
            chroma: vec![128; chroma_count],
        }),
        transform_8x8: false,
        cbp_luma: 0,
        cbp_chroma: 0,
        qp_delta: 0,
        prediction: None,
        residual: None,
    };
    let (_, summary, trace) = cabac_roundtrip(&layer, &slice, &mb, &NoNeighbors);
    let bins = trace.bins();
    let raw = bins.iter().filter(|b| matches!(b, Bin::Raw { bits: 8, .. })).count();
    assert_eq!(raw, luma_count + chroma_count, "每个样本一个 8 位原始值");
    assert_eq!(bins.last(), Some(&Bin::Restart), "样本之后重新初始化引擎");
    let terminate = bins.iter().position(|b| *b == Bin::Terminate(1)).unwrap();
    assert!(matches!(bins[terminate + 1], Bin::Raw { .. }), "终止判决后直接是原始样本");
    assert!(summary.kind.is_pcm());
}

#[test]
fn test_qp_delta_context_follows_previous_macroblock() {
    let slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Monochrome, SliceType::I);
    let layer = MacroblockLayer {
        mb_type: MbType::I16x16 {
            pred_mode: 0,
            cbp_chroma: 0,
            cbp_luma: 0,
        },
        pcm: None,
        transform_8x8: false,
        cbp_luma: 0,
        cbp_chroma: 0,
        qp_delta: 0,
        prediction: Some(PredictionSyntax::Mb(MacroblockPrediction::default())),
        residual: Some(empty_residual(&slice, false)),
    };
    let mut mb = MacroblockContext::default();
    let (_, _, first) = cabac_roundtrip(&layer, &slice, &mb, &NoNeighbors);
    assert_eq!(qp_delta_contexts(&first), vec![60]);

    mb.prev_qp_delta_nonzero = true;
    let (_, _, second) = cabac_roundtrip(&layer, &slice, &mb, &NoNeighbors);
    assert_eq!(qp_delta_contexts(&second), vec![61], "前一宏块 mb_qp_delta 非零时 ctxIdxInc=1");
}

#[test]
fn test_444_8x8_blocks_carry_coded_block_flag() {
    let mut slice = build_slice(EntropyMode::Cabac, ChromaArrayType::Yuv444, SliceType::P);
    slice.transform_8x8_mode = true;
    let mb = MacroblockContext::default();
    let mut residual = empty_residual(&slice, true);
    residual.luma.level8x8[2][5] = -3;
    let layer = MacroblockLayer {
        transform_8x8: true,
        cbp_luma: 0b0101,
        qp_delta: 0,
        residual: Some(residual),
        ..inter_layer(
            MbType::P16x16,
            PredictionSyntax::Mb(MacroblockPrediction {
                mvd: [[Some([0, 1]), None], [None, None]],
                ..Default::default()
            }),
        )
    };
    // 4:4:4 下全零的 8x8 块以 coded_block_flag=0 表示
    let (decoded, _, _) = cabac_roundtrip(&layer, &slice, &mb, &NoNeighbors);
    let residual = decoded.residual.unwrap();
    assert_eq!(residual.luma.level8x8[0], [0; 64]);

    // 4:2:0 下 8x8 块没有 coded_block_flag, 全零块无法表示
    let mut slice420 = slice;
    slice420.chroma_array_type = ChromaArrayType::Yuv420;
    let mut residual420 = empty_residual(&slice420, true);
    residual420.luma.level8x8 = layer.residual.as_ref().unwrap().luma.level8x8;
    let layer420 = MacroblockLayer {
        residual: Some(residual420),
        ..layer
    };
    let mut trace = BinTrace::new();
    let err = layer420
        .encode(&mut CabacSyntaxWriter::new(&mut trace), &slice420, &mb, &NoNeighbors)
        .unwrap_err();
    assert!(matches!(err, ResynError::UnsupportedPath(_)));
}
