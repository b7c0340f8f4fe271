//! resyn 残差语法性能基准测试.
//!
//! 覆盖 Exp-Golomb、CAVLC 残差块与 CABAC (bin 记录引擎) 宏块层的编解码路径.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use resyn::codec::h264::cabac::BinTrace;
use resyn::codec::h264::{
    BlockAddress, BlockCategory, CabacSyntaxReader, CabacSyntaxWriter, CavlcBlock, CavlcSyntaxReader,
    CavlcSyntaxWriter, ChromaArrayType, ChromaResidual, Component, EntropyMode, MacroblockContext, MacroblockLayer,
    MacroblockPrediction, MbType, NoNeighbors, PredictionSyntax, Residual, ResidualLuma, SliceContext, SliceType,
    exp_golomb,
};
use resyn::core::{BitReader, BitWriter};

/// 构造一个残差密集的 P16x16 宏块
fn make_dense_layer(entropy: EntropyMode) -> MacroblockLayer {
    let mut luma = ResidualLuma::new(Component::Y, entropy, false);
    for (blk, block) in luma.level4x4.iter_mut().enumerate() {
        for (i, level) in block.iter_mut().enumerate() {
            *level = match (blk + i) % 5 {
                0 => 1,
                1 => -2,
                2 => (i as i32) * 3 - 20,
                _ => 0,
            };
        }
    }
    let mut ac_level = [[[0i32; 15]; 8]; 2];
    for component in ac_level.iter_mut() {
        for block in component.iter_mut().take(4) {
            block[0] = 2;
            block[3] = -1;
        }
    }
    MacroblockLayer {
        mb_type: MbType::P16x16,
        pcm: None,
        transform_8x8: false,
        cbp_luma: 15,
        cbp_chroma: 2,
        qp_delta: -2,
        prediction: Some(PredictionSyntax::Mb(MacroblockPrediction {
            mvd: [[Some([12, -7]), None], [None, None]],
            ..Default::default()
        })),
        residual: Some(Residual {
            luma,
            chroma: ChromaResidual::DcAc {
                dc: [None, None],
                ac: std::array::from_fn(|_| std::array::from_fn(|_| None)),
                dc_level: [[3, -1, 0, 1, 0, 0, 0, 0]; 2],
                ac_level,
            },
        }),
    }
}

fn bench_exp_golomb(c: &mut Criterion) {
    c.bench_function("exp_golomb_ue_4096", |b| {
        let mut bw = BitWriter::new();
        for v in 0..4096u32 {
            exp_golomb::write_ue(&mut bw, v);
        }
        let data = bw.finish();
        b.iter(|| {
            let mut br = BitReader::new(black_box(&data));
            let mut sum = 0u64;
            for _ in 0..4096 {
                sum += u64::from(exp_golomb::read_ue(&mut br).unwrap());
            }
            sum
        });
    });
}

fn bench_cavlc_block(c: &mut Criterion) {
    let address = BlockAddress::new(BlockCategory::Luma4x4, 0, 15, 16).unwrap();
    let coeffs = [7, -3, 2, 1, 0, -1, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0];
    let block = CavlcBlock::from_coefficients(address, &coeffs).unwrap();

    c.bench_function("cavlc_block_encode", |b| {
        b.iter(|| {
            let mut bw = BitWriter::new();
            black_box(&block).encode(&mut bw, 2).unwrap();
            bw.finish()
        });
    });

    let mut bw = BitWriter::new();
    block.encode(&mut bw, 2).unwrap();
    let data = bw.finish();
    c.bench_function("cavlc_block_decode", |b| {
        b.iter(|| {
            let mut br = BitReader::new(black_box(&data));
            CavlcBlock::decode(&mut br, address, 2).unwrap()
        });
    });
}

fn bench_cavlc_macroblock(c: &mut Criterion) {
    let slice = SliceContext::new(EntropyMode::Cavlc, ChromaArrayType::Yuv420, SliceType::P);
    let mb = MacroblockContext::default();
    let layer = make_dense_layer(EntropyMode::Cavlc);
    let mut bw = BitWriter::new();
    layer
        .encode(&mut CavlcSyntaxWriter::new(&mut bw), &slice, &mb, &NoNeighbors)
        .unwrap();
    let data = bw.finish();

    c.bench_function("cavlc_macroblock_decode_p16x16", |b| {
        b.iter(|| {
            let mut br = BitReader::new(black_box(&data));
            MacroblockLayer::decode(&mut CavlcSyntaxReader::new(&mut br), &slice, &mb, &NoNeighbors).unwrap()
        });
    });
}

fn bench_cabac_macroblock(c: &mut Criterion) {
    let slice = SliceContext::new(EntropyMode::Cabac, ChromaArrayType::Yuv420, SliceType::P);
    let mb = MacroblockContext::default();
    let layer = make_dense_layer(EntropyMode::Cabac);

    c.bench_function("cabac_macroblock_encode_p16x16", |b| {
        b.iter(|| {
            let mut trace = BinTrace::new();
            black_box(&layer)
                .encode(&mut CabacSyntaxWriter::new(&mut trace), &slice, &mb, &NoNeighbors)
                .unwrap();
            trace
        });
    });

    let mut trace = BinTrace::new();
    layer
        .encode(&mut CabacSyntaxWriter::new(&mut trace), &slice, &mb, &NoNeighbors)
        .unwrap();
    c.bench_function("cabac_macroblock_decode_p16x16", |b| {
        b.iter(|| {
            let mut replay = black_box(&trace).replay();
            MacroblockLayer::decode(&mut CabacSyntaxReader::new(&mut replay), &slice, &mb, &NoNeighbors).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_exp_golomb,
    bench_cavlc_block,
    bench_cavlc_macroblock,
    bench_cabac_macroblock,
);
criterion_main!(benches);
