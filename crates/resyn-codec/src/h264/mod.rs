//! H.264/AVC 残差与宏块层语法编解码.
//!
//! 覆盖 CAVLC 与 CABAC 两种熵编码下的宏块层语法, 解码结果保留全部语法值,
//! 编码端据此重建出与输入逐比特一致的码流.
//!
//! CABAC 算术引擎、参数集与片头解析由调用方提供, 分别经由
//! [`cabac::CabacDecoder`] / [`cabac::CabacEncoder`] 与 [`context`] 中的结构传入.

pub mod block;
pub mod cabac;
pub mod cavlc;
pub mod context;
pub mod exp_golomb;
pub mod macroblock;
pub mod mb_type;
pub mod neighbor;
pub mod prediction;
pub mod residual;
pub mod residual_luma;
pub mod scaling;
pub mod syntax;

pub use block::{
    BlockAddress, BlockCategory, BlockIndexCursor, BlockLocation, CoeffArray, Component, PlaneBlockKind,
};
pub use cabac::{CabacBlock, CabacDecoder, CabacEncoder};
pub use cavlc::CavlcBlock;
pub use context::{ChromaArrayType, EntropyMode, MacroblockContext, SliceContext, SliceType};
pub use macroblock::{MacroblockLayer, PcmSamples};
pub use mb_type::{MbType, PartPredMode, PredDir, SubMbType};
pub use neighbor::{AdjacentMacroblocks, MotionSummary, NeighborKind, NeighborMacroblock, NeighborSource, NoNeighbors};
pub use prediction::{IntraPredModes, MacroblockPrediction, PredictionSyntax, SubMacroblockPrediction};
pub use residual::{ChromaResidual, Residual, ResidualParams};
pub use residual_luma::{LumaBlocks, ResidualLuma};
pub use scaling::{ScalingList, ScalingMatrices};
pub use syntax::{
    CabacSyntaxReader, CabacSyntaxWriter, CavlcSyntaxReader, CavlcSyntaxWriter, CoeffBlock, SyntaxEnv, SyntaxReader,
    SyntaxWriter,
};
