//! 相邻宏块快照.
//!
//! 上下文推导 (CAVLC nC, CABAC ctxIdxInc) 需要左侧 (A) 与上方 (B) 宏块的少量信息.
//! 这些信息由调用方在解码前准备好, 以 [`NeighborSource`] 的形式只读传入;
//! MBAFF 下的帧/场邻居替换也由调用方完成.

use super::block::BlockIndexCursor;

/// 宏块种类 (上下文推导所需的分类)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeighborKind {
    /// P_Skip / B_Skip
    Skip,
    /// I_PCM
    Pcm,
    /// I_NxN (Intra_4x4 或 Intra_8x8)
    IntraNxN,
    /// Intra_16x16
    Intra16x16,
    /// SI
    Si,
    /// B_Direct_16x16
    Direct16x16,
    /// 其他帧间宏块
    Inter,
}

impl NeighborKind {
    pub fn is_intra(self) -> bool {
        matches!(self, Self::Pcm | Self::IntraNxN | Self::Intra16x16 | Self::Si)
    }

    pub fn is_skip(self) -> bool {
        self == Self::Skip
    }

    pub fn is_pcm(self) -> bool {
        self == Self::Pcm
    }
}

/// 帧间运动摘要: ref_idx 与 mvd 绝对值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotionSummary {
    /// `[列表][8x8 分区]`, 未使用该列表或直接预测的分区为 -1
    pub ref_idx: [[i8; 4]; 2],
    /// `[列表][luma4x4BlkIdx][分量]`, 未传输 mvd 的块为 0
    pub abs_mvd: [[[u16; 2]; 16]; 2],
}

impl Default for MotionSummary {
    fn default() -> Self {
        Self {
            ref_idx: [[-1; 4]; 2],
            abs_mvd: [[[0; 2]; 16]; 2],
        }
    }
}

/// 一个宏块的上下文摘要
///
/// 既描述已解码的相邻宏块, 也描述解码过程中的当前宏块.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NeighborMacroblock {
    pub kind: NeighborKind,
    /// mb_field_decoding_flag
    pub field_coded: bool,
    pub cbp_luma: u8,
    pub cbp_chroma: u8,
    pub transform_8x8: bool,
    pub intra_chroma_pred_mode: u8,
    /// 残差块状态 (TotalCoeff, coded_block_flag)
    pub blocks: BlockIndexCursor,
    pub motion: MotionSummary,
}

impl NeighborMacroblock {
    /// 无残差、无运动信息的宏块
    pub fn new(kind: NeighborKind) -> Self {
        let blocks = if kind.is_pcm() {
            BlockIndexCursor::pcm()
        } else {
            BlockIndexCursor::new()
        };
        Self {
            kind,
            field_coded: false,
            cbp_luma: 0,
            cbp_chroma: 0,
            transform_8x8: false,
            intra_chroma_pred_mode: 0,
            blocks,
            motion: MotionSummary::default(),
        }
    }

    /// P_Skip / B_Skip 宏块
    pub fn skip() -> Self {
        Self::new(NeighborKind::Skip)
    }

    /// I_PCM 宏块
    pub fn pcm() -> Self {
        let mut mb = Self::new(NeighborKind::Pcm);
        mb.cbp_luma = 0x0F;
        mb.cbp_chroma = 2;
        mb
    }

    /// 按场编码
    #[must_use]
    pub fn with_field(mut self, field_coded: bool) -> Self {
        self.field_coded = field_coded;
        self
    }

    /// 残差是否可能存在于该 8x8 组 (非 skip, 非 PCM, cbp 对应位置位)
    pub fn has_luma_residual(&self, blk8_idx: usize) -> bool {
        !self.kind.is_skip() && !self.kind.is_pcm() && self.cbp_luma & (1 << (blk8_idx & 3)) != 0
    }
}

/// 相邻宏块来源
pub trait NeighborSource {
    /// mbAddrA (左), 不可用时为 None
    fn left(&self) -> Option<&NeighborMacroblock>;
    /// mbAddrB (上), 不可用时为 None
    fn above(&self) -> Option<&NeighborMacroblock>;
}

/// 没有任何可用邻居 (图像/片左上角)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNeighbors;

impl NeighborSource for NoNeighbors {
    fn left(&self) -> Option<&NeighborMacroblock> {
        None
    }

    fn above(&self) -> Option<&NeighborMacroblock> {
        None
    }
}

/// 以值持有左/上邻居
#[derive(Debug, Clone, Copy, Default)]
pub struct AdjacentMacroblocks {
    pub left: Option<NeighborMacroblock>,
    pub above: Option<NeighborMacroblock>,
}

impl AdjacentMacroblocks {
    pub fn new(left: Option<NeighborMacroblock>, above: Option<NeighborMacroblock>) -> Self {
        Self { left, above }
    }
}

impl NeighborSource for AdjacentMacroblocks {
    fn left(&self) -> Option<&NeighborMacroblock> {
        self.left.as_ref()
    }

    fn above(&self) -> Option<&NeighborMacroblock> {
        self.above.as_ref()
    }
}

// ============================================================
// 块级邻居定位
// ============================================================

/// 邻居块: 所在宏块与其中的块坐标
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockNeighbor<'a> {
    pub mb: &'a NeighborMacroblock,
    pub x: usize,
    pub y: usize,
    /// 是否位于当前宏块内
    pub in_current: bool,
}

/// 左侧邻居块 (A); `grid_w` 为宏块内块网格宽度
pub(crate) fn left_block<'a>(
    current: &'a NeighborMacroblock,
    neighbors: &'a dyn NeighborSource,
    x: usize,
    y: usize,
    grid_w: usize,
) -> Option<BlockNeighbor<'a>> {
    if x > 0 {
        return Some(BlockNeighbor {
            mb: current,
            x: x - 1,
            y,
            in_current: true,
        });
    }
    neighbors.left().map(|mb| BlockNeighbor {
        mb,
        x: grid_w - 1,
        y,
        in_current: false,
    })
}

/// 上方邻居块 (B); `grid_h` 为宏块内块网格高度
pub(crate) fn above_block<'a>(
    current: &'a NeighborMacroblock,
    neighbors: &'a dyn NeighborSource,
    x: usize,
    y: usize,
    grid_h: usize,
) -> Option<BlockNeighbor<'a>> {
    if y > 0 {
        return Some(BlockNeighbor {
            mb: current,
            x,
            y: y - 1,
            in_current: true,
        });
    }
    neighbors.above().map(|mb| BlockNeighbor {
        mb,
        x,
        y: grid_h - 1,
        in_current: false,
    })
}
