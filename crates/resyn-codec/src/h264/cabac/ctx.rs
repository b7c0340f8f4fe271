//! CABAC 残差上下文索引表.

use crate::h264::block::BlockCategory;

/// ctxIdxOffset: coded_block_flag
fn cbf_offset(cat: usize) -> usize {
    match cat {
        0..=4 => 85,
        5 | 9 | 13 => 1012,
        6..=8 => 460,
        _ => 472,
    }
}

/// ctxIdxOffset: significant_coeff_flag, `[帧, 场]`
fn significant_offset(cat: usize, field: bool) -> usize {
    let (frame, fld) = match cat {
        0..=4 => (105, 277),
        5 => (402, 436),
        6..=8 => (484, 776),
        9 => (660, 675),
        10..=12 => (528, 820),
        _ => (718, 733),
    };
    if field { fld } else { frame }
}

/// ctxIdxOffset: last_significant_coeff_flag
fn last_offset(cat: usize, field: bool) -> usize {
    let (frame, fld) = match cat {
        0..=4 => (166, 338),
        5 => (417, 451),
        6..=8 => (572, 864),
        9 => (690, 699),
        10..=12 => (616, 908),
        _ => (748, 757),
    };
    if field { fld } else { frame }
}

/// ctxIdxOffset: coeff_abs_level_minus1
fn abs_level_offset(cat: usize) -> usize {
    match cat {
        0..=4 => 227,
        5 => 426,
        6..=8 => 952,
        9 => 708,
        10..=12 => 982,
        _ => 766,
    }
}

/// ctxBlockCatOffset, 按 ctxBlockCat 0..13
const CBF_CAT_OFFSET: [usize; 14] = [0, 4, 8, 12, 16, 0, 0, 4, 8, 4, 0, 4, 8, 8];
const SIG_CAT_OFFSET: [usize; 14] = [0, 15, 29, 44, 47, 0, 0, 15, 29, 0, 0, 15, 29, 0];
const ABS_CAT_OFFSET: [usize; 14] = [0, 10, 20, 30, 39, 0, 0, 10, 20, 0, 0, 10, 20, 0];

/// 8x8 块 significant_coeff_flag 的 ctxIdxInc (帧编码)
const SIG_8X8_FRAME: [u8; 63] = [
    0, 1, 2, 3, 4, 5, 5, 4, 4, 3, 3, 4, 4, 4, 5, 5, 4, 4, 4, 4, 3, 3, 6, 7, 7, 7, 8, 9, 10, 9, 8, 7,
    7, 6, 11, 12, 13, 11, 6, 7, 8, 9, 14, 10, 9, 8, 6, 11, 12, 13, 11, 6, 9, 14, 10, 9, 11, 12, 13,
    11, 14, 10, 12,
];

/// 8x8 块 significant_coeff_flag 的 ctxIdxInc (场编码)
const SIG_8X8_FIELD: [u8; 63] = [
    0, 1, 1, 2, 2, 3, 3, 4, 5, 6, 7, 7, 7, 8, 4, 5, 6, 9, 10, 10, 8, 11, 12, 11, 9, 9, 10, 10, 8, 11,
    12, 11, 9, 9, 10, 10, 8, 11, 12, 11, 9, 9, 10, 10, 8, 13, 13, 9, 9, 10, 10, 8, 13, 13, 9, 9, 10,
    10, 14, 14, 14, 14, 14,
];

/// 8x8 块 last_significant_coeff_flag 的 ctxIdxInc
const LAST_8X8: [u8; 63] = [
    0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8,
];

/// 一个块类别的残差上下文基址 (ctxIdxOffset + ctxBlockCatOffset)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResidualCtx {
    cat: usize,
    pub coded_block_flag: usize,
    pub significant: usize,
    pub last: usize,
    pub abs_level: usize,
    field: bool,
    num_c8x8: usize,
}

impl ResidualCtx {
    pub fn new(category: BlockCategory, field: bool, num_c8x8: usize) -> Self {
        let cat = category.ctx_block_cat();
        Self {
            cat,
            coded_block_flag: cbf_offset(cat) + CBF_CAT_OFFSET[cat],
            significant: significant_offset(cat, field) + SIG_CAT_OFFSET[cat],
            last: last_offset(cat, field) + SIG_CAT_OFFSET[cat],
            abs_level: abs_level_offset(cat) + ABS_CAT_OFFSET[cat],
            field,
            num_c8x8: num_c8x8.max(1),
        }
    }

    fn is_8x8(&self) -> bool {
        matches!(self.cat, 5 | 9 | 13)
    }

    /// significant_coeff_flag[i] 的 ctxIdx
    pub fn significant_ctx(&self, i: usize) -> usize {
        let inc = if self.cat == 3 {
            (i / self.num_c8x8).min(2)
        } else if self.is_8x8() {
            let table = if self.field { &SIG_8X8_FIELD } else { &SIG_8X8_FRAME };
            table[i.min(62)] as usize
        } else {
            i
        };
        self.significant + inc
    }

    /// last_significant_coeff_flag[i] 的 ctxIdx
    pub fn last_ctx(&self, i: usize) -> usize {
        let inc = if self.cat == 3 {
            (i / self.num_c8x8).min(2)
        } else if self.is_8x8() {
            LAST_8X8[i.min(62)] as usize
        } else {
            i
        };
        self.last + inc
    }

    /// coeff_abs_level_minus1 第 `bin_idx` 个 bin 的 ctxIdx
    pub fn abs_level_ctx(&self, bin_idx: usize, num_eq1: usize, num_gt1: usize) -> usize {
        let inc = if bin_idx == 0 {
            if num_gt1 != 0 { 0 } else { (1 + num_eq1).min(4) }
        } else {
            let cap = if self.cat == 3 { 3 } else { 4 };
            5 + num_gt1.min(cap)
        };
        self.abs_level + inc
    }
}
