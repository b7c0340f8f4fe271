//! 宏块类型与子宏块类型.
//!
//! mb_type 的语法值依赖片类型: P/SP 片中 5 以上、B 片中 23 以上、SI 片中 1 以上
//! 都是 I 片类型的平移. [`MbType`] 只保存语义, 需要语法值时再按片类型换算.

use resyn_core::{ResynError, ResynResult};

use super::context::SliceType;
use super::neighbor::NeighborKind;

/// 帧间预测方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredDir {
    L0,
    L1,
    Bi,
}

impl PredDir {
    /// 是否使用参考列表 `list`
    pub fn uses_list(self, list: usize) -> bool {
        match self {
            Self::L0 => list == 0,
            Self::L1 => list == 1,
            Self::Bi => list < 2,
        }
    }
}

/// 分区预测模式 (MbPartPredMode / SubMbPredMode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartPredMode {
    /// I_NxN (Intra_4x4 或 Intra_8x8, 由 transform_size_8x8_flag 决定)
    IntraNxN,
    Intra16x16,
    /// I_PCM 没有预测
    None,
    Inter(PredDir),
    Direct,
}

impl PartPredMode {
    /// 该分区是否传输列表 `list` 的 ref_idx / mvd
    pub fn uses_list(self, list: usize) -> bool {
        matches!(self, Self::Inter(dir) if dir.uses_list(list))
    }
}

/// 分区在宏块内的矩形, 以 4x4 块为单位 `(x, y, w, h)`
pub type PartRect = (usize, usize, usize, usize);

/// B 片 mb_type 1..=21: `(形状, 第一分区, 第二分区)`, 形状 0=16x16, 1=16x8, 2=8x16
const B_PARTITIONS: [(u8, PredDir, PredDir); 21] = [
    (0, PredDir::L0, PredDir::L0),
    (0, PredDir::L1, PredDir::L1),
    (0, PredDir::Bi, PredDir::Bi),
    (1, PredDir::L0, PredDir::L0),
    (2, PredDir::L0, PredDir::L0),
    (1, PredDir::L1, PredDir::L1),
    (2, PredDir::L1, PredDir::L1),
    (1, PredDir::L0, PredDir::L1),
    (2, PredDir::L0, PredDir::L1),
    (1, PredDir::L1, PredDir::L0),
    (2, PredDir::L1, PredDir::L0),
    (1, PredDir::L0, PredDir::Bi),
    (2, PredDir::L0, PredDir::Bi),
    (1, PredDir::L1, PredDir::Bi),
    (2, PredDir::L1, PredDir::Bi),
    (1, PredDir::Bi, PredDir::L0),
    (2, PredDir::Bi, PredDir::L0),
    (1, PredDir::Bi, PredDir::L1),
    (2, PredDir::Bi, PredDir::L1),
    (1, PredDir::Bi, PredDir::Bi),
    (2, PredDir::Bi, PredDir::Bi),
];

/// 宏块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MbType {
    INxN,
    /// Intra_16x16, cbp_luma 只能是 0 或 15
    I16x16 {
        pred_mode: u8,
        cbp_chroma: u8,
        cbp_luma: u8,
    },
    IPcm,
    Si,
    P16x16,
    P16x8,
    P8x16,
    P8x8,
    P8x8Ref0,
    BDirect16x16,
    B16x16(PredDir),
    B16x8(PredDir, PredDir),
    B8x16(PredDir, PredDir),
    B8x8,
}

impl MbType {
    /// 由 I 片语义的 mb_type (0..=25) 构造
    fn from_intra_raw(raw: u32) -> ResynResult<Self> {
        match raw {
            0 => Ok(Self::INxN),
            1..=24 => {
                let t = (raw - 1) as u8;
                Ok(Self::I16x16 {
                    pred_mode: t % 4,
                    cbp_chroma: (t / 4) % 3,
                    cbp_luma: if t >= 12 { 15 } else { 0 },
                })
            }
            25 => Ok(Self::IPcm),
            _ => Err(ResynError::malformed(format!("I 宏块 mb_type 超出范围: {}", raw))),
        }
    }

    /// 由片类型与 mb_type 语法值构造
    pub fn from_raw(slice_type: SliceType, raw: u32) -> ResynResult<Self> {
        match slice_type {
            SliceType::I => Self::from_intra_raw(raw),
            SliceType::Si => match raw {
                0 => Ok(Self::Si),
                _ => Self::from_intra_raw(raw - 1),
            },
            SliceType::P | SliceType::Sp => match raw {
                0 => Ok(Self::P16x16),
                1 => Ok(Self::P16x8),
                2 => Ok(Self::P8x16),
                3 => Ok(Self::P8x8),
                4 => Ok(Self::P8x8Ref0),
                _ => Self::from_intra_raw(raw - 5),
            },
            SliceType::B => match raw {
                0 => Ok(Self::BDirect16x16),
                1..=21 => {
                    let (shape, first, second) = B_PARTITIONS[raw as usize - 1];
                    Ok(match shape {
                        0 => Self::B16x16(first),
                        1 => Self::B16x8(first, second),
                        _ => Self::B8x16(first, second),
                    })
                }
                22 => Ok(Self::B8x8),
                _ => Self::from_intra_raw(raw - 23),
            },
        }
    }

    /// I 片语义下的 mb_type
    fn intra_raw(self) -> Option<u32> {
        match self {
            Self::INxN => Some(0),
            Self::I16x16 {
                pred_mode,
                cbp_chroma,
                cbp_luma,
            } => {
                let luma = u32::from(cbp_luma != 0);
                Some(1 + u32::from(pred_mode) + 4 * u32::from(cbp_chroma) + 12 * luma)
            }
            Self::IPcm => Some(25),
            _ => None,
        }
    }

    /// 换算为片类型下的 mb_type 语法值
    pub fn raw(self, slice_type: SliceType) -> ResynResult<u32> {
        self.validate()?;
        let value = match (slice_type, self) {
            (SliceType::I, _) => self.intra_raw(),
            (SliceType::Si, Self::Si) => Some(0),
            (SliceType::Si, _) => self.intra_raw().map(|v| v + 1),
            (SliceType::P | SliceType::Sp, Self::P16x16) => Some(0),
            (SliceType::P | SliceType::Sp, Self::P16x8) => Some(1),
            (SliceType::P | SliceType::Sp, Self::P8x16) => Some(2),
            (SliceType::P | SliceType::Sp, Self::P8x8) => Some(3),
            (SliceType::P | SliceType::Sp, Self::P8x8Ref0) => Some(4),
            (SliceType::P | SliceType::Sp, _) => self.intra_raw().map(|v| v + 5),
            (SliceType::B, Self::BDirect16x16) => Some(0),
            (SliceType::B, Self::B8x8) => Some(22),
            (SliceType::B, Self::B16x16(d)) => b_partition_raw(0, d, d),
            (SliceType::B, Self::B16x8(a, b)) => b_partition_raw(1, a, b),
            (SliceType::B, Self::B8x16(a, b)) => b_partition_raw(2, a, b),
            (SliceType::B, _) => self.intra_raw().map(|v| v + 23),
        };
        value.ok_or_else(|| ResynError::invalid(format!("{:?} 不能出现在 {:?} 片中", self, slice_type)))
    }

    fn validate(self) -> ResynResult<()> {
        match self {
            Self::I16x16 {
                pred_mode,
                cbp_chroma,
                cbp_luma,
            } if pred_mode > 3 || cbp_chroma > 2 || (cbp_luma != 0 && cbp_luma != 15) => {
                Err(ResynError::invalid(format!("Intra16x16 参数无效: {:?}", self)))
            }
            _ => Ok(()),
        }
    }

    pub fn is_intra(self) -> bool {
        matches!(self, Self::INxN | Self::I16x16 { .. } | Self::IPcm | Self::Si)
    }

    pub fn is_i_nxn(self) -> bool {
        self == Self::INxN
    }

    pub fn is_intra16x16(self) -> bool {
        matches!(self, Self::I16x16 { .. })
    }

    pub fn is_pcm(self) -> bool {
        self == Self::IPcm
    }

    /// Intra16x16 的 (预测模式, cbp_luma, cbp_chroma)
    pub fn intra16x16_params(self) -> Option<(u8, u8, u8)> {
        match self {
            Self::I16x16 {
                pred_mode,
                cbp_chroma,
                cbp_luma,
            } => Some((pred_mode, cbp_luma, cbp_chroma)),
            _ => None,
        }
    }

    /// me(v) 是否使用帧内映射列 (预测模式为 Intra_4x4 / Intra_8x8)
    pub fn uses_intra_cbp_mapping(self) -> bool {
        matches!(self, Self::INxN | Self::Si)
    }

    /// NumMbPart; 帧内与 B_Direct_16x16 按 1 计
    pub fn num_mb_part(self) -> usize {
        match self {
            Self::P16x8 | Self::P8x16 | Self::B16x8(..) | Self::B8x16(..) => 2,
            Self::P8x8 | Self::P8x8Ref0 | Self::B8x8 => 4,
            _ => 1,
        }
    }

    /// 是否走 sub_mb_pred 语法
    pub fn has_sub_mb_pred(self) -> bool {
        self.num_mb_part() == 4
    }

    /// MbPartPredMode(mb_type, part)
    pub fn part_pred_mode(self, part: usize) -> PartPredMode {
        match self {
            Self::INxN | Self::Si => PartPredMode::IntraNxN,
            Self::I16x16 { .. } => PartPredMode::Intra16x16,
            Self::IPcm => PartPredMode::None,
            Self::P16x16 | Self::P16x8 | Self::P8x16 => PartPredMode::Inter(PredDir::L0),
            Self::P8x8 | Self::P8x8Ref0 | Self::B8x8 => PartPredMode::None,
            Self::BDirect16x16 => PartPredMode::Direct,
            Self::B16x16(d) => PartPredMode::Inter(d),
            Self::B16x8(a, b) | Self::B8x16(a, b) => PartPredMode::Inter(if part == 0 { a } else { b }),
        }
    }

    /// 分区矩形 (仅 NumMbPart 为 1 或 2 的类型有意义)
    pub fn part_rect(self, part: usize) -> PartRect {
        match self {
            Self::P16x8 | Self::B16x8(..) => (0, part * 2, 4, 2),
            Self::P8x16 | Self::B8x16(..) => (part * 2, 0, 2, 4),
            _ => (0, 0, 4, 4),
        }
    }

    /// 上下文推导使用的宏块种类
    pub fn neighbor_kind(self) -> NeighborKind {
        match self {
            Self::INxN => NeighborKind::IntraNxN,
            Self::I16x16 { .. } => NeighborKind::Intra16x16,
            Self::IPcm => NeighborKind::Pcm,
            Self::Si => NeighborKind::Si,
            Self::BDirect16x16 => NeighborKind::Direct16x16,
            _ => NeighborKind::Inter,
        }
    }
}

fn b_partition_raw(shape: u8, first: PredDir, second: PredDir) -> Option<u32> {
    B_PARTITIONS
        .iter()
        .position(|&(s, a, b)| s == shape && a == first && b == second)
        .map(|idx| idx as u32 + 1)
}

/// 子宏块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubMbType {
    P8x8,
    P8x4,
    P4x8,
    P4x4,
    BDirect8x8,
    B8x8(PredDir),
    B8x4(PredDir),
    B4x8(PredDir),
    B4x4(PredDir),
}

const DIRS: [PredDir; 3] = [PredDir::L0, PredDir::L1, PredDir::Bi];

impl SubMbType {
    /// 由宏块所在片类型与 sub_mb_type 语法值构造
    pub fn from_raw(slice_type: SliceType, raw: u32) -> ResynResult<Self> {
        let value = if slice_type.is_b() {
            match raw {
                0 => Some(Self::BDirect8x8),
                1..=3 => Some(Self::B8x8(DIRS[raw as usize - 1])),
                4..=9 => {
                    let i = raw as usize - 4;
                    let dir = DIRS[i / 2];
                    Some(if i % 2 == 0 { Self::B8x4(dir) } else { Self::B4x8(dir) })
                }
                10..=12 => Some(Self::B4x4(DIRS[raw as usize - 10])),
                _ => None,
            }
        } else {
            match raw {
                0 => Some(Self::P8x8),
                1 => Some(Self::P8x4),
                2 => Some(Self::P4x8),
                3 => Some(Self::P4x4),
                _ => None,
            }
        };
        value.ok_or_else(|| ResynError::malformed(format!("sub_mb_type 超出范围: {} ({:?})", raw, slice_type)))
    }

    /// sub_mb_type 语法值
    pub fn raw(self) -> u32 {
        let dir_idx = |d: PredDir| DIRS.iter().position(|&x| x == d).unwrap_or(0) as u32;
        match self {
            Self::P8x8 | Self::BDirect8x8 => 0,
            Self::P8x4 => 1,
            Self::P4x8 => 2,
            Self::P4x4 => 3,
            Self::B8x8(d) => 1 + dir_idx(d),
            Self::B8x4(d) => 4 + 2 * dir_idx(d),
            Self::B4x8(d) => 5 + 2 * dir_idx(d),
            Self::B4x4(d) => 10 + dir_idx(d),
        }
    }

    pub fn is_b(self) -> bool {
        !matches!(self, Self::P8x8 | Self::P8x4 | Self::P4x8 | Self::P4x4)
    }

    pub fn is_direct(self) -> bool {
        self == Self::BDirect8x8
    }

    /// NumSubMbPart
    pub fn num_sub_mb_part(self) -> usize {
        match self {
            Self::P8x8 | Self::B8x8(_) | Self::BDirect8x8 => 1,
            Self::P8x4 | Self::P4x8 | Self::B8x4(_) | Self::B4x8(_) => 2,
            Self::P4x4 | Self::B4x4(_) => 4,
        }
    }

    /// SubMbPredMode
    pub fn pred_mode(self) -> PartPredMode {
        match self {
            Self::P8x8 | Self::P8x4 | Self::P4x8 | Self::P4x4 => PartPredMode::Inter(PredDir::L0),
            Self::BDirect8x8 => PartPredMode::Direct,
            Self::B8x8(d) | Self::B8x4(d) | Self::B4x8(d) | Self::B4x4(d) => PartPredMode::Inter(d),
        }
    }

    /// 子分区是否小于 8x8
    pub fn is_smaller_than_8x8(self) -> bool {
        self.num_sub_mb_part() > 1
    }

    /// 第 `blk8` 个 8x8 块中第 `sub` 个子分区的矩形
    pub fn sub_part_rect(self, blk8: usize, sub: usize) -> PartRect {
        let (x0, y0) = ((blk8 % 2) * 2, (blk8 / 2) * 2);
        match self {
            Self::P8x4 | Self::B8x4(_) => (x0, y0 + sub, 2, 1),
            Self::P4x8 | Self::B4x8(_) => (x0 + sub, y0, 1, 2),
            Self::P4x4 | Self::B4x4(_) => (x0 + sub % 2, y0 + sub / 2, 1, 1),
            _ => (x0, y0, 2, 2),
        }
    }
}
