//! 残差块寻址与宏块内块状态.
//!
//! - [`BlockCategory`]: 14 种 ctxBlockCat
//! - [`BlockAddress`]: 一个残差块的类别、扫描区间与容量
//! - [`BlockLocation`]: 块在宏块内的位置, 用于邻居推导
//! - [`BlockIndexCursor`]: 当前宏块已解码块的系数计数与 coded_block_flag,
//!   按值传入每次块操作并随结果返回

use resyn_core::{ResynError, ResynResult};

// ============================================================
// 分量与块类别
// ============================================================

/// 颜色分量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Y,
    Cb,
    Cr,
}

impl Component {
    /// 分量索引 (Y=0, Cb=1, Cr=2)
    pub fn index(self) -> usize {
        match self {
            Self::Y => 0,
            Self::Cb => 1,
            Self::Cr => 2,
        }
    }

    /// 色度分量 iCbCr (Cb=0, Cr=1)
    pub fn chroma_index(self) -> usize {
        self.index().saturating_sub(1)
    }
}

/// 亮度式平面中的块种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneBlockKind {
    /// Intra16x16 DC
    Dc,
    /// Intra16x16 AC
    Ac,
    /// 4x4 变换块
    Level4x4,
    /// 8x8 变换块
    Level8x8,
}

/// 残差块类别 (ctxBlockCat)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockCategory {
    LumaDc,
    LumaAc,
    Luma4x4,
    ChromaDc,
    ChromaAc,
    Luma8x8,
    CbDc,
    CbAc,
    Cb4x4,
    Cb8x8,
    CrDc,
    CrAc,
    Cr4x4,
    Cr8x8,
}

impl BlockCategory {
    /// ctxBlockCat 数值
    pub fn ctx_block_cat(self) -> usize {
        match self {
            Self::LumaDc => 0,
            Self::LumaAc => 1,
            Self::Luma4x4 => 2,
            Self::ChromaDc => 3,
            Self::ChromaAc => 4,
            Self::Luma8x8 => 5,
            Self::CbDc => 6,
            Self::CbAc => 7,
            Self::Cb4x4 => 8,
            Self::Cb8x8 => 9,
            Self::CrDc => 10,
            Self::CrAc => 11,
            Self::Cr4x4 => 12,
            Self::Cr8x8 => 13,
        }
    }

    /// 亮度式平面 (亮度, 或 4:4:4 的 Cb/Cr) 中的块类别
    pub fn for_plane(component: Component, kind: PlaneBlockKind) -> Self {
        use PlaneBlockKind::*;
        match (component, kind) {
            (Component::Y, Dc) => Self::LumaDc,
            (Component::Y, Ac) => Self::LumaAc,
            (Component::Y, Level4x4) => Self::Luma4x4,
            (Component::Y, Level8x8) => Self::Luma8x8,
            (Component::Cb, Dc) => Self::CbDc,
            (Component::Cb, Ac) => Self::CbAc,
            (Component::Cb, Level4x4) => Self::Cb4x4,
            (Component::Cb, Level8x8) => Self::Cb8x8,
            (Component::Cr, Dc) => Self::CrDc,
            (Component::Cr, Ac) => Self::CrAc,
            (Component::Cr, Level4x4) => Self::Cr4x4,
            (Component::Cr, Level8x8) => Self::Cr8x8,
        }
    }

    /// 是否为 8x8 块类别 (5/9/13)
    pub fn is_8x8(self) -> bool {
        matches!(self, Self::Luma8x8 | Self::Cb8x8 | Self::Cr8x8)
    }
}

// ============================================================
// 块地址与系数数组
// ============================================================

/// 残差块地址: `(类别, 扫描起点, 扫描终点, 最大系数数)`
///
/// 扫描区间以块自身的系数下标表示, 满足 `start <= end < max_coeff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockAddress {
    category: BlockCategory,
    start: usize,
    end: usize,
    max_coeff: usize,
}

impl BlockAddress {
    pub fn new(category: BlockCategory, start: usize, end: usize, max_coeff: usize) -> ResynResult<Self> {
        if !matches!(max_coeff, 4 | 8 | 15 | 16 | 64) {
            return Err(ResynError::invalid(format!("块容量非法: {}", max_coeff)));
        }
        if start > end || end >= max_coeff {
            return Err(ResynError::invalid(format!(
                "扫描区间非法: [{}, {}], 容量 {}",
                start, end, max_coeff
            )));
        }
        Ok(Self {
            category,
            start,
            end,
            max_coeff,
        })
    }

    pub fn category(&self) -> BlockCategory {
        self.category
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn max_coeff(&self) -> usize {
        self.max_coeff
    }

    /// 扫描区间长度 `end - start + 1`
    pub fn span(&self) -> usize {
        self.end - self.start + 1
    }
}

/// 定长系数数组 (最多 64 个), 附显式长度
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoeffArray {
    values: [i32; 64],
    len: u8,
}

impl CoeffArray {
    /// 长度为 `len` 的全零数组
    pub fn zeroed(len: usize) -> Self {
        Self {
            values: [0; 64],
            len: len.min(64) as u8,
        }
    }

    /// 从切片构造
    pub fn from_slice(values: &[i32]) -> ResynResult<Self> {
        if values.len() > 64 {
            return Err(ResynError::invalid(format!("系数数组过长: {}", values.len())));
        }
        let mut out = Self::zeroed(values.len());
        out.values[..values.len()].copy_from_slice(values);
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.values[..self.len as usize]
    }

    pub fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.values[..self.len as usize]
    }

    /// 非零系数个数
    pub fn count_nonzero(&self) -> usize {
        self.as_slice().iter().filter(|&&v| v != 0).count()
    }

    /// 是否全零
    pub fn is_all_zero(&self) -> bool {
        self.as_slice().iter().all(|&v| v == 0)
    }
}

impl std::fmt::Debug for CoeffArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl std::ops::Index<usize> for CoeffArray {
    type Output = i32;

    fn index(&self, idx: usize) -> &i32 {
        &self.as_slice()[idx]
    }
}

impl std::ops::IndexMut<usize> for CoeffArray {
    fn index_mut(&mut self, idx: usize) -> &mut i32 {
        &mut self.as_mut_slice()[idx]
    }
}

// ============================================================
// 块位置与 4x4 几何
// ============================================================

/// 块在宏块内的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockLocation {
    /// 亮度式平面的 DC 块
    PlaneDc(Component),
    /// 亮度式平面的 4x4 块 (luma4x4BlkIdx 0..16)
    Plane4x4(Component, usize),
    /// 亮度式平面的 8x8 块 (0..4)
    Plane8x8(Component, usize),
    /// 色度 DC 块 (ChromaArrayType 1/2)
    ChromaDc(Component),
    /// 色度 AC 块 (chroma4x4BlkIdx 0..8)
    ChromaAc(Component, usize),
}

impl BlockLocation {
    pub fn component(&self) -> Component {
        match *self {
            Self::PlaneDc(c)
            | Self::Plane4x4(c, _)
            | Self::Plane8x8(c, _)
            | Self::ChromaDc(c)
            | Self::ChromaAc(c, _) => c,
        }
    }
}

/// luma4x4BlkIdx -> (x, y), 以 4x4 块为单位
pub fn luma4x4_xy(blk_idx: usize) -> (usize, usize) {
    let x = (blk_idx / 4 % 2) * 2 + blk_idx % 4 % 2;
    let y = (blk_idx / 4 / 2) * 2 + blk_idx % 4 / 2;
    (x, y)
}

/// (x, y) -> luma4x4BlkIdx
pub fn luma4x4_index(x: usize, y: usize) -> usize {
    (y / 2) * 8 + (x / 2) * 4 + (y % 2) * 2 + x % 2
}

/// chroma4x4BlkIdx -> (x, y), 色度宽度固定为 2 个 4x4 块
pub fn chroma4x4_xy(blk_idx: usize) -> (usize, usize) {
    (blk_idx % 2, blk_idx / 2)
}

/// (x, y) -> chroma4x4BlkIdx
pub fn chroma4x4_index(x: usize, y: usize) -> usize {
    y * 2 + x
}

// ============================================================
// 宏块内块状态游标
// ============================================================

/// 当前宏块已处理残差块的状态
///
/// 记录每个分量每个 4x4 块的 TotalCoeff (CAVLC nC 推导) 与 coded_block_flag
/// (CABAC 上下文推导). 色度 AC 块 (ChromaArrayType 1/2) 复用 Cb/Cr 分量的前 8 项.
/// 值语义: 每次块操作接收一个游标并返回更新后的游标, 不存在共享可变状态.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockIndexCursor {
    total_coeff: [[u8; 16]; 3],
    coded_4x4: [u16; 3],
    coded_8x8: [u8; 3],
    coded_dc: [bool; 3],
}

impl BlockIndexCursor {
    /// 全部清零的游标 (新宏块起点)
    pub fn new() -> Self {
        Self::default()
    }

    /// I_PCM 宏块: 所有块按 16 个系数、已编码处理
    pub fn pcm() -> Self {
        Self {
            total_coeff: [[16; 16]; 3],
            coded_4x4: [u16::MAX; 3],
            coded_8x8: [0x0F; 3],
            coded_dc: [true; 3],
        }
    }

    pub fn total_coeff(&self, component: Component, blk_idx: usize) -> u8 {
        self.total_coeff[component.index()][blk_idx & 15]
    }

    #[must_use]
    pub fn with_total_coeff(mut self, component: Component, blk_idx: usize, count: u8) -> Self {
        self.total_coeff[component.index()][blk_idx & 15] = count;
        self
    }

    pub fn coded_4x4(&self, component: Component, blk_idx: usize) -> bool {
        self.coded_4x4[component.index()] & (1 << (blk_idx & 15)) != 0
    }

    #[must_use]
    pub fn with_coded_4x4(mut self, component: Component, blk_idx: usize, coded: bool) -> Self {
        let bit = 1u16 << (blk_idx & 15);
        let slot = &mut self.coded_4x4[component.index()];
        *slot = if coded { *slot | bit } else { *slot & !bit };
        self
    }

    pub fn coded_8x8(&self, component: Component, blk8_idx: usize) -> bool {
        self.coded_8x8[component.index()] & (1 << (blk8_idx & 3)) != 0
    }

    /// 记录 8x8 块的 coded_block_flag, 同时覆盖其 4 个 4x4 子块
    #[must_use]
    pub fn with_coded_8x8(mut self, component: Component, blk8_idx: usize, coded: bool) -> Self {
        let bit = 1u8 << (blk8_idx & 3);
        let slot = &mut self.coded_8x8[component.index()];
        *slot = if coded { *slot | bit } else { *slot & !bit };
        for sub in 0..4 {
            self = self.with_coded_4x4(component, (blk8_idx & 3) * 4 + sub, coded);
        }
        self
    }

    pub fn coded_dc(&self, component: Component) -> bool {
        self.coded_dc[component.index()]
    }

    #[must_use]
    pub fn with_coded_dc(mut self, component: Component, coded: bool) -> Self {
        self.coded_dc[component.index()] = coded;
        self
    }
}
