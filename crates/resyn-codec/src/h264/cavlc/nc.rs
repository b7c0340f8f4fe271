//! CAVLC 上下文 nC 推导.

use resyn_core::{ResynError, ResynResult};

use crate::h264::block::{BlockLocation, Component, chroma4x4_index, chroma4x4_xy, luma4x4_index, luma4x4_xy};
use crate::h264::context::{ChromaArrayType, SliceContext};
use crate::h264::neighbor::{BlockNeighbor, NeighborMacroblock, NeighborSource, above_block, left_block};

/// 推导 coeff_token 的 nC
///
/// 色度 DC 返回 -1 (4:2:0) 或 -2 (4:2:2); 其余块按左/上邻居 4x4 块的 TotalCoeff 推导.
/// `current` 为当前宏块的摘要, 其 `blocks` 记录本宏块已解码块的系数个数.
pub fn derive_nc(
    location: BlockLocation,
    current: &NeighborMacroblock,
    neighbors: &dyn NeighborSource,
    slice: &SliceContext,
) -> ResynResult<i32> {
    let (component, x, y, grid_w, grid_h, chroma_grid) = match location {
        BlockLocation::ChromaDc(_) => {
            return match slice.chroma_array_type {
                ChromaArrayType::Yuv420 => Ok(-1),
                ChromaArrayType::Yuv422 => Ok(-2),
                other => Err(ResynError::invalid(format!(
                    "ChromaArrayType {} 不存在色度 DC 块",
                    other.idc()
                ))),
            };
        }
        BlockLocation::PlaneDc(c) => {
            let (x, y) = luma4x4_xy(0);
            (c, x, y, 4, 4, false)
        }
        BlockLocation::Plane4x4(c, idx) => {
            let (x, y) = luma4x4_xy(idx);
            (c, x, y, 4, 4, false)
        }
        BlockLocation::ChromaAc(c, idx) => {
            let (x, y) = chroma4x4_xy(idx);
            let rows = slice.chroma_array_type.mb_height_c() / 4;
            (c, x, y, 2, rows, true)
        }
        BlockLocation::Plane8x8(..) => {
            return Err(ResynError::invalid("CAVLC 不直接读取 8x8 块"));
        }
    };

    let left = left_block(current, neighbors, x, y, grid_w);
    let above = above_block(current, neighbors, x, y, grid_h);
    let n_a = neighbor_total_coeff(left, current, component, chroma_grid, slice);
    let n_b = neighbor_total_coeff(above, current, component, chroma_grid, slice);

    let nc = match (n_a, n_b) {
        (Some(a), Some(b)) => (a + b + 1) >> 1,
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => 0,
    };
    log::trace!("nC: {:?} A={:?} B={:?} -> {}", location, n_a, n_b, nc);
    Ok(nc)
}

/// 邻居块的 nN; 不可用时为 None
fn neighbor_total_coeff(
    neighbor: Option<BlockNeighbor<'_>>,
    current: &NeighborMacroblock,
    component: Component,
    chroma_grid: bool,
    slice: &SliceContext,
) -> Option<i32> {
    let n = neighbor?;
    if !n.in_current
        && current.kind.is_intra()
        && slice.constrained_intra_pred
        && !n.mb.kind.is_intra()
        && slice.data_partitioned
    {
        return None;
    }
    if n.mb.kind.is_skip() {
        return Some(0);
    }
    if n.mb.kind.is_pcm() {
        return Some(16);
    }
    let blk_idx = if chroma_grid {
        chroma4x4_index(n.x, n.y)
    } else {
        luma4x4_index(n.x, n.y)
    };
    Some(n.mb.blocks.total_coeff(component, blk_idx) as i32)
}
