//! 解码上下文.
//!
//! 参数集与片头解析不在本 crate 范围内, 它们产出的取值经由这里的显式结构传入,
//! 语法层不持有任何全局状态.

use resyn_core::{ResynError, ResynResult};

/// 熵编码模式 (PPS entropy_coding_mode_flag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntropyMode {
    /// 上下文自适应变长编码
    Cavlc,
    /// 上下文自适应二进制算术编码
    Cabac,
}

/// ChromaArrayType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChromaArrayType {
    /// 单色, 或 separate_colour_plane_flag=1 的 4:4:4
    Monochrome,
    /// 4:2:0
    Yuv420,
    /// 4:2:2
    Yuv422,
    /// 4:4:4 (色度按亮度方式编码)
    Yuv444,
}

impl ChromaArrayType {
    /// 由 ChromaArrayType 数值构造
    pub fn from_idc(idc: u32) -> ResynResult<Self> {
        match idc {
            0 => Ok(Self::Monochrome),
            1 => Ok(Self::Yuv420),
            2 => Ok(Self::Yuv422),
            3 => Ok(Self::Yuv444),
            _ => Err(ResynError::invalid(format!(
                "ChromaArrayType 超出范围: {}",
                idc
            ))),
        }
    }

    /// ChromaArrayType 数值
    pub fn idc(self) -> u32 {
        match self {
            Self::Monochrome => 0,
            Self::Yuv420 => 1,
            Self::Yuv422 => 2,
            Self::Yuv444 => 3,
        }
    }

    /// SubWidthC (单色时无意义, 返回 0)
    pub fn sub_width_c(self) -> usize {
        match self {
            Self::Monochrome => 0,
            Self::Yuv420 | Self::Yuv422 => 2,
            Self::Yuv444 => 1,
        }
    }

    /// SubHeightC (单色时无意义, 返回 0)
    pub fn sub_height_c(self) -> usize {
        match self {
            Self::Monochrome => 0,
            Self::Yuv420 => 2,
            Self::Yuv422 | Self::Yuv444 => 1,
        }
    }

    /// MbWidthC
    pub fn mb_width_c(self) -> usize {
        match self.sub_width_c() {
            0 => 0,
            w => 16 / w,
        }
    }

    /// MbHeightC
    pub fn mb_height_c(self) -> usize {
        match self.sub_height_c() {
            0 => 0,
            h => 16 / h,
        }
    }

    /// 每个色度分量的 8x8 块数 (仅 4:2:0 / 4:2:2 有意义)
    pub fn num_c8x8(self) -> usize {
        match self {
            Self::Yuv420 => 1,
            Self::Yuv422 => 2,
            Self::Monochrome | Self::Yuv444 => 0,
        }
    }

    /// 是否使用色度 DC/AC 残差结构
    pub fn has_chroma_dc_ac(self) -> bool {
        matches!(self, Self::Yuv420 | Self::Yuv422)
    }
}

/// 片类型 (slice_type % 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    /// 由 slice_type 语法值构造 (0..=9)
    pub fn from_raw(slice_type: u32) -> ResynResult<Self> {
        match slice_type % 5 {
            _ if slice_type > 9 => Err(ResynError::invalid(format!(
                "slice_type 超出范围: {}",
                slice_type
            ))),
            0 => Ok(Self::P),
            1 => Ok(Self::B),
            2 => Ok(Self::I),
            3 => Ok(Self::Sp),
            _ => Ok(Self::Si),
        }
    }

    /// P 或 SP
    pub fn is_p_like(self) -> bool {
        matches!(self, Self::P | Self::Sp)
    }

    pub fn is_b(self) -> bool {
        self == Self::B
    }
}

/// 片级上下文: 由参数集与片头协作者提供
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceContext {
    /// 熵编码模式
    pub entropy: EntropyMode,
    /// ChromaArrayType
    pub chroma_array_type: ChromaArrayType,
    /// 亮度位深 (8..=14)
    pub bit_depth_luma: u8,
    /// 色度位深 (8..=14)
    pub bit_depth_chroma: u8,
    /// PPS transform_8x8_mode_flag
    pub transform_8x8_mode: bool,
    /// 片类型
    pub slice_type: SliceType,
    /// PPS constrained_intra_pred_flag
    pub constrained_intra_pred: bool,
    /// 片数据分区 (nal_unit_type 2..=4)
    pub data_partitioned: bool,
    /// num_ref_idx_l0_active_minus1
    pub num_ref_idx_l0_active_minus1: u32,
    /// num_ref_idx_l1_active_minus1
    pub num_ref_idx_l1_active_minus1: u32,
    /// MbaffFrameFlag
    pub mbaff_frame: bool,
    /// field_pic_flag
    pub field_pic: bool,
    /// SPS direct_8x8_inference_flag
    pub direct_8x8_inference: bool,
}

impl SliceContext {
    /// 以常见默认值构造 (8 位, 帧编码, 单参考帧)
    pub fn new(entropy: EntropyMode, chroma_array_type: ChromaArrayType, slice_type: SliceType) -> Self {
        Self {
            entropy,
            chroma_array_type,
            bit_depth_luma: 8,
            bit_depth_chroma: 8,
            transform_8x8_mode: false,
            slice_type,
            constrained_intra_pred: false,
            data_partitioned: false,
            num_ref_idx_l0_active_minus1: 0,
            num_ref_idx_l1_active_minus1: 0,
            mbaff_frame: false,
            field_pic: false,
            direct_8x8_inference: true,
        }
    }

    /// 位深合法性检查
    pub fn validate(&self) -> ResynResult<()> {
        for (name, depth) in [
            ("bit_depth_luma", self.bit_depth_luma),
            ("bit_depth_chroma", self.bit_depth_chroma),
        ] {
            if !(8..=14).contains(&depth) {
                return Err(ResynError::invalid(format!("{} 超出范围: {}", name, depth)));
            }
        }
        Ok(())
    }
}

/// 宏块级上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacroblockContext {
    /// mb_field_decoding_flag (非 MBAFF 时等于 field_pic_flag)
    pub mb_field_decoding: bool,
    /// 解码顺序上前一宏块的 mb_qp_delta 是否非零 (CABAC mb_qp_delta 上下文)
    pub prev_qp_delta_nonzero: bool,
}

impl MacroblockContext {
    /// 帧/场编码的宏块
    pub fn new(mb_field_decoding: bool) -> Self {
        Self {
            mb_field_decoding,
            prev_qp_delta_nonzero: false,
        }
    }

    /// 当前宏块是否按场扫描 (影响 CABAC 显著性上下文)
    pub fn is_field_coded(&self, slice: &SliceContext) -> bool {
        slice.field_pic || self.mb_field_decoding
    }

    /// ref_idx 的 te(v) 取值范围
    pub fn ref_idx_range(&self, slice: &SliceContext, num_ref_idx_active_minus1: u32) -> u32 {
        if slice.mbaff_frame && self.mb_field_decoding {
            num_ref_idx_active_minus1 * 2 + 1
        } else {
            num_ref_idx_active_minus1
        }
    }

    /// ref_idx 是否出现在码流中 (除分区预测模式以外的条件)
    pub fn ref_idx_present(&self, slice: &SliceContext, num_ref_idx_active_minus1: u32) -> bool {
        num_ref_idx_active_minus1 > 0 || self.mb_field_decoding != slice.field_pic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chroma_geometry() {
        let t420 = ChromaArrayType::Yuv420;
        assert_eq!((t420.mb_width_c(), t420.mb_height_c()), (8, 8));
        assert_eq!(t420.num_c8x8(), 1);
        let t422 = ChromaArrayType::Yuv422;
        assert_eq!((t422.mb_width_c(), t422.mb_height_c()), (8, 16));
        assert_eq!(t422.num_c8x8(), 2);
        let t444 = ChromaArrayType::Yuv444;
        assert_eq!((t444.mb_width_c(), t444.mb_height_c()), (16, 16));
        assert!(!t444.has_chroma_dc_ac());
        assert_eq!(ChromaArrayType::Monochrome.mb_width_c(), 0);
        assert!(ChromaArrayType::from_idc(4).is_err());
    }

    #[test]
    fn test_slice_type_from_raw() {
        assert_eq!(SliceType::from_raw(0).unwrap(), SliceType::P);
        assert_eq!(SliceType::from_raw(6).unwrap(), SliceType::B);
        assert_eq!(SliceType::from_raw(7).unwrap(), SliceType::I);
        assert_eq!(SliceType::from_raw(9).unwrap(), SliceType::Si);
        assert!(SliceType::from_raw(10).is_err());
    }

    #[test]
    fn test_ref_idx_range_mbaff() {
        let mut slice = SliceContext::new(EntropyMode::Cavlc, ChromaArrayType::Yuv420, SliceType::P);
        slice.mbaff_frame = true;
        slice.num_ref_idx_l0_active_minus1 = 2;
        let frame_mb = MacroblockContext::default();
        let field_mb = MacroblockContext::new(true);
        assert_eq!(frame_mb.ref_idx_range(&slice, 2), 2);
        assert_eq!(field_mb.ref_idx_range(&slice, 2), 5);
        assert!(!frame_mb.ref_idx_present(&slice, 0));
        assert!(field_mb.ref_idx_present(&slice, 0), "场/帧不一致时 ref_idx 必须出现");
    }
}
