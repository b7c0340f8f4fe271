//! # resyn
//!
//! 纯 Rust 实现的 H.264 残差与宏块层语法编解码器.
//!
//! resyn 只处理宏块层语法本身:
//! - **CAVLC**: coeff_token / level / total_zeros / run_before 的逐比特读写
//! - **CABAC**: 残差块与宏块层语法元素的二值化及上下文索引选择
//! - **宏块层**: mb_type、预测语法、coded_block_pattern、mb_qp_delta 与残差
//!
//! 解码结果保留全部语法值, 重新编码可得到逐比特一致的码流.
//!
//! # 快速开始
//!
//! ```rust
//! use resyn::codec::h264::exp_golomb;
//! use resyn::core::{BitReader, BitWriter};
//!
//! let mut bw = BitWriter::new();
//! exp_golomb::write_se(&mut bw, -3).unwrap();
//! let data = bw.finish();
//!
//! let mut br = BitReader::new(&data);
//! assert_eq!(exp_golomb::read_se(&mut br).unwrap(), -3);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `resyn-core` | 错误类型与比特流游标 |
//! | `resyn-codec` | H.264 残差与宏块层语法 |

/// 错误类型与比特流游标
pub use resyn_core as core;

/// H.264 残差与宏块层语法
pub use resyn_codec as codec;

pub mod logging;

/// 获取 resyn 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
