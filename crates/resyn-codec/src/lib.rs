//! # resyn-codec
//!
//! resyn 语法编解码库. 目前只包含 H.264 的残差与宏块层语法.
//!
//! ## 使用示例
//!
//! ```rust
//! use resyn_codec::h264::{
//!     BlockAddress, BlockCategory, CavlcBlock, exp_golomb,
//! };
//! use resyn_core::{BitReader, BitWriter};
//!
//! let address = BlockAddress::new(BlockCategory::Luma4x4, 0, 15, 16).unwrap();
//! let mut coeffs = [0i32; 16];
//! coeffs[0] = 3;
//! coeffs[4] = -1;
//! let block = CavlcBlock::from_coefficients(address, &coeffs).unwrap();
//!
//! let mut bw = BitWriter::new();
//! block.encode(&mut bw, 0).unwrap();
//! exp_golomb::write_ue(&mut bw, 7);
//! let data = bw.finish();
//!
//! let mut br = BitReader::new(&data);
//! let decoded = CavlcBlock::decode(&mut br, address, 0).unwrap();
//! assert_eq!(decoded.coefficients(), &coeffs);
//! assert_eq!(exp_golomb::read_ue(&mut br).unwrap(), 7);
//! ```

pub mod h264;
