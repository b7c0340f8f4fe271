//! CAVLC 熵编码: nC 推导与残差块编解码.

mod block;
mod nc;
mod tables;

pub use block::CavlcBlock;
pub use nc::derive_nc;
