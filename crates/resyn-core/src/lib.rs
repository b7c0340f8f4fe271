//! # resyn-core
//!
//! resyn 核心库, 提供统一错误类型、比特流读写游标与延迟解析描述符.
//!
//! 上层语法编解码 (`resyn-codec`) 的所有读写都经过这里的游标, 因此游标语义
//! (大端位序、耗尽即报错、可保存/恢复位置) 是比特级往返一致性的基础.

pub mod bitreader;
pub mod bitwriter;
pub mod deferred;
pub mod error;

// 重导出常用类型
pub use bitreader::{BitReader, CursorState};
pub use bitwriter::BitWriter;
pub use deferred::BitSpan;
pub use error::{ResynError, ResynResult};
