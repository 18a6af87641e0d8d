// ztext - the text buffer engine behind zedit
//
// Copyright (c) 2025 zedit team
//
// Licensed under MIT License

// Piece Table 文本缓冲引擎
//
// 职责：以不可变原始块加追加式草稿块表示文件内容，
//       支持任意位置的高效插入删除、完整的撤销重做树、
//       跨编辑稳定的位置标记，以及原子化的保存管线

mod block;
mod error;
mod iter;
mod lines;
mod mark;
mod newline;
mod piece;
mod revision;
mod save;
mod text;

// 重新导出
pub use self::error::{TextError, TextResult};
pub use self::iter::{Bytes, Chunks, TextIterator};
pub use self::mark::Mark;
pub use self::newline::NewlineType;
pub use self::save::{SaveMethod, SaveSession};
pub use self::text::Text;

/// 草稿块默认大小
pub const BLOCK_SIZE: usize = 1 << 20; // 1MB

/// 字素簇边界查找的初始窗口（字节）
pub(crate) const GRAPHEME_WINDOW: usize = 256;
