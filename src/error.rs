// 错误类型
//
// 职责：统一文本引擎对外的错误表示，保留底层 OS 错误

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

/// 文本引擎错误
#[derive(Debug, Error)]
pub enum TextError {
    /// 位置或范围超出当前文本
    #[error("位置超出范围: {pos}")]
    InvalidPosition { pos: usize },

    /// 内存分配失败
    #[error("内存不足")]
    OutOfMemory,

    /// 读写/重命名/stat 失败
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),

    /// 该文件类型不支持所选保存方式
    #[error("该文件类型不支持此保存方式")]
    Unsupported,

    /// 格式串渲染失败
    #[error("格式化失败")]
    Format,
}

/// 文本引擎结果
pub type TextResult<T> = Result<T, TextError>;

impl From<TryReserveError> for TextError {
    fn from(_: TryReserveError) -> Self {
        TextError::OutOfMemory
    }
}
