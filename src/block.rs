// 块存储
//
// 职责：持有文本的全部原始字节区域：内存映射的原始文件块，
//       加上一条只增不改的草稿块链

use std::fs::File;

use memmap2::Mmap;
use tracing::warn;

use crate::error::TextResult;
use crate::BLOCK_SIZE;

/// 块标识：原始块或第 n 个草稿块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockId {
    /// 加载时映射的原始文件内容（只读）
    Original,
    /// 追加式草稿块，按分配顺序编号
    Scratch(usize),
}

/// 追加式草稿块
///
/// 容量在创建时一次性预留；已写入的字节一旦被 piece 引用便不再改动。
#[derive(Debug)]
struct ScratchBlock {
    buf: Vec<u8>,
}

/// 块存储
#[derive(Debug)]
pub(crate) struct BlockStore {
    original: Option<Mmap>,
    scratch: Vec<ScratchBlock>,
}

impl BlockStore {
    /// 创建空的块存储（新文件或空文件）
    pub(crate) fn empty() -> Self {
        Self {
            original: None,
            scratch: Vec::new(),
        }
    }

    /// 映射已打开的文件作为原始块
    ///
    /// 大小为 0 或映射失败时原始块为空。
    pub(crate) fn from_file(file: &File, len: usize) -> Self {
        if len == 0 {
            return Self::empty();
        }

        let original = match unsafe { Mmap::map(file) } {
            Ok(map) => Some(map),
            Err(err) => {
                warn!("内存映射失败，按空缓冲区处理: {}", err);
                None
            }
        };

        Self {
            original,
            scratch: Vec::new(),
        }
    }

    /// 原始块长度（字节）
    pub(crate) fn original_len(&self) -> usize {
        self.original.as_ref().map(|m| m.len()).unwrap_or(0)
    }

    /// 读取块内指定区域
    pub(crate) fn slice(&self, block: BlockId, off: usize, len: usize) -> &[u8] {
        if len == 0 {
            return &[];
        }

        match block {
            BlockId::Original => match &self.original {
                Some(map) => &map[off..off + len],
                None => &[],
            },
            BlockId::Scratch(idx) => &self.scratch[idx].buf[off..off + len],
        }
    }

    /// 追加字节到草稿存储，返回落点 (块编号, 块内偏移)
    ///
    /// 末尾草稿块容量不足时新开一块，块大小取 max(BLOCK_SIZE, 所需字节)。
    pub(crate) fn append(&mut self, data: &[u8]) -> TextResult<(usize, usize)> {
        if let Some(idx) = self.scratch.len().checked_sub(1) {
            let buf = &mut self.scratch[idx].buf;
            if buf.len() + data.len() <= buf.capacity() {
                let off = buf.len();
                buf.extend_from_slice(data);
                return Ok((idx, off));
            }
        }

        self.scratch.try_reserve(1)?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(BLOCK_SIZE.max(data.len()))?;
        buf.extend_from_slice(data);
        self.scratch.push(ScratchBlock { buf });
        Ok((self.scratch.len() - 1, 0))
    }

    /// 尝试在块内 `end_off` 处原地续写
    ///
    /// 仅当 `block` 是末尾草稿块、`end_off` 恰为其已用长度且剩余容量
    /// 足够时成功；失败不产生任何副作用。
    pub(crate) fn try_extend(&mut self, block: BlockId, end_off: usize, data: &[u8]) -> bool {
        let BlockId::Scratch(idx) = block else {
            return false;
        };
        if idx + 1 != self.scratch.len() {
            return false;
        }

        let buf = &mut self.scratch[idx].buf;
        if end_off != buf.len() || buf.len() + data.len() > buf.capacity() {
            return false;
        }

        buf.extend_from_slice(data);
        true
    }

    /// 地址是否落在本文本的内存映射区域内
    ///
    /// 供进程级 SIGBUS 处理器查询；无映射时恒为 false。
    pub(crate) fn is_in_mapped_region(&self, addr: *const u8) -> bool {
        let Some(map) = &self.original else {
            return false;
        };

        let addr = addr as usize;
        let base = map.as_ptr() as usize;
        addr >= base && addr < base + map.len()
    }
}
