// 位置标记
//
// 职责：提供跨编辑稳定的不透明位置句柄
//
// 标记即 (块编号, 块内偏移)，不另设登记表：指向的字节被删除时
// 解析失败，撤销恢复这些字节后同一标记自动重新生效。

use crate::block::BlockId;
use crate::piece::TAIL;
use crate::text::Text;

/// 不透明的位置标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(Repr);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repr {
    /// 指向某块内的一个字节
    Data { block: BlockId, off: usize },
    /// 文本末尾的保留标记
    End,
}

impl Text {
    /// 标记 pos 处的字节；pos == size 时返回文本末尾保留标记
    pub fn mark_set(&self, pos: usize) -> Option<Mark> {
        if pos > self.size() {
            return None;
        }
        if pos == self.size() {
            return Some(Mark(Repr::End));
        }

        let (piece, off) = self.locate(pos);
        let p = self.pieces[piece];
        Some(Mark(Repr::Data {
            block: p.block,
            off: p.off + off,
        }))
    }

    /// 解析标记当前对应的字节位置
    ///
    /// 线性扫描 piece 链；标记指向的字节不在当前文本中时返回 None。
    pub fn mark_get(&self, mark: Mark) -> Option<usize> {
        match mark.0 {
            Repr::End => Some(self.size()),
            Repr::Data { block, off } => {
                let mut pos = 0;
                let mut cur = self.pieces.first();
                while cur != TAIL {
                    let p = self.pieces[cur];
                    if p.block == block && p.off <= off && off < p.off + p.len {
                        return Some(pos + (off - p.off));
                    }
                    pos += p.len;
                    cur = p.next;
                }
                None
            }
        }
    }
}
