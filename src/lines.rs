// 行索引
//
// 职责：维护 (字节位置, 行号) 锚点集合，支持行号与字节位置互查；
//       修改点之后的锚点失效，下次查询时按需重建

use std::ops::Range;

use crate::text::Text;

/// 行锚点：某一行行首的字节位置与 1 起始的行号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
    pos: usize,
    lineno: usize,
}

/// 行锚点缓存
///
/// 锚点按字节位置升序存放（行号因此同样升序）。
/// 隐含锚点 (0, 1) 始终成立，不入表。
#[derive(Debug, Default)]
pub(crate) struct LineCache {
    anchors: Vec<Anchor>,
}

impl LineCache {
    pub(crate) fn new() -> Self {
        Self {
            anchors: Vec::new(),
        }
    }

    /// 丢弃位置不小于 pos 的全部锚点
    pub(crate) fn invalidate_from(&mut self, pos: usize) {
        let keep = self.anchors.partition_point(|a| a.pos < pos);
        self.anchors.truncate(keep);
    }

    /// 位置不超过 pos 的最近锚点
    fn anchor_for_pos(&self, pos: usize) -> Anchor {
        let idx = self.anchors.partition_point(|a| a.pos <= pos);
        if idx == 0 {
            Anchor { pos: 0, lineno: 1 }
        } else {
            self.anchors[idx - 1]
        }
    }

    /// 行号不超过 lineno 的最近锚点
    fn anchor_for_lineno(&self, lineno: usize) -> Anchor {
        let idx = self.anchors.partition_point(|a| a.lineno <= lineno);
        if idx == 0 {
            Anchor { pos: 0, lineno: 1 }
        } else {
            self.anchors[idx - 1]
        }
    }

    /// 记录一条行首锚点
    fn record(&mut self, pos: usize, lineno: usize) {
        if pos == 0 {
            return;
        }
        let idx = self.anchors.partition_point(|a| a.pos < pos);
        if self.anchors.get(idx).map(|a| a.pos) == Some(pos) {
            return;
        }
        self.anchors.insert(idx, Anchor { pos, lineno });
    }
}

// ========== 行号查询 ==========

impl Text {
    /// pos 所在行的行号（1 起始）
    ///
    /// pos 超出文本时按末尾计算。
    pub fn lineno_by_pos(&self, pos: usize) -> usize {
        let pos = pos.min(self.size());
        let anchor = self.lines.borrow().anchor_for_pos(pos);

        let mut lineno = anchor.lineno;
        let mut line_start = anchor.pos;
        let mut at = anchor.pos;
        for chunk in self.chunks(anchor.pos..pos) {
            for &b in chunk {
                at += 1;
                if b == b'\n' {
                    lineno += 1;
                    line_start = at;
                }
            }
        }

        self.lines.borrow_mut().record(line_start, lineno);
        lineno
    }

    /// 第 lineno 行行首的字节位置
    ///
    /// 行号超出末行时返回文本大小。
    pub fn pos_by_lineno(&self, lineno: usize) -> usize {
        if lineno <= 1 {
            return 0;
        }
        let anchor = self.lines.borrow().anchor_for_lineno(lineno);
        if anchor.lineno == lineno {
            return anchor.pos;
        }

        let mut cur_line = anchor.lineno;
        let mut at = anchor.pos;
        for chunk in self.chunks(anchor.pos..self.size()) {
            for &b in chunk {
                at += 1;
                if b == b'\n' {
                    cur_line += 1;
                    if cur_line == lineno {
                        self.lines.borrow_mut().record(at, lineno);
                        return at;
                    }
                }
            }
        }
        self.size()
    }

    /// 指定行的字节范围（含行尾换行符）
    pub fn line_range(&self, lineno: usize) -> Range<usize> {
        let start = self.pos_by_lineno(lineno);
        let end = self.pos_by_lineno(lineno + 1);
        start..end
    }
}
