// 修订日志
//
// 职责：以树状结构记录每次快照之间的 piece 链拼接，
//       支持撤销、重做与按时间回溯

use std::ops::{Index, IndexMut};

use crate::error::TextResult;
use crate::piece::{PieceArena, PieceId};

/// 修订在 arena 中的编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RevId(usize);

/// 一段连续 piece 构成的跨度
///
/// `range` 为 None 表示空跨度（纯插入的旧侧、纯删除的新侧）。
#[derive(Debug, Clone, Copy)]
pub(crate) struct Span {
    pub(crate) range: Option<(PieceId, PieceId)>,
    pub(crate) len: usize,
}

impl Span {
    pub(crate) fn empty() -> Self {
        Self { range: None, len: 0 }
    }

    pub(crate) fn of(first: PieceId, last: PieceId, len: usize) -> Self {
        Self {
            range: Some((first, last)),
            len,
        }
    }
}

/// piece 链上的一次拼接记录
#[derive(Debug, Clone, Copy)]
pub(crate) struct Change {
    /// 拼接发生的字节位置
    pub(crate) pos: usize,
    /// 被换出的跨度
    pub(crate) old: Span,
    /// 换入的跨度
    pub(crate) new: Span,
}

/// 一次快照之间的全部拼接
#[derive(Debug)]
pub(crate) struct Revision {
    pub(crate) changes: Vec<Change>,
    /// 创建时间，封存时更新为封存时间（秒）
    pub(crate) time: u64,
    pub(crate) sealed: bool,
    /// 撤销未提交修改后被弃用的修订不再参与时间回溯
    pub(crate) discarded: bool,
    pub(crate) parent: Option<RevId>,
    /// 最早子修订；兄弟链按创建顺序排列
    pub(crate) child: Option<RevId>,
    pub(crate) sibling: Option<RevId>,
}

/// 修订树
///
/// 根修订 0 即加载状态；修订与文本同寿命，从不回收。
#[derive(Debug)]
pub(crate) struct RevisionLog {
    revisions: Vec<Revision>,
    pub(crate) current: RevId,
    pub(crate) saved: RevId,
}

impl RevisionLog {
    pub(crate) fn new(now: u64) -> Self {
        let root = Revision {
            changes: Vec::new(),
            time: now,
            sealed: true,
            discarded: false,
            parent: None,
            child: None,
            sibling: None,
        };
        Self {
            revisions: vec![root],
            current: RevId(0),
            saved: RevId(0),
        }
    }

    /// 新建 parent 的子修订并挂到兄弟链末尾（最新）
    pub(crate) fn alloc_child(&mut self, parent: RevId, now: u64) -> TextResult<RevId> {
        self.revisions.try_reserve(1)?;
        let id = RevId(self.revisions.len());
        self.revisions.push(Revision {
            changes: Vec::new(),
            time: now,
            sealed: false,
            discarded: false,
            parent: Some(parent),
            child: None,
            sibling: None,
        });

        match self[parent].child {
            None => self[parent].child = Some(id),
            Some(first) => {
                let mut cur = first;
                while let Some(next) = self[cur].sibling {
                    cur = next;
                }
                self[cur].sibling = Some(id);
            }
        }
        Ok(id)
    }

    /// 最近创建的子修订（兄弟链末尾）
    pub(crate) fn newest_child(&self, id: RevId) -> Option<RevId> {
        let mut cur = self[id].child?;
        while let Some(next) = self[cur].sibling {
            cur = next;
        }
        Some(cur)
    }

    /// 把 child 从 parent 的子链中摘除
    pub(crate) fn detach_child(&mut self, parent: RevId, child: RevId) {
        let Some(first) = self[parent].child else {
            return;
        };
        if first == child {
            self[parent].child = self[child].sibling.take();
            return;
        }
        let mut cur = first;
        while let Some(next) = self[cur].sibling {
            if next == child {
                self[cur].sibling = self[child].sibling.take();
                return;
            }
            cur = next;
        }
    }

    /// 全部修订编号，按创建顺序
    pub(crate) fn ids(&self) -> impl Iterator<Item = RevId> {
        (0..self.revisions.len()).map(RevId)
    }

    pub(crate) fn len(&self) -> usize {
        self.revisions.len()
    }

    pub(crate) fn index_of(&self, id: RevId) -> usize {
        id.0
    }
}

impl Index<RevId> for RevisionLog {
    type Output = Revision;

    fn index(&self, id: RevId) -> &Revision {
        &self.revisions[id.0]
    }
}

impl IndexMut<RevId> for RevisionLog {
    fn index_mut(&mut self, id: RevId) -> &mut Revision {
        &mut self.revisions[id.0]
    }
}

/// 在 piece 链上把 `out` 跨度换成 `into` 跨度
///
/// 邻居链接取自换入跨度保留的 prev/next；纯删除时取自换出跨度。
/// 同一修订内的变更严格按记录顺序正反重放，保证这些链接始终有效。
pub(crate) fn swap_spans(pieces: &mut PieceArena, out: &Span, into: &Span) {
    let (a, b) = match (into.range, out.range) {
        (Some((first, last)), _) => (pieces[first].prev, pieces[last].next),
        (None, Some((first, last))) => (pieces[first].prev, pieces[last].next),
        (None, None) => return,
    };

    match into.range {
        Some((first, last)) => {
            pieces[a].next = first;
            pieces[b].prev = last;
        }
        None => {
            pieces[a].next = b;
            pieces[b].prev = a;
        }
    }
}
