// Piece 链
//
// 职责：以索引编址的 arena 维护 piece 双向链表；
//       piece 被换出链表后保留邻接关系，供修订记录反向拼接

use std::ops::{Index, IndexMut};

use crate::block::BlockId;
use crate::error::TextResult;

/// piece 在 arena 中的编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PieceId(usize);

/// 头哨兵
pub(crate) const HEAD: PieceId = PieceId(0);
/// 尾哨兵
pub(crate) const TAIL: PieceId = PieceId(1);

/// 对某个块的半开视图，带当前逻辑顺序中的前后链接
///
/// 换出链表的 piece 不清除 prev/next：修订回退时按保留的链接原样拼回。
#[derive(Debug, Clone, Copy)]
pub(crate) struct Piece {
    pub(crate) prev: PieceId,
    pub(crate) next: PieceId,
    pub(crate) block: BlockId,
    pub(crate) off: usize,
    pub(crate) len: usize,
}

/// piece arena
///
/// 槽位只增不减：被修订树引用的 piece 与文本同寿命。
#[derive(Debug)]
pub(crate) struct PieceArena {
    nodes: Vec<Piece>,
}

impl PieceArena {
    /// 创建只含头尾哨兵的空链
    pub(crate) fn new() -> Self {
        let head = Piece {
            prev: HEAD,
            next: TAIL,
            block: BlockId::Original,
            off: 0,
            len: 0,
        };
        let tail = Piece {
            prev: HEAD,
            next: TAIL,
            block: BlockId::Original,
            off: 0,
            len: 0,
        };
        Self {
            nodes: vec![head, tail],
        }
    }

    /// 预留 n 个槽位，失败报内存不足
    pub(crate) fn reserve(&mut self, n: usize) -> TextResult<()> {
        self.nodes.try_reserve(n)?;
        Ok(())
    }

    /// 分配新 piece（调用前应已 reserve）
    pub(crate) fn alloc(
        &mut self,
        block: BlockId,
        off: usize,
        len: usize,
        prev: PieceId,
        next: PieceId,
    ) -> PieceId {
        let id = PieceId(self.nodes.len());
        self.nodes.push(Piece {
            prev,
            next,
            block,
            off,
            len,
        });
        id
    }

    /// 首个非哨兵 piece（空链时为尾哨兵）
    pub(crate) fn first(&self) -> PieceId {
        self[HEAD].next
    }

    /// 把 a、b 连成相邻关系
    pub(crate) fn connect(&mut self, a: PieceId, b: PieceId) {
        self[a].next = b;
        self[b].prev = a;
    }
}

impl Index<PieceId> for PieceArena {
    type Output = Piece;

    fn index(&self, id: PieceId) -> &Piece {
        &self.nodes[id.0]
    }
}

impl IndexMut<PieceId> for PieceArena {
    fn index_mut(&mut self, id: PieceId) -> &mut Piece {
        &mut self.nodes[id.0]
    }
}
