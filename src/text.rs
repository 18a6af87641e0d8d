// 文本实例
//
// 职责：组合块存储、piece 链与修订树，对外提供
//       插入、删除、历史回溯与字节查询

use std::cell::{Cell, RefCell};
use std::fmt;
use std::fs::{File, Metadata};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, trace};

use crate::block::{BlockId, BlockStore};
use crate::error::{TextError, TextResult};
use crate::lines::LineCache;
use crate::newline::NewlineType;
use crate::piece::{PieceArena, PieceId, HEAD, TAIL};
use crate::revision::{self, Change, RevId, RevisionLog, Span};

/// 连续插入缓存
///
/// 记录上一次插入产生的 piece 与其末尾位置；紧接其后的插入
/// 直接原地延长该 piece，而不再新增 piece 与拼接。
#[derive(Debug, Clone, Copy)]
struct InsertCache {
    piece: PieceId,
    pos: usize,
}

/// 文本实例
///
/// 单一属主：同一时刻至多一个线程执行修改或历史操作。
#[derive(Debug)]
pub struct Text {
    pub(crate) blocks: BlockStore,
    pub(crate) pieces: PieceArena,
    pub(crate) size: usize,
    pub(crate) log: RevisionLog,
    cache: Option<InsertCache>,
    pub(crate) lines: RefCell<LineCache>,
    pub(crate) newline: Cell<Option<NewlineType>>,
    path: Option<PathBuf>,
    pub(crate) stat: Option<Metadata>,
}

// ========== 构造与生命周期 ==========

impl Text {
    /// 创建空文本
    pub fn new() -> Self {
        Self {
            blocks: BlockStore::empty(),
            pieces: PieceArena::new(),
            size: 0,
            log: RevisionLog::new(now_secs()),
            cache: None,
            lines: RefCell::new(LineCache::new()),
            newline: Cell::new(None),
            path: None,
            stat: None,
        }
    }

    /// 加载文件内容创建文本；`path` 为 None 时从空文本开始
    ///
    /// 文件不存在视同空文本；目录报 I/O 错误。
    pub fn load(path: Option<&Path>) -> TextResult<Self> {
        let Some(path) = path else {
            return Ok(Self::new());
        };

        let file = match File::open(path) {
            Ok(f) => f,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let mut txt = Self::new();
                txt.path = Some(path.to_path_buf());
                return Ok(txt);
            }
            Err(err) => return Err(TextError::Io(err)),
        };

        let stat = file.metadata()?;
        if stat.is_dir() {
            return Err(TextError::Io(std::io::Error::new(
                std::io::ErrorKind::IsADirectory,
                "不能加载目录",
            )));
        }

        let len = stat.len() as usize;
        let blocks = BlockStore::from_file(&file, len);
        let size = blocks.original_len();

        let mut pieces = PieceArena::new();
        if size > 0 {
            let p = pieces.alloc(BlockId::Original, 0, size, HEAD, TAIL);
            pieces.connect(HEAD, p);
            pieces.connect(p, TAIL);
        }

        debug!("加载 {:?}: {} 字节", path, size);
        Ok(Self {
            blocks,
            pieces,
            size,
            log: RevisionLog::new(now_secs()),
            cache: None,
            lines: RefCell::new(LineCache::new()),
            newline: Cell::new(None),
            path: Some(path.to_path_buf()),
            stat: Some(stat),
        })
    }

    /// 加载时（或最近一次保存后）的文件信息
    pub fn stat(&self) -> Option<&Metadata> {
        self.stat.as_ref()
    }

    /// 加载来源路径
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 是否存在未保存的修改
    ///
    /// 撤销回最近保存的修订后重新变为 false。
    pub fn modified(&self) -> bool {
        self.log.current != self.log.saved
    }
}

impl Default for Text {
    fn default() -> Self {
        Self::new()
    }
}

// ========== 基本查询 ==========

impl Text {
    /// 文本总字节数
    pub fn size(&self) -> usize {
        self.size
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// 读取 pos 处的字节
    pub fn byte_get(&self, pos: usize) -> Option<u8> {
        if pos >= self.size {
            return None;
        }
        let (piece, off) = self.locate(pos);
        let p = self.pieces[piece];
        Some(self.blocks.slice(p.block, p.off + off, 1)[0])
    }

    /// 从 pos 起拷贝至多 buf.len() 个字节，返回实际拷贝数
    pub fn bytes_get(&self, pos: usize, buf: &mut [u8]) -> usize {
        if pos >= self.size {
            return 0;
        }
        let end = (pos + buf.len()).min(self.size);
        let mut copied = 0;
        for chunk in self.chunks(pos..end) {
            buf[copied..copied + chunk.len()].copy_from_slice(chunk);
            copied += chunk.len();
        }
        copied
    }

    /// 拷贝指定范围的内容
    pub fn content(&self, range: std::ops::Range<usize>) -> Vec<u8> {
        let start = range.start.min(self.size);
        let end = range.end.min(self.size);
        let mut out = Vec::with_capacity(end.saturating_sub(start));
        for chunk in self.chunks(start..end) {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// 从 pos 起拷贝至多 len 字节，返回以 NUL 结尾的缓冲区
    pub fn bytes_alloc0(&self, pos: usize, len: usize) -> Vec<u8> {
        let end = pos.saturating_add(len).min(self.size);
        let start = pos.min(self.size);
        let mut out = self.content(start..end);
        out.push(0);
        out
    }
}

// ========== piece 定位 ==========

impl Text {
    /// 返回覆盖 pos 的 piece 与片内偏移
    ///
    /// pos 恰在边界时归属后继 piece；pos == size 时返回尾哨兵。
    pub(crate) fn locate(&self, pos: usize) -> (PieceId, usize) {
        let mut cur = self.pieces.first();
        let mut acc = 0usize;
        while cur != TAIL {
            let len = self.pieces[cur].len;
            if pos < acc + len {
                return (cur, pos - acc);
            }
            acc += len;
            cur = self.pieces[cur].next;
        }
        (TAIL, 0)
    }
}

// ========== 修改操作 ==========

impl Text {
    /// 在 pos 处插入字节
    ///
    /// 新字节追加到草稿块并以新 piece 引用；失败时 piece 链与
    /// 当前修订保持原样。
    pub fn insert(&mut self, pos: usize, data: &[u8]) -> TextResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        if pos > self.size {
            return Err(TextError::InvalidPosition { pos });
        }

        if self.cache_extend(pos, data) {
            return Ok(());
        }

        // 先完成全部可能失败的分配，之后的拼接不再出错
        self.pieces.reserve(3)?;
        let (blk, boff) = self.blocks.append(data)?;
        self.ensure_current_revision()?;
        let block = BlockId::Scratch(blk);

        let (pid, off) = self.locate(pos);
        let (change, inserted) = if off == 0 {
            // 边界插入：挂在后继 piece 之前
            let prev = self.pieces[pid].prev;
            let new = self.pieces.alloc(block, boff, data.len(), prev, pid);
            (
                Change {
                    pos,
                    old: Span::empty(),
                    new: Span::of(new, new, data.len()),
                },
                new,
            )
        } else {
            // 片内插入：P 分裂为 P1 | 新片 | P2
            let p = self.pieces[pid];
            let p1 = self.pieces.alloc(p.block, p.off, off, p.prev, HEAD);
            let new = self.pieces.alloc(block, boff, data.len(), p1, HEAD);
            let p2 = self.pieces.alloc(p.block, p.off + off, p.len - off, new, p.next);
            self.pieces[p1].next = new;
            self.pieces[new].next = p2;
            (
                Change {
                    pos,
                    old: Span::of(pid, pid, p.len),
                    new: Span::of(p1, p2, p.len + data.len()),
                },
                new,
            )
        };

        revision::swap_spans(&mut self.pieces, &change.old, &change.new);
        self.size = self.size - change.old.len + change.new.len;
        let current = self.log.current;
        self.log[current].changes.push(change);
        self.lines.borrow_mut().invalidate_from(pos);
        self.cache = Some(InsertCache {
            piece: inserted,
            pos: pos + data.len(),
        });
        Ok(())
    }

    /// 从 pos 起删除 len 个字节
    pub fn delete(&mut self, pos: usize, len: usize) -> TextResult<()> {
        if len == 0 {
            return Ok(());
        }
        let end = pos
            .checked_add(len)
            .ok_or(TextError::InvalidPosition { pos })?;
        if end > self.size {
            return Err(TextError::InvalidPosition { pos: end });
        }

        self.cache = None;
        self.pieces.reserve(2)?;
        self.ensure_current_revision()?;

        // 收集被覆盖的 piece 跨度 [first, last]
        let (first, foff) = self.locate(pos);
        let mut last = first;
        let mut covered = self.pieces[first].len - foff;
        while covered < len {
            last = self.pieces[last].next;
            covered += self.pieces[last].len;
        }
        let eoff = self.pieces[last].len - (covered - len);
        let old_len = foff + covered;

        let a = self.pieces[first].prev;
        let b = self.pieces[last].next;
        let fp = self.pieces[first];
        let lp = self.pieces[last];

        // 未删除的前缀与后缀各保留为一个新 piece
        let prefix = (foff > 0).then(|| self.pieces.alloc(fp.block, fp.off, foff, a, b));
        let suffix = (eoff < lp.len)
            .then(|| self.pieces.alloc(lp.block, lp.off + eoff, lp.len - eoff, a, b));

        let new = match (prefix, suffix) {
            (Some(p), Some(s)) => {
                self.pieces[p].next = s;
                self.pieces[s].prev = p;
                Span::of(p, s, foff + (lp.len - eoff))
            }
            (Some(p), None) => Span::of(p, p, foff),
            (None, Some(s)) => Span::of(s, s, lp.len - eoff),
            (None, None) => Span::empty(),
        };

        let change = Change {
            pos,
            old: Span::of(first, last, old_len),
            new,
        };
        revision::swap_spans(&mut self.pieces, &change.old, &change.new);
        self.size = self.size - change.old.len + change.new.len;
        let current = self.log.current;
        self.log[current].changes.push(change);
        self.lines.borrow_mut().invalidate_from(pos);
        Ok(())
    }

    /// 删除一个字节范围
    pub fn delete_range(&mut self, range: std::ops::Range<usize>) -> TextResult<()> {
        if range.end < range.start {
            return Err(TextError::InvalidPosition { pos: range.end });
        }
        self.delete(range.start, range.end - range.start)
    }

    /// 把格式化结果插入 pos 处
    pub fn insert_fmt(&mut self, pos: usize, args: fmt::Arguments<'_>) -> TextResult<()> {
        use fmt::Write as _;
        let mut buf = String::new();
        buf.write_fmt(args).map_err(|_| TextError::Format)?;
        self.insert(pos, buf.as_bytes())
    }

    /// 把格式化结果追加到文本末尾
    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) -> TextResult<()> {
        self.insert_fmt(self.size, args)
    }

    /// 连续插入：直接延长上一次插入产生的 piece
    fn cache_extend(&mut self, pos: usize, data: &[u8]) -> bool {
        let Some(cache) = self.cache else {
            return false;
        };
        if cache.pos != pos {
            return false;
        }

        let piece = self.pieces[cache.piece];
        if !self
            .blocks
            .try_extend(piece.block, piece.off + piece.len, data)
        {
            return false;
        }

        // 延长 piece 以及当前修订中对应的变更记录
        self.pieces[cache.piece].len += data.len();
        let cur = self.log.current;
        if let Some(change) = self.log[cur].changes.last_mut() {
            change.new.len += data.len();
        }
        self.size += data.len();
        self.lines.borrow_mut().invalidate_from(pos);
        self.cache = Some(InsertCache {
            piece: cache.piece,
            pos: pos + data.len(),
        });
        true
    }

    /// 确保当前修订未封存且可再记录一条变更
    fn ensure_current_revision(&mut self) -> TextResult<()> {
        let cur = self.log.current;
        if !self.log[cur].sealed {
            self.log[cur].changes.try_reserve(1)?;
            return Ok(());
        }

        let child = self.log.alloc_child(cur, now_secs())?;
        if self.log[child].changes.try_reserve(1).is_err() {
            // 子修订尚无任何变更，摘除后当前修订保持不变
            self.log.detach_child(cur, child);
            return Err(TextError::OutOfMemory);
        }
        self.log.current = child;
        Ok(())
    }
}

// ========== 历史操作 ==========

impl Text {
    /// 封存当前修订；此后的修改进入新的子修订
    ///
    /// 当前修订没有任何变更时为空操作。
    pub fn snapshot(&mut self) {
        self.cache = None;
        let cur = self.log.current;
        if self.log[cur].sealed || self.log[cur].changes.is_empty() {
            return;
        }
        self.log[cur].sealed = true;
        self.log[cur].time = now_secs();
        trace!("封存修订，共 {} 条变更", self.log[cur].changes.len());
    }

    /// 撤销到上一状态，返回最后一条被回退变更的位置
    ///
    /// 当前修订尚未快照时只回退并丢弃这些未提交的修改。
    pub fn undo(&mut self) -> Option<usize> {
        self.cache = None;
        let cur = self.log.current;

        if !self.log[cur].sealed && !self.log[cur].changes.is_empty() {
            // 未提交的修改：逆序回退后弃用该修订
            let pos = self.revert_revision(cur);
            self.log[cur].changes.clear();
            self.log[cur].discarded = true;
            if let Some(parent) = self.log[cur].parent {
                self.log.detach_child(parent, cur);
                self.log.current = parent;
            }
            return pos;
        }

        let parent = self.log[cur].parent?;
        let pos = self.revert_revision(cur);
        self.log.current = parent;
        trace!("撤销到修订树上一层");
        pos
    }

    /// 重做最近创建的子修订，返回最后一条被重放变更之后的位置
    pub fn redo(&mut self) -> Option<usize> {
        self.cache = None;
        let child = self.log.newest_child(self.log.current)?;
        let pos = self.apply_revision(child);
        self.log.current = child;
        trace!("重做到修订树下一层");
        pos
    }

    /// 沿父链回退至多 count 步
    ///
    /// 到达链端即停止；一步都走不了时返回 None。
    pub fn earlier(&mut self, count: usize) -> Option<usize> {
        self.snapshot();
        let mut pos = None;
        for _ in 0..count {
            let cur = self.log.current;
            let Some(parent) = self.log[cur].parent else {
                break;
            };
            pos = self.revert_revision(cur).or(pos);
            self.log.current = parent;
        }
        pos
    }

    /// 沿最新子链前进至多 count 步
    pub fn later(&mut self, count: usize) -> Option<usize> {
        self.snapshot();
        let mut pos = None;
        for _ in 0..count {
            let Some(child) = self.log.newest_child(self.log.current) else {
                break;
            };
            pos = self.apply_revision(child).or(pos);
            self.log.current = child;
        }
        pos
    }

    /// 回到时间上最接近 when 的状态
    ///
    /// 距离相同时取更早的修订。先回退到公共祖先，再沿目标路径重放。
    pub fn restore(&mut self, when: SystemTime) -> Option<usize> {
        self.snapshot();
        let target_secs = when
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut best: Option<(RevId, u64, u64)> = None;
        for id in self.log.ids() {
            let rev = &self.log[id];
            if rev.discarded {
                continue;
            }
            let dist = rev.time.abs_diff(target_secs);
            let better = match best {
                None => true,
                Some((_, bd, bt)) => dist < bd || (dist == bd && rev.time < bt),
            };
            if better {
                best = Some((id, dist, rev.time));
            }
        }

        let (target, _, _) = best?;
        if target == self.log.current {
            return None;
        }
        debug!("按时间回溯到修订 {:?}", target);

        // 标记目标及其全部祖先
        let mut on_path = vec![false; self.log.len()];
        let mut walk = Some(target);
        while let Some(id) = walk {
            on_path[self.log.index_of(id)] = true;
            walk = self.log[id].parent;
        }

        // 回退到公共祖先
        let mut pos = None;
        while !on_path[self.log.index_of(self.log.current)] {
            let cur = self.log.current;
            let Some(parent) = self.log[cur].parent else {
                break;
            };
            pos = self.revert_revision(cur).or(pos);
            self.log.current = parent;
        }

        // 从公共祖先沿目标路径重放
        let mut path = Vec::new();
        let mut walk = target;
        while walk != self.log.current {
            path.push(walk);
            match self.log[walk].parent {
                Some(parent) => walk = parent,
                None => break,
            }
        }
        for id in path.into_iter().rev() {
            pos = self.apply_revision(id).or(pos);
            self.log.current = id;
        }
        pos
    }

    /// 当前状态的创建时间
    pub fn state(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.log[self.log.current].time)
    }

    /// 第 index 近的一条变更的位置，0 为最新
    pub fn history_get(&self, index: usize) -> Option<usize> {
        let mut remaining = index;
        let mut rev = Some(self.log.current);
        while let Some(id) = rev {
            for change in self.log[id].changes.iter().rev() {
                if remaining == 0 {
                    return Some(change.pos);
                }
                remaining -= 1;
            }
            rev = self.log[id].parent;
        }
        None
    }

    /// 逆序回退修订内的全部变更
    fn revert_revision(&mut self, id: RevId) -> Option<usize> {
        let mut pos = None;
        for i in (0..self.log[id].changes.len()).rev() {
            let c = self.log[id].changes[i];
            revision::swap_spans(&mut self.pieces, &c.new, &c.old);
            self.size = self.size - c.new.len + c.old.len;
            self.lines.borrow_mut().invalidate_from(c.pos);
            pos = Some(c.pos);
        }
        pos
    }

    /// 顺序重放修订内的全部变更
    fn apply_revision(&mut self, id: RevId) -> Option<usize> {
        let mut pos = None;
        for i in 0..self.log[id].changes.len() {
            let c = self.log[id].changes[i];
            revision::swap_spans(&mut self.pieces, &c.old, &c.new);
            self.size = self.size - c.old.len + c.new.len;
            self.lines.borrow_mut().invalidate_from(c.pos);
            pos = Some(c.pos + c.new.len.saturating_sub(c.old.len));
        }
        pos
    }
}

// ========== SIGBUS 辅助 ==========

impl Text {
    /// 地址是否属于本文本的内存映射区域
    ///
    /// 外部进程截断被映射的文件会让读取触发 SIGBUS；
    /// 进程级信号处理器据此判断故障是否可恢复。引擎自身不安装信号处理器。
    pub fn is_in_mapped_region(&self, addr: *const u8) -> bool {
        self.blocks.is_in_mapped_region(addr)
    }
}

/// 当前秒级时间戳
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
