// 遍历层
//
// 职责：在 piece 链上按字节、码点、字素簇三种粒度双向游走，
//       并提供按块/按字节的流式迭代器

use std::ops::Range;

use unicode_segmentation::{GraphemeCursor, GraphemeIncomplete};

use crate::piece::{PieceId, TAIL};
use crate::text::Text;
use crate::GRAPHEME_WINDOW;

/// 文本游标
///
/// 持有当前 piece、片内偏移与全局字节位置；
/// 位于文本末尾时 piece 为尾哨兵。
#[derive(Debug, Clone)]
pub struct TextIterator<'a> {
    txt: &'a Text,
    piece: PieceId,
    off: usize,
    pos: usize,
}

impl Text {
    /// 定位到 pos 的游标；pos 超出文本时游标无效
    pub fn iterator(&self, pos: usize) -> TextIterator<'_> {
        let (piece, off) = if pos <= self.size() {
            self.locate(pos)
        } else {
            (TAIL, 0)
        };
        TextIterator {
            txt: self,
            piece,
            off,
            pos,
        }
    }

    /// 按 piece 切片流式读取指定范围
    pub fn chunks(&self, range: Range<usize>) -> Chunks<'_> {
        let start = range.start.min(self.size());
        let end = range.end.min(self.size()).max(start);
        let (piece, off) = self.locate(start);
        Chunks {
            txt: self,
            piece,
            off,
            remaining: end - start,
        }
    }

    /// 按字节流式读取指定范围
    pub fn bytes(&self, range: Range<usize>) -> Bytes<'_> {
        Bytes {
            chunks: self.chunks(range),
            cur: &[],
            idx: 0,
        }
    }
}

// ========== 字节粒度 ==========

impl<'a> TextIterator<'a> {
    /// 游标当前的全局字节位置
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// 游标是否有效（位于 [0, size] 内）
    pub fn valid(&self) -> bool {
        self.pos <= self.txt.size()
    }

    /// 读取当前位置的字节
    ///
    /// 位于文本末尾时读到 NUL（它不属于文件内容）。
    pub fn byte_get(&self) -> Option<u8> {
        if !self.valid() {
            return None;
        }
        if self.pos == self.txt.size() {
            return Some(0);
        }
        Some(self.read())
    }

    /// 读取当前位置的字符；"\r\n" 序列读作 '\n'
    pub fn char_get(&self) -> Option<u8> {
        let b = self.byte_get()?;
        if b == b'\r' && self.txt.byte_get(self.pos + 1) == Some(b'\n') {
            Some(b'\n')
        } else {
            Some(b)
        }
    }

    /// 前进一个字节并读取新位置
    pub fn byte_next(&mut self) -> Option<u8> {
        if !self.valid() || self.pos >= self.txt.size() {
            return None;
        }
        self.pos += 1;
        self.off += 1;
        self.normalize();
        self.byte_get()
    }

    /// 后退一个字节并读取新位置
    pub fn byte_prev(&mut self) -> Option<u8> {
        if !self.valid() || self.pos == 0 {
            return None;
        }
        if self.off == 0 {
            let prev = self.txt.pieces[self.piece].prev;
            self.piece = prev;
            self.off = self.txt.pieces[prev].len;
        }
        self.off -= 1;
        self.pos -= 1;
        Some(self.read())
    }

    /// 跨 piece 边界归一化游标
    fn normalize(&mut self) {
        while self.piece != TAIL && self.off >= self.txt.pieces[self.piece].len {
            self.off -= self.txt.pieces[self.piece].len;
            self.piece = self.txt.pieces[self.piece].next;
        }
    }

    fn read(&self) -> u8 {
        let p = self.txt.pieces[self.piece];
        self.txt.blocks.slice(p.block, p.off + self.off, 1)[0]
    }

    /// 重新定位到指定位置
    fn set_pos(&mut self, pos: usize) {
        let (piece, off) = self.txt.locate(pos);
        self.piece = piece;
        self.off = off;
        self.pos = pos;
    }
}

// ========== 码点粒度 ==========

impl<'a> TextIterator<'a> {
    /// 前进到下一个 UTF-8 码点起始字节并读取
    pub fn codepoint_next(&mut self) -> Option<u8> {
        loop {
            let b = self.byte_next()?;
            if b & 0xC0 != 0x80 {
                return Some(b);
            }
        }
    }

    /// 后退到上一个 UTF-8 码点起始字节并读取
    pub fn codepoint_prev(&mut self) -> Option<u8> {
        loop {
            let b = self.byte_prev()?;
            if b & 0xC0 != 0x80 || self.pos == 0 {
                return Some(b);
            }
        }
    }
}

// ========== 字素簇粒度 ==========

impl<'a> TextIterator<'a> {
    /// 前进一个字素簇（可能跨越多个码点）并读取首字节
    pub fn char_next(&mut self) -> Option<u8> {
        if !self.valid() || self.pos >= self.txt.size() {
            return None;
        }
        match self.grapheme_boundary(Direction::Next) {
            Some(boundary) => {
                self.set_pos(boundary);
                self.byte_get()
            }
            // 周边字节不是合法 UTF-8：退化为按码点移动
            None => self.codepoint_next(),
        }
    }

    /// 后退一个字素簇并读取首字节
    pub fn char_prev(&mut self) -> Option<u8> {
        if !self.valid() || self.pos == 0 {
            return None;
        }
        match self.grapheme_boundary(Direction::Prev) {
            Some(boundary) => {
                self.set_pos(boundary);
                self.byte_get()
            }
            None => self.codepoint_prev(),
        }
    }

    /// 以当前位置为基准查找相邻字素簇边界
    ///
    /// 在游标附近取一段窗口交给分段算法；窗口不足时逐步加宽。
    fn grapheme_boundary(&self, dir: Direction) -> Option<usize> {
        let size = self.txt.size();
        let mut ws = self.pos.saturating_sub(GRAPHEME_WINDOW);
        let mut we = (self.pos + GRAPHEME_WINDOW).min(size);

        loop {
            let window = self.txt.content(ws..we);
            let (start, s) = utf8_window(&window, ws)?;
            if self.pos < start || self.pos > start + s.len() {
                return None;
            }

            let mut cursor = GraphemeCursor::new(self.pos, size, true);
            let result = match dir {
                Direction::Next => cursor.next_boundary(s, start),
                Direction::Prev => cursor.prev_boundary(s, start),
            };
            match result {
                Ok(boundary) => return boundary,
                Err(GraphemeIncomplete::NextChunk) => {
                    if we >= size {
                        return None;
                    }
                    we = (we + GRAPHEME_WINDOW).min(size);
                }
                Err(GraphemeIncomplete::PreContext(_)) | Err(GraphemeIncomplete::PrevChunk) => {
                    if ws == 0 {
                        return None;
                    }
                    ws = ws.saturating_sub(GRAPHEME_WINDOW);
                }
                Err(_) => return None,
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Next,
    Prev,
}

/// 把窗口首尾对齐到码点边界后按 UTF-8 解析
///
/// 返回 (对齐后的全局起点, 字符串)；窗口内容不是合法 UTF-8 时返回 None。
fn utf8_window(bytes: &[u8], base: usize) -> Option<(usize, &str)> {
    let mut start = 0;
    while start < bytes.len() && start < 4 && bytes[start] & 0xC0 == 0x80 {
        start += 1;
    }

    let mut end = bytes.len();
    // 截掉末尾未完结的码点
    for back in 1..=4.min(end - start) {
        let idx = end - back;
        let b = bytes[idx];
        if b & 0xC0 != 0x80 {
            let expect = match b {
                _ if b & 0x80 == 0 => 1,
                _ if b & 0xE0 == 0xC0 => 2,
                _ if b & 0xF0 == 0xE0 => 3,
                _ => 4,
            };
            if idx + expect > end {
                end = idx;
            }
            break;
        }
    }

    std::str::from_utf8(&bytes[start..end])
        .ok()
        .map(|s| (base + start, s))
}

// ========== 流式迭代器 ==========

/// 按 piece 切片迭代一段范围
pub struct Chunks<'a> {
    txt: &'a Text,
    piece: PieceId,
    off: usize,
    remaining: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        while self.remaining > 0 && self.piece != TAIL {
            let p = self.txt.pieces[self.piece];
            let take = (p.len - self.off).min(self.remaining);
            let slice = self.txt.blocks.slice(p.block, p.off + self.off, take);
            self.piece = p.next;
            self.off = 0;
            self.remaining -= take;
            if !slice.is_empty() {
                return Some(slice);
            }
        }
        None
    }
}

/// 按字节迭代一段范围
pub struct Bytes<'a> {
    chunks: Chunks<'a>,
    cur: &'a [u8],
    idx: usize,
}

impl<'a> Iterator for Bytes<'a> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        loop {
            if self.idx < self.cur.len() {
                let b = self.cur[self.idx];
                self.idx += 1;
                return Some(b);
            }
            self.cur = self.chunks.next()?;
            self.idx = 0;
        }
    }
}
