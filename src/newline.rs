// 换行符处理
//
// 职责：按文件首个行终止符判定换行类型，并按该类型插入换行

use crate::error::TextResult;
use crate::text::Text;

/// 文件使用的换行符类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewlineType {
    Lf,
    Crlf,
}

impl NewlineType {
    /// 对应的换行字符串
    pub fn as_str(self) -> &'static str {
        match self {
            NewlineType::Lf => "\n",
            NewlineType::Crlf => "\r\n",
        }
    }
}

impl Text {
    /// 文件的换行符类型
    ///
    /// 首次调用时扫描到第一个换行符为止并缓存结果；
    /// 没有换行符时默认 LF。
    pub fn newline_type(&self) -> NewlineType {
        if let Some(t) = self.newline.get() {
            return t;
        }

        let mut detected = NewlineType::Lf;
        let mut prev = 0u8;
        'scan: for chunk in self.chunks(0..self.size()) {
            for &b in chunk {
                if b == b'\n' {
                    if prev == b'\r' {
                        detected = NewlineType::Crlf;
                    }
                    break 'scan;
                }
                prev = b;
            }
        }

        self.newline.set(Some(detected));
        detected
    }

    /// 换行字符串
    pub fn newline_char(&self) -> &'static str {
        self.newline_type().as_str()
    }

    /// 按文件的换行类型在 pos 处插入换行，返回换行之后的位置
    pub fn insert_newline(&mut self, pos: usize) -> TextResult<usize> {
        let nl = self.newline_char();
        self.insert(pos, nl.as_bytes())?;
        Ok(pos + nl.len())
    }
}
