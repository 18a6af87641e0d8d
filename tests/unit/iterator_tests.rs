// 游标遍历测试：字节、码点、字素簇

use ztext::Text;

/// 造出跨多个 piece 的文本
fn fragmented(parts: &[&str]) -> Text {
    let mut txt = Text::new();
    for part in parts {
        let pos = txt.size();
        txt.insert(pos, part.as_bytes()).unwrap();
        txt.snapshot();
    }
    txt
}

#[test]
fn test_forward_byte_traversal() {
    let txt = fragmented(&["hello", " ", "world"]);
    let mut it = txt.iterator(0);

    let mut collected = vec![it.byte_get().unwrap()];
    loop {
        match it.byte_next() {
            Some(0) if it.pos() == txt.size() => break,
            Some(b) => collected.push(b),
            None => panic!("遍历应在文本末尾结束"),
        }
    }
    assert_eq!(collected, b"hello world");

    // 末尾之后不再前进
    assert_eq!(it.byte_next(), None);
}

#[test]
fn test_reverse_byte_traversal() {
    let txt = fragmented(&["hello", " ", "world"]);
    let mut it = txt.iterator(txt.size());

    assert_eq!(it.byte_get(), Some(0));
    let mut collected = Vec::new();
    while let Some(b) = it.byte_prev() {
        collected.push(b);
    }
    collected.reverse();
    assert_eq!(collected, b"hello world");
    assert_eq!(it.pos(), 0);
}

#[test]
fn test_iterator_from_middle() {
    let txt = fragmented(&["abc", "def"]);
    let mut it = txt.iterator(2);

    assert_eq!(it.byte_get(), Some(b'c'));
    assert_eq!(it.byte_next(), Some(b'd'));
    assert_eq!(it.byte_prev(), Some(b'c'));
}

#[test]
fn test_iterator_invalid_position() {
    let txt = fragmented(&["abc"]);
    let it = txt.iterator(10);

    assert!(!it.valid());
    assert_eq!(it.byte_get(), None);
}

#[test]
fn test_codepoint_traversal() {
    // a(1) é(2) 世(3) 🎉(4)
    let txt = fragmented(&["aé", "世🎉"]);
    let mut it = txt.iterator(0);

    assert_eq!(it.codepoint_next(), Some(0xC3)); // é 的首字节
    assert_eq!(it.pos(), 1);
    assert_eq!(it.codepoint_next(), Some(0xE4)); // 世 的首字节
    assert_eq!(it.pos(), 3);
    assert_eq!(it.codepoint_next(), Some(0xF0)); // 🎉 的首字节
    assert_eq!(it.pos(), 6);
    // 最后一步落在文本末尾，读到 NUL
    assert_eq!(it.codepoint_next(), Some(0));
    assert_eq!(it.pos(), 10);

    assert_eq!(it.codepoint_prev(), Some(0xF0));
    assert_eq!(it.pos(), 6);
    assert_eq!(it.codepoint_prev(), Some(0xE4));
    assert_eq!(it.pos(), 3);
    assert_eq!(it.codepoint_prev(), Some(0xC3));
    assert_eq!(it.pos(), 1);
    assert_eq!(it.codepoint_prev(), Some(b'a'));
    assert_eq!(it.pos(), 0);
    assert_eq!(it.codepoint_prev(), None);
}

#[test]
fn test_grapheme_combining_mark() {
    // e + U+0301 组合重音：一个字素簇
    let txt = fragmented(&["e\u{0301}x"]);
    let mut it = txt.iterator(0);

    assert_eq!(it.char_next(), Some(b'x'));
    assert_eq!(it.pos(), 3);

    assert_eq!(it.char_prev(), Some(b'e'));
    assert_eq!(it.pos(), 0);
}

#[test]
fn test_grapheme_regional_indicators() {
    // 两面旗帜：四个码点，两个字素簇
    let txt = fragmented(&["\u{1F1FA}\u{1F1F8}\u{1F1EB}\u{1F1F7}"]);
    let mut it = txt.iterator(0);

    assert_eq!(it.pos(), 0);
    it.char_next().unwrap();
    assert_eq!(it.pos(), 8);
    assert_eq!(it.char_next(), Some(0));
    assert_eq!(it.pos(), 16);

    it.char_prev().unwrap();
    assert_eq!(it.pos(), 8);
    it.char_prev().unwrap();
    assert_eq!(it.pos(), 0);
}

#[test]
fn test_grapheme_zwj_sequence() {
    // 家庭 emoji：ZWJ 串成一个字素簇
    let txt = fragmented(&["\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F467}end"]);
    let mut it = txt.iterator(0);

    assert_eq!(it.char_next(), Some(b'e'));
    assert_eq!(it.pos(), 18);
}

#[test]
fn test_grapheme_crosses_piece_boundary() {
    // 组合重音被 piece 边界拆开
    let txt = fragmented(&["e", "\u{0301}tail"]);
    let mut it = txt.iterator(0);

    assert_eq!(it.char_next(), Some(b't'));
    assert_eq!(it.pos(), 3);
}

#[test]
fn test_crlf_single_grapheme() {
    let txt = fragmented(&["a\r\nb"]);
    let mut it = txt.iterator(1);

    // \r\n 是一个字素簇
    assert_eq!(it.char_next(), Some(b'b'));
    assert_eq!(it.pos(), 3);
}

#[test]
fn test_char_get_crlf() {
    let txt = fragmented(&["a\r", "\nb"]);

    let it = txt.iterator(1);
    assert_eq!(it.char_get(), Some(b'\n'));
    assert_eq!(it.byte_get(), Some(b'\r'));

    let it = txt.iterator(3);
    assert_eq!(it.char_get(), Some(b'b'));
}

#[test]
fn test_bytes_and_chunks_adapters() {
    let txt = fragmented(&["hello", " ", "world"]);

    let joined: Vec<u8> = txt.chunks(0..txt.size()).fold(Vec::new(), |mut acc, c| {
        acc.extend_from_slice(c);
        acc
    });
    assert_eq!(joined, b"hello world");

    let bytes: Vec<u8> = txt.bytes(3..8).collect();
    assert_eq!(bytes, b"lo wo");

    assert_eq!(txt.bytes(0..txt.size()).count(), 11);
    assert_eq!(txt.bytes(5..5).count(), 0);
}
