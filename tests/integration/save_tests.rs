// 保存管线集成测试：原子保存、原地覆写与自动回退

use std::fs;

use tempfile::tempdir;
use ztext::{SaveMethod, Text, TextError};

#[test]
fn test_atomic_save_roundtrip() {
    crate::init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("note.txt");
    fs::write(&path, "hello world\n").unwrap();

    let mut txt = Text::load(Some(&path)).unwrap();
    assert_eq!(txt.size(), 12);
    assert!(!txt.modified());

    txt.insert(5, b",").unwrap();
    assert!(txt.modified());

    txt.save(&path).unwrap();
    assert!(!txt.modified());
    assert_eq!(fs::read(&path).unwrap(), b"hello, world\n");

    // 重新加载得到完全相同的内容
    let again = Text::load(Some(&path)).unwrap();
    assert_eq!(again.content(0..again.size()), b"hello, world\n");
}

#[cfg(unix)]
#[test]
fn test_atomic_save_preserves_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let path = dir.path().join("secret.txt");
    fs::write(&path, "old").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

    let mut txt = Text::load(Some(&path)).unwrap();
    txt.insert(3, b" new").unwrap();
    txt.save(&path).unwrap();

    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
    assert_eq!(fs::read(&path).unwrap(), b"old new");
}

#[test]
fn test_save_creates_new_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fresh.txt");

    let mut txt = Text::new();
    txt.insert(0, b"brand new").unwrap();
    txt.save(&path).unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"brand new");
    // 保存后记录了文件信息
    assert!(txt.stat().is_some());
}

#[test]
fn test_save_range() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("part.txt");

    let mut txt = Text::new();
    txt.insert(0, b"hello world").unwrap();
    txt.save_range(6..11, &path).unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"world");
}

#[test]
fn test_save_session_multiple_ranges() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("joined.txt");

    let mut txt = Text::new();
    txt.insert(0, b"hello world").unwrap();
    let size = txt.size();

    let mut session = txt.save_begin(&path, SaveMethod::Atomic).unwrap();
    assert_eq!(session.write_range(6..size).unwrap(), 5);
    assert_eq!(session.write_range(5..6).unwrap(), 1);
    assert_eq!(session.write_range(0..5).unwrap(), 5);
    session.commit().unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"world hello");
}

#[test]
fn test_save_session_rejects_bad_range() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.txt");

    let mut txt = Text::new();
    txt.insert(0, b"abc").unwrap();

    let mut session = txt.save_begin(&path, SaveMethod::Atomic).unwrap();
    assert!(matches!(
        session.write_range(0..9),
        Err(TextError::InvalidPosition { .. })
    ));
    session.cancel();
}

#[test]
fn test_cancel_leaves_target_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.txt");
    fs::write(&path, "original").unwrap();

    let mut txt = Text::new();
    txt.insert(0, b"replacement").unwrap();

    let size = txt.size();
    let mut session = txt.save_begin(&path, SaveMethod::Atomic).unwrap();
    session.write_range(0..size).unwrap();
    session.cancel();

    // 目标原样，临时文件已清理
    assert_eq!(fs::read(&path).unwrap(), b"original");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    // 取消不算保存
    assert!(txt.modified());
}

#[test]
fn test_inplace_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.txt");
    fs::write(&path, "before with some length").unwrap();

    let mut txt = Text::new();
    txt.insert(0, b"after").unwrap();

    let size = txt.size();
    let mut session = txt.save_begin(&path, SaveMethod::Inplace).unwrap();
    session.write_range(0..size).unwrap();
    session.commit().unwrap();

    // 截断后重写：旧的长内容不残留
    assert_eq!(fs::read(&path).unwrap(), b"after");
}

#[cfg(unix)]
#[test]
fn test_atomic_refuses_symlink() {
    let dir = tempdir().unwrap();
    let real = dir.path().join("real.txt");
    let link = dir.path().join("link.txt");
    fs::write(&real, "content").unwrap();
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let mut txt = Text::new();
    txt.insert(0, b"x").unwrap();

    assert!(matches!(
        txt.save_begin(&link, SaveMethod::Atomic),
        Err(TextError::Unsupported)
    ));
}

#[cfg(unix)]
#[test]
fn test_auto_falls_back_to_inplace_for_symlink() {
    let dir = tempdir().unwrap();
    let real = dir.path().join("real.txt");
    let link = dir.path().join("link.txt");
    fs::write(&real, "content").unwrap();
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let mut txt = Text::new();
    txt.insert(0, b"updated").unwrap();
    txt.save(&link).unwrap();

    // 原地覆写穿过符号链接：链接保持，指向的文件被更新
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read(&real).unwrap(), b"updated");
}

#[cfg(unix)]
#[test]
fn test_atomic_refuses_hardlinked_file() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "shared").unwrap();
    fs::hard_link(&a, &b).unwrap();

    let mut txt = Text::new();
    txt.insert(0, b"x").unwrap();

    assert!(matches!(
        txt.save_begin(&a, SaveMethod::Atomic),
        Err(TextError::Unsupported)
    ));
}

#[test]
fn test_write_to() {
    let mut txt = Text::new();
    txt.insert(0, b"streamed output").unwrap();

    let mut out = Vec::new();
    let written = txt.write_to(&mut out).unwrap();
    assert_eq!(written, 15);
    assert_eq!(out, b"streamed output");

    let mut out = Vec::new();
    txt.write_range_to(0..8, &mut out).unwrap();
    assert_eq!(out, b"streamed");
}

#[test]
fn test_load_missing_file_starts_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.txt");

    let txt = Text::load(Some(&path)).unwrap();
    assert!(txt.is_empty());
    assert!(txt.stat().is_none());
    assert!(!txt.modified());
}

#[test]
fn test_load_directory_fails() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        Text::load(Some(dir.path())),
        Err(TextError::Io(_))
    ));
}

#[test]
fn test_load_empty_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.txt");
    fs::write(&path, "").unwrap();

    let txt = Text::load(Some(&path)).unwrap();
    assert!(txt.is_empty());
    assert!(txt.stat().is_some());
}

#[test]
fn test_mapped_region_query() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mapped.txt");
    fs::write(&path, "mapped content").unwrap();

    let txt = Text::load(Some(&path)).unwrap();
    assert!(!txt.is_in_mapped_region(std::ptr::null()));

    let empty = Text::new();
    assert!(!empty.is_in_mapped_region(std::ptr::null()));
}

#[test]
fn test_save_takes_implicit_snapshot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snap.txt");

    let mut txt = Text::new();
    txt.insert(0, b"first").unwrap();
    txt.save(&path).unwrap();

    // 保存封存了修订：继续编辑后可以撤销回已保存状态
    txt.insert(5, b" second").unwrap();
    txt.snapshot();
    txt.undo();
    assert_eq!(txt.content(0..txt.size()), b"first");
    assert!(!txt.modified());
}
