// 保存管线
//
// 职责：把逻辑文本写回磁盘，支持原子改名、原地覆写与自动回退；
//       提交成功后隐式快照并记录已保存修订

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{TextError, TextResult};
use crate::text::Text;

/// 保存方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMethod {
    /// 先尝试原子保存，目录权限或文件类型不允许时回退为原地覆写
    Auto,
    /// 写入同目录临时文件后 rename 覆盖目标
    Atomic,
    /// 截断目标文件后重写；中途出错会留下残缺文件
    Inplace,
}

/// 一次保存会话
///
/// 由 `save_begin` 创建；会话存续期间独占文本，
/// 必须以 `commit` 或 `cancel` 收尾。
pub struct SaveSession<'a> {
    txt: &'a mut Text,
    path: PathBuf,
    dest: Dest,
}

enum Dest {
    Atomic { tmp: NamedTempFile },
    Inplace { file: File },
}

// ========== 保存入口 ==========

impl Text {
    /// 把全部内容保存到 path
    pub fn save(&mut self, path: &Path) -> TextResult<()> {
        let size = self.size();
        let mut session = self.save_begin(path, SaveMethod::Auto)?;
        session.write_range(0..size)?;
        session.commit()
    }

    /// 把指定范围保存到 path
    pub fn save_range(&mut self, range: Range<usize>, path: &Path) -> TextResult<()> {
        let mut session = self.save_begin(path, SaveMethod::Auto)?;
        session.write_range(range)?;
        session.commit()
    }

    /// 打开保存会话
    ///
    /// 可多次调用 `write_range` 写出不连续的范围。
    pub fn save_begin<'a>(&'a mut self, path: &Path, method: SaveMethod) -> TextResult<SaveSession<'a>> {
        let dest = match method {
            SaveMethod::Atomic => begin_atomic(path)?,
            SaveMethod::Inplace => begin_inplace(path)?,
            SaveMethod::Auto => match begin_atomic(path) {
                Ok(dest) => dest,
                Err(TextError::Unsupported) => {
                    warn!("目标不适合原子保存，回退为原地覆写: {:?}", path);
                    begin_inplace(path)?
                }
                Err(TextError::Io(err)) if err.kind() == ErrorKind::PermissionDenied => {
                    warn!("目录不可写，回退为原地覆写: {:?}", path);
                    begin_inplace(path)?
                }
                Err(err) => return Err(err),
            },
        };

        Ok(SaveSession {
            txt: self,
            path: path.to_path_buf(),
            dest,
        })
    }

    /// 把全部内容写入任意输出，返回写出的字节数
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        self.write_range_to(0..self.size(), writer)
    }

    /// 把指定范围写入任意输出
    pub fn write_range_to<W: Write>(&self, range: Range<usize>, writer: &mut W) -> io::Result<usize> {
        let mut written = 0;
        for chunk in self.chunks(range) {
            writer.write_all(chunk)?;
            written += chunk.len();
        }
        Ok(written)
    }
}

// ========== 保存会话 ==========

impl<'a> SaveSession<'a> {
    /// 把文本的一个字节范围写到目标的当前文件偏移处
    pub fn write_range(&mut self, range: Range<usize>) -> TextResult<usize> {
        if range.end < range.start || range.end > self.txt.size() {
            return Err(TextError::InvalidPosition { pos: range.end });
        }

        let writer: &mut dyn Write = match &mut self.dest {
            Dest::Atomic { tmp } => tmp.as_file_mut(),
            Dest::Inplace { file } => file,
        };
        let mut written = 0;
        for chunk in self.txt.chunks(range) {
            writer.write_all(chunk)?;
            written += chunk.len();
        }
        Ok(written)
    }

    /// 提交写入
    ///
    /// 原子方式在此刻 fsync 并 rename 覆盖目标；成功后隐式快照，
    /// 当前修订记为已保存，并刷新缓存的文件信息。
    pub fn commit(self) -> TextResult<()> {
        match self.dest {
            Dest::Atomic { tmp } => {
                tmp.as_file().sync_all()?;
                tmp.persist(&self.path).map_err(|e| TextError::Io(e.error))?;
                sync_parent_dir(&self.path);
            }
            Dest::Inplace { file } => {
                file.sync_all()?;
            }
        }

        self.txt.snapshot();
        self.txt.log.saved = self.txt.log.current;
        self.txt.stat = fs::metadata(&self.path).ok();
        debug!("保存完成: {:?}", self.path);
        Ok(())
    }

    /// 放弃本次保存并释放资源
    ///
    /// 原子方式会删除临时文件；原地覆写已写出的部分无法撤回。
    pub fn cancel(self) {
        drop(self);
    }
}

// ========== 目标准备 ==========

/// 在目标所在目录创建临时文件
///
/// 权限从既有目标复制，否则按进程 umask 取默认值。
/// 非常规文件（符号链接、设备、管道）与多硬链接文件拒绝原子保存：
/// rename 会替换 inode，破坏它们的关联。
fn begin_atomic(path: &Path) -> TextResult<Dest> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => {
            if !meta.file_type().is_file() {
                return Err(TextError::Unsupported);
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::MetadataExt;
                if meta.nlink() > 1 {
                    return Err(TextError::Unsupported);
                }
            }
            Some(meta)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => return Err(TextError::Io(err)),
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .tempfile_in(dir)?;

    #[cfg(unix)]
    {
        let perms = match &meta {
            Some(meta) => meta.permissions(),
            None => default_create_permissions(),
        };
        tmp.as_file().set_permissions(perms)?;
    }
    #[cfg(not(unix))]
    let _ = &meta;

    Ok(Dest::Atomic { tmp })
}

fn begin_inplace(path: &Path) -> TextResult<Dest> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    Ok(Dest::Inplace { file })
}

/// 新建文件的默认权限：0666 按进程 umask 掩掉
#[cfg(unix)]
fn default_create_permissions() -> fs::Permissions {
    use std::os::unix::fs::PermissionsExt;

    // 读 umask 只能通过设置再恢复
    let mask = unsafe { libc::umask(0) };
    unsafe { libc::umask(mask) };
    fs::Permissions::from_mode(0o666 & !(mask as u32))
}

/// 让目录项更新落盘；失败不影响保存结果
fn sync_parent_dir(path: &Path) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}
