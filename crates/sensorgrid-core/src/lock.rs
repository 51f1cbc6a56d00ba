//! 资源锁（文件锁实现的跨进程互斥）
//!
//! 每个物理资源一个锁文件：`<lock-root>/<resource>.lock`，总线类一个
//! （`i2c`、`serial`），激活引脚每脚一个（`gpio<N>`）。锁由 OS 文件锁
//! 语义保证：持有进程死亡后锁自动可回收，无需额外的崩溃恢复。
//!
//! 释放是显式的（`release()` 在所有路径上调用），`Drop` 只作兜底。

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::trace;

/// 命名硬件资源的跨进程互斥锁
pub struct ResourceLock {
    path: PathBuf,
    file: Option<File>,
    held: bool,
}

impl ResourceLock {
    /// 资源 `resource` 的锁，锁文件位于 `<root>/<resource>.lock`
    ///
    /// 文件和父目录在首次 `acquire` 时按需创建。
    pub fn new(root: impl AsRef<Path>, resource: &str) -> Self {
        Self {
            path: root.as_ref().join(format!("{resource}.lock")),
            file: None,
            held: false,
        }
    }

    /// 阻塞直到获得独占所有权
    ///
    /// 对进程生命周期幂等：已持有时直接返回。同一持有者不得依赖
    /// 递归获取，配对的 acquire/release 由调用方负责。
    pub fn acquire(&mut self) -> io::Result<()> {
        if self.held {
            return Ok(());
        }
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&self.path)?;
            self.file = Some(file);
        }
        // 此处 file 一定存在；None 分支在上面刚刚填充
        if let Some(file) = &self.file {
            file.lock_exclusive()?;
        }
        self.held = true;
        trace!(path = %self.path.display(), "acquired resource lock");
        Ok(())
    }

    /// 释放所有权；未持有时为 no-op
    pub fn release(&mut self) -> io::Result<()> {
        if !self.held {
            return Ok(());
        }
        if let Some(file) = &self.file {
            file.unlock()?;
        }
        self.held = false;
        trace!(path = %self.path.display(), "released resource lock");
        Ok(())
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        // 兜底：正常路径上 release() 已经显式调用过
        let _ = self.release();
    }
}
