use std::{
    collections::HashMap,
    fs::File,
    io::{self, Read},
    path::PathBuf,
};

use tracing::debug;

use crate::storage::{Fd, FlashFs};

/// Flash filesystem error codes.
pub const ISFS_EACCES: i32 = -102;
pub const ISFS_EINVAL: i32 = -101;
pub const ISFS_ENOENT: i32 = -106;
pub const ISFS_EIO: i32 = -1;

/// A host directory standing in for the root of the flash filesystem.
/// `/title/...` opens `<root>/title/...`.
pub struct DirFlash {
    root: PathBuf,
    open: HashMap<i32, File>,
    next_fd: i32,
}

impl DirFlash {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: HashMap::new(),
            next_fd: 0,
        }
    }

    fn file(&mut self, fd: Fd) -> Result<&mut File, i32> {
        self.open.get_mut(&fd.0).ok_or(ISFS_EINVAL)
    }
}

fn isfs_code(e: &io::Error) -> i32 {
    match e.kind() {
        io::ErrorKind::NotFound => ISFS_ENOENT,
        io::ErrorKind::PermissionDenied => ISFS_EACCES,
        _ => ISFS_EIO,
    }
}

impl FlashFs for DirFlash {
    fn initialize(&mut self) -> Result<(), i32> {
        match self.root.metadata() {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ISFS_EINVAL),
            Err(e) => Err(isfs_code(&e)),
        }
    }

    fn open(&mut self, path: &str) -> Result<Fd, i32> {
        let file = File::open(self.root.join(path.trim_start_matches('/'))).map_err(|e| isfs_code(&e))?;
        self.next_fd += 1;
        self.open.insert(self.next_fd, file);
        Ok(Fd(self.next_fd))
    }

    fn file_len(&mut self, fd: Fd) -> Result<u32, i32> {
        let meta = self.file(fd)?.metadata().map_err(|e| isfs_code(&e))?;
        u32::try_from(meta.len()).map_err(|_| ISFS_EINVAL)
    }

    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, i32> {
        self.file(fd)?.read(buf).map_err(|e| isfs_code(&e))
    }

    fn close(&mut self, fd: Fd) {
        self.open.remove(&fd.0);
    }

    fn deinitialize(&mut self) {
        if !self.open.is_empty() {
            debug!("closing {} leftover file(s)", self.open.len());
        }
        self.open.clear();
    }
}
