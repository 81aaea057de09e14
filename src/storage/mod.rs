//! Reads the save object out of the console's internal flash.
//!
//! Needs elevated hardware access. The sequencer drives this before the
//! system software reload and must call [`SaveReader::release`] first.

pub mod aligned;
pub mod error;

use aligned::AlignedBuf;
use error::{LoadError, StorageError};
use tracing::{debug, info, span, warn, Level};

use crate::save::{self, layout::SaveLayout, SaveData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fd(pub i32);

/// Raw flash filesystem calls. Errors are the platform's negative codes.
pub trait FlashFs {
    fn initialize(&mut self) -> Result<(), i32>;
    fn open(&mut self, path: &str) -> Result<Fd, i32>;
    fn file_len(&mut self, fd: Fd) -> Result<u32, i32>;
    /// Reads up to `buf.len()` bytes, returning how many were read.
    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, i32>;
    fn close(&mut self, fd: Fd);
    fn deinitialize(&mut self);
}

/// Known save locations, in search order. The file name and title id
/// changed between the original game, the Plus release, and its channel.
pub const SAVE_PATHS: &[&str] = &[
    "/title/00010000/5246504a/data/FitPlus0.dat",
    "/title/00010000/52465045/data/FitPlus0.dat",
    "/title/00010000/52465050/data/FitPlus0.dat",
    "/title/00010000/5246504A/data/FitPlus0.dat",
    "/title/00010000/5246504a/data/RPHealth.dat",
    "/title/00010000/52465045/data/RPHealth.dat",
    "/title/00010000/52465050/data/RPHealth.dat",
    "/title/00010004/5246504a/data/FitPlus0.dat",
    "/title/00010004/52465045/data/FitPlus0.dat",
    "/title/00010000/52464e4a/data/RPHealth.dat",
    "/title/00010000/52464e45/data/RPHealth.dat",
    "/title/00010000/52464e50/data/RPHealth.dat",
];

pub fn default_save_paths() -> Vec<String> {
    SAVE_PATHS.iter().map(|p| p.to_string()).collect()
}

/// The save object exactly as read from flash.
pub struct SaveBlob {
    pub path: String,
    pub data: AlignedBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub path: String,
    /// `Ok` if the path opened, otherwise the open error
    pub result: Result<(), i32>,
}

pub struct SaveReader<F: FlashFs> {
    fs: F,
    initialized: bool,
    last_tried: Option<String>,
}

impl<F: FlashFs> SaveReader<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            initialized: false,
            last_tried: None,
        }
    }

    pub fn init(&mut self) -> Result<(), StorageError> {
        if self.initialized {
            return Ok(());
        }
        self.fs.initialize().map_err(StorageError::Init)?;
        self.initialized = true;
        Ok(())
    }

    /// Last candidate path an open was attempted on.
    pub fn last_tried(&self) -> Option<&str> {
        self.last_tried.as_deref()
    }

    /// Opens the first candidate that exists and reads it completely.
    pub fn read_blob(&mut self, candidates: &[String]) -> Result<SaveBlob, StorageError> {
        let span = span!(Level::INFO, "Storage");
        let _enter = span.enter();

        self.init()?;

        let mut last_code = 0;
        let mut found = None;
        for path in candidates {
            self.last_tried = Some(path.clone());
            match self.fs.open(path) {
                Ok(fd) => {
                    found = Some((fd, path.clone()));
                    break;
                }
                Err(code) => {
                    debug!("{path}: {code}");
                    last_code = code;
                }
            }
        }

        let Some((fd, path)) = found else {
            return Err(StorageError::NotFound {
                code: last_code,
                tried: candidates.len(),
                last: self.last_tried.clone().unwrap_or_else(|| "none".to_string()),
            });
        };
        info!("opened {path}");

        let res = self.read_open(fd);
        self.fs.close(fd);
        let data = res?;

        info!("read {} bytes", data.len());
        Ok(SaveBlob { path, data })
    }

    fn read_open(&mut self, fd: Fd) -> Result<AlignedBuf, StorageError> {
        let size = self.fs.file_len(fd).map_err(StorageError::Stat)? as usize;
        let mut data = AlignedBuf::try_zeroed(size).ok_or(StorageError::Alloc(size))?;

        let buf = data.as_mut_slice();
        let mut filled = 0;
        while filled < size {
            let n = self.fs.read(fd, &mut buf[filled..]).map_err(StorageError::Read)?;
            if n == 0 {
                return Err(StorageError::ShortRead {
                    expected: size,
                    got: filled,
                });
            }
            filled += n.min(size - filled);
        }
        Ok(data)
    }

    /// Reads and decodes the save. The blob is dropped before returning.
    pub fn load(&mut self, candidates: &[String], layout: &SaveLayout) -> Result<SaveData, LoadError> {
        let blob = match self.read_blob(candidates) {
            Ok(blob) => blob,
            Err(e) => {
                if matches!(e, StorageError::NotFound { .. }) {
                    self.log_probe(candidates);
                }
                return Err(e.into());
            }
        };
        Ok(save::decode(blob.data.as_slice(), layout)?)
    }

    /// Tries to open every candidate and reports which exist.
    pub fn probe(&mut self, candidates: &[String]) -> Vec<Probe> {
        if self.init().is_err() {
            return Vec::new();
        }
        candidates
            .iter()
            .map(|path| {
                let result = self.fs.open(path).map(|fd| self.fs.close(fd));
                Probe {
                    path: path.clone(),
                    result,
                }
            })
            .collect()
    }

    fn log_probe(&mut self, candidates: &[String]) {
        for probe in self.probe(candidates) {
            match probe.result {
                Ok(()) => info!("FOUND: {}", probe.path),
                Err(code) => warn!("[{code}] {}", probe.path),
            }
        }
    }

    /// Shuts the flash filesystem down. Safe to call more than once.
    pub fn release(&mut self) {
        if self.initialized {
            self.fs.deinitialize();
            self.initialized = false;
        }
    }
}

impl<F: FlashFs> Drop for SaveReader<F> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::{cell::RefCell, collections::HashMap, rc::Rc};

    use super::{FlashFs, Fd};

    /// Shared call log, so ordering can be checked across fakes.
    pub type CallLog = Rc<RefCell<Vec<String>>>;

    pub const ENOENT: i32 = -106;

    #[derive(Default)]
    pub struct MemFlash {
        pub files: HashMap<String, Vec<u8>>,
        pub open: HashMap<i32, (String, usize)>,
        pub next_fd: i32,
        pub init_error: Option<i32>,
        pub read_error: Option<i32>,
        /// bytes handed out per read call
        pub read_chunk: Option<usize>,
        pub log: CallLog,
    }

    impl MemFlash {
        pub fn with_file(path: &str, data: Vec<u8>) -> Self {
            let mut fs = Self::default();
            fs.files.insert(path.to_string(), data);
            fs
        }

        fn record(&self, call: String) {
            self.log.borrow_mut().push(call);
        }
    }

    impl FlashFs for MemFlash {
        fn initialize(&mut self) -> Result<(), i32> {
            self.record("flash.init".to_string());
            self.init_error.map_or(Ok(()), Err)
        }

        fn open(&mut self, path: &str) -> Result<Fd, i32> {
            self.record(format!("flash.open {path}"));
            if !self.files.contains_key(path) {
                return Err(ENOENT);
            }
            self.next_fd += 1;
            self.open.insert(self.next_fd, (path.to_string(), 0));
            Ok(Fd(self.next_fd))
        }

        fn file_len(&mut self, fd: Fd) -> Result<u32, i32> {
            let (path, _) = self.open.get(&fd.0).ok_or(-4)?;
            Ok(self.files[path].len() as u32)
        }

        fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, i32> {
            self.record("flash.read".to_string());
            if let Some(code) = self.read_error {
                return Err(code);
            }
            let (path, pos) = self.open.get_mut(&fd.0).ok_or(-4)?;
            let data = &self.files[path.as_str()];
            let mut n = buf.len().min(data.len() - *pos);
            if let Some(chunk) = self.read_chunk {
                n = n.min(chunk);
            }
            buf[..n].copy_from_slice(&data[*pos..*pos + n]);
            *pos += n;
            Ok(n)
        }

        fn close(&mut self, fd: Fd) {
            self.record("flash.close".to_string());
            self.open.remove(&fd.0);
        }

        fn deinitialize(&mut self) {
            self.record("flash.deinit".to_string());
        }
    }
}
