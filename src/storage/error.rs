use thiserror::Error;

use crate::save::error::{DecodeError, PARSE_ERROR_CODE};

pub const INIT_ERROR_CODE: i32 = -1;
pub const NOT_FOUND_ERROR_CODE: i32 = -2;
pub const READ_ERROR_CODE: i32 = -3;
pub const DECRYPT_ERROR_CODE: i32 = -5;
pub const MEMORY_ERROR_CODE: i32 = -6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Flash filesystem init failed (error {0})")]
    Init(i32),
    #[error("Save not found (flash error {code}). Tried {tried} paths. Last: {last}")]
    NotFound { code: i32, tried: usize, last: String },
    #[error("Failed to get file stats (error {0})")]
    Stat(i32),
    #[error("Failed to read save file (error {0})")]
    Read(i32),
    #[error("Short read on save file: got {got} of {expected} bytes")]
    ShortRead { expected: usize, got: usize },
    #[error("Failed to allocate {0} bytes")]
    Alloc(usize),
}

impl StorageError {
    pub fn code(&self) -> i32 {
        match self {
            Self::Init(_) => INIT_ERROR_CODE,
            Self::NotFound { .. } => NOT_FOUND_ERROR_CODE,
            Self::Stat(_) | Self::Read(_) | Self::ShortRead { .. } => READ_ERROR_CODE,
            Self::Alloc(_) => MEMORY_ERROR_CODE,
        }
    }
}

/// Anything that can stop the save from being loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Decode(#[from] DecodeError),
}

impl LoadError {
    pub fn code(&self) -> i32 {
        match self {
            Self::Storage(e) => e.code(),
            Self::Decode(e) => e.code(),
        }
    }
}

/// Short description of a load error code, for the operator screen.
pub fn describe(code: i32) -> &'static str {
    match code {
        0 => "Success",
        INIT_ERROR_CODE => "Initialization failed",
        NOT_FOUND_ERROR_CODE => "Save file not found",
        READ_ERROR_CODE => "Read error",
        PARSE_ERROR_CODE => "Parse error",
        DECRYPT_ERROR_CODE => "Decryption error",
        MEMORY_ERROR_CODE => "Memory allocation failed",
        _ => "Unknown error",
    }
}
