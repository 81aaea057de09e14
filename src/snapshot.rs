use crate::{
    encoder,
    save::SaveData,
    storage::error::{describe, LoadError},
};

/// What the startup read produced. Replayed unchanged on every sync.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Loaded(SaveData),
    Failed { code: i32, message: String },
}

impl Snapshot {
    pub fn failed(code: i32, message: impl Into<String>) -> Self {
        Self::Failed {
            code,
            message: message.into(),
        }
    }

    /// Writes the success or error document, returning its length.
    pub fn encode(&self, out: &mut [u8]) -> usize {
        match self {
            Self::Loaded(save) => encoder::encode_response(save, out),
            Self::Failed { code, message } => encoder::encode_error(*code, message, out),
        }
    }

    /// One line for the operator screen.
    pub fn summary(&self) -> String {
        match self {
            Self::Loaded(save) => format!("Found {} profile(s)", save.profiles.len()),
            Self::Failed { code, .. } => format!("Error: {} ({code})", describe(*code)),
        }
    }
}

impl From<Result<SaveData, LoadError>> for Snapshot {
    fn from(res: Result<SaveData, LoadError>) -> Self {
        match res {
            Ok(save) => Self::Loaded(save),
            Err(e) => Self::failed(e.code(), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{save::error::DecodeError, storage::error::StorageError};

    #[test]
    fn test_from_load_error() {
        let snap = Snapshot::from(Err(LoadError::Storage(StorageError::Init(-1017))));
        assert_eq!(
            snap,
            Snapshot::failed(-1, "Flash filesystem init failed (error -1017)")
        );
        assert_eq!(snap.summary(), "Error: Initialization failed (-1)");
    }

    #[test]
    fn test_failed_encodes_error_document() {
        let snap = Snapshot::from(Err(LoadError::Decode(DecodeError::NoProfiles)));
        let mut buf = [0u8; 512];
        let len = snap.encode(&mut buf);
        let doc: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(doc["error"]["code"], -4);
        assert_eq!(doc["error"]["message"], DecodeError::NoProfiles.to_string());
    }
}
