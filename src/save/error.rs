use thiserror::Error;

pub const PARSE_ERROR_CODE: i32 = -4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("field `{name}` ends at {end:#x}, past the profile slot ({slot_size:#x})")]
    FieldOutOfSlot {
        name: &'static str,
        end: usize,
        slot_size: usize,
    },
    #[error("field `{name}` offset plus width overflows")]
    Overflow { name: &'static str },
    #[error("region `{name}` has a zero stride")]
    ZeroStride { name: &'static str },
    #[error("region `{name}` ends at {end:#x}, before it starts at {offset:#x}")]
    EmptyRegion {
        name: &'static str,
        offset: usize,
        end: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("No profiles found in save file")]
    NoProfiles,
    #[error("invalid save layout: {0}")]
    Layout(#[from] LayoutError),
}

impl DecodeError {
    pub fn code(&self) -> i32 {
        PARSE_ERROR_CODE
    }
}
