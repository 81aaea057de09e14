use tracing::{debug, warn};

/// Cache lines are 32 bytes.
const CACHE_LINE_SHIFT: u32 = 5;

/// A byte pattern that identifies a spot in system software memory and
/// what to write relative to each match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub name: &'static str,
    pub pattern: &'static [u8],
    pub replacement: &'static [u8],
    pub offset: usize,
}

/// Makes the access-rights check in ES always grant elevated access, so it
/// survives a system software reload.
pub const ES_PRESERVE_ACCESS: Patch = Patch {
    name: "es_set_ahbprot",
    pattern: &[
        0x68, 0x5B, 0x22, 0xEC, 0x00, 0x52, 0x18, 0x9B, 0x68, 0x1B, 0x46, 0x98, 0x07, 0xDB,
    ],
    replacement: &[0x01],
    offset: 25,
};

/// Skips the permission check on flash filesystem opens.
pub const ISFS_PERMISSIONS: Patch = Patch {
    name: "isfs_permissions",
    pattern: &[0x42, 0x8B, 0xD0, 0x01, 0x25, 0x66],
    replacement: &[0xE0],
    offset: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    NotAttempted,
    Applied { sites: usize },
    NotFound,
}

impl PatchOutcome {
    pub fn from_sites(sites: usize) -> Self {
        match sites {
            0 => Self::NotFound,
            sites => Self::Applied { sites },
        }
    }

}

/// Writes `patch.replacement` at every match of `patch.pattern` in `window`
/// and returns where each replacement was written.
pub fn apply_patch(window: &mut [u8], patch: &Patch) -> Vec<usize> {
    let plen = patch.pattern.len();
    let rlen = patch.replacement.len();
    let mut sites = Vec::new();
    if plen == 0 || window.len() < plen {
        return sites;
    }

    for start in 0..=window.len() - plen {
        if window[start..start + plen] != *patch.pattern {
            continue;
        }
        let loc = start + patch.offset;
        let Some(target) = window.get_mut(loc..loc + rlen) else {
            warn!("{}: match at {start:#x} but target is past the window", patch.name);
            continue;
        };
        target.copy_from_slice(patch.replacement);
        debug!("{}: patched {loc:#x}", patch.name);
        sites.push(loc);
    }
    sites
}

/// Cache range covering a replacement written at `loc`.
pub fn flush_range(loc: usize, len: usize) -> (usize, usize) {
    let start = (loc >> CACHE_LINE_SHIFT) << CACHE_LINE_SHIFT;
    let len = ((len >> CACHE_LINE_SHIFT) << CACHE_LINE_SHIFT) + 64;
    (start, len)
}
