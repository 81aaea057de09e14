use std::{fs, io, net::Ipv4Addr, path::Path};

use tracing::{debug, info};

use crate::{config::HostConfig, sequencer::SystemControl};

const DEFAULT_WINDOW: usize = 0x10000;

/// Stands in for the console's system software. The patch window is either a
/// memory dump loaded from disk or zeroed memory.
pub struct SimulatedSystem {
    elevated: bool,
    version: u32,
    window: Vec<u8>,
    address: Ipv4Addr,
    reloads: usize,
}

impl SimulatedSystem {
    pub fn new(cfg: &HostConfig) -> io::Result<Self> {
        let window = match &cfg.memory_image {
            Some(path) => load_image(path)?,
            None => vec![0; DEFAULT_WINDOW],
        };
        Ok(Self {
            elevated: cfg.elevated,
            version: cfg.firmware_version,
            window,
            address: cfg.address,
            reloads: 0,
        })
    }

    pub fn window(&self) -> &[u8] {
        &self.window
    }

}

fn load_image(path: &Path) -> io::Result<Vec<u8>> {
    let bytes = fs::read(path)?;
    info!("loaded {} byte memory image from {}", bytes.len(), path.display());
    Ok(bytes)
}

impl SystemControl for SimulatedSystem {
    fn has_elevated_access(&self) -> bool {
        self.elevated
    }

    fn firmware_version(&self) -> u32 {
        self.version
    }

    fn unlock_memory(&mut self) {
        debug!("memory protection lifted");
    }

    fn patch_window(&mut self) -> &mut [u8] {
        &mut self.window
    }

    fn sync_range(&mut self, start: usize, len: usize) {
        debug!("cache sync {start:#x}+{len:#x}");
    }

    fn reload(&mut self, version: u32) -> Result<(), i32> {
        self.reloads += 1;
        debug!("reload {version} (#{})", self.reloads);
        Ok(())
    }

    fn init_network(&mut self) -> Result<Ipv4Addr, i32> {
        Ok(self.address)
    }
}
