//! Startup sequencing.
//!
//! The save has to be read while elevated hardware access is held, and the
//! system software reload that brings up networking drops that access. Each
//! stage here can only be built by consuming the one before it, so the
//! reload cannot be reached before the save is read and the flash
//! filesystem released.

pub mod patch;

use std::net::Ipv4Addr;

use patch::{Patch, PatchOutcome, ES_PRESERVE_ACCESS, ISFS_PERMISSIONS};
use tracing::{error, info, span, warn, Level};

use crate::{
    config::AgentConfig,
    snapshot::Snapshot,
    storage::{FlashFs, SaveReader},
    transport::error::NetError,
};

/// Platform calls around the reload.
pub trait SystemControl {
    fn has_elevated_access(&self) -> bool;
    fn firmware_version(&self) -> u32;
    /// Lifts write protection on system software memory.
    fn unlock_memory(&mut self);
    /// The range of loaded system software the patches are searched in.
    fn patch_window(&mut self) -> &mut [u8];
    /// Flushes and invalidates caches over a range of the patch window.
    fn sync_range(&mut self, start: usize, len: usize);
    fn reload(&mut self, version: u32) -> Result<(), i32>;
    /// Brings up networking and returns the console's address.
    fn init_network(&mut self) -> Result<Ipv4Addr, i32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Skipped,
    Reloaded,
    Failed(i32),
}

/// Everything startup produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Bootstrap {
    pub snapshot: Snapshot,
    pub elevated: bool,
    pub patch: PatchOutcome,
    pub isfs_patch: PatchOutcome,
    pub reload: ReloadOutcome,
    pub network: Result<Ipv4Addr, NetError>,
}

pub struct Sequencer<S: SystemControl> {
    sys: S,
    elevated: bool,
}

pub struct DataRead<S: SystemControl> {
    sys: S,
    elevated: bool,
    snapshot: Snapshot,
}

pub struct Patched<S: SystemControl> {
    sys: S,
    elevated: bool,
    snapshot: Snapshot,
    patch: PatchOutcome,
    isfs_patch: PatchOutcome,
}

pub struct NetworkReady<S: SystemControl> {
    sys: S,
    bootstrap: Bootstrap,
}

impl<S: SystemControl> Sequencer<S> {
    pub fn new(sys: S) -> Self {
        let elevated = sys.has_elevated_access();
        info!("Running on firmware {}", sys.firmware_version());
        if elevated {
            info!("Elevated access: enabled (flash access available)");
        } else {
            warn!("Elevated access: disabled (may not have flash access)");
        }
        Self { sys, elevated }
    }

    /// Reads and decodes the save, then releases the flash filesystem. The
    /// reader is consumed so nothing can touch flash afterwards.
    pub fn read_save<F: FlashFs>(self, mut reader: SaveReader<F>, cfg: &AgentConfig) -> DataRead<S> {
        let res = reader.load(&cfg.storage.save_paths, &cfg.layout);
        reader.release();
        drop(reader);

        let snapshot = Snapshot::from(res);
        match &snapshot {
            Snapshot::Loaded(save) => info!("Save data loaded: {} profile(s)", save.profiles.len()),
            Snapshot::Failed { message, .. } => warn!("Could not load save data: {message}"),
        }

        DataRead {
            sys: self.sys,
            elevated: self.elevated,
            snapshot,
        }
    }
}

impl<S: SystemControl> DataRead<S> {
    /// Patches system software so elevated access survives the reload.
    /// Only attempted with elevated access; a missing match is not an error.
    pub fn patch(mut self, isfs_permissions: bool) -> Patched<S> {
        let (patch, isfs_patch) = if self.elevated {
            self.sys.unlock_memory();
            let es = self.apply(&ES_PRESERVE_ACCESS);
            let isfs = if isfs_permissions {
                self.apply(&ISFS_PERMISSIONS)
            } else {
                PatchOutcome::NotAttempted
            };
            (es, isfs)
        } else {
            (PatchOutcome::NotAttempted, PatchOutcome::NotAttempted)
        };

        match patch {
            PatchOutcome::Applied { sites } => info!("ES patched successfully ({sites} site(s))"),
            PatchOutcome::NotFound => warn!("ES patch failed, network may not work"),
            PatchOutcome::NotAttempted => {}
        }

        Patched {
            sys: self.sys,
            elevated: self.elevated,
            snapshot: self.snapshot,
            patch,
            isfs_patch,
        }
    }

    fn apply(&mut self, patch: &Patch) -> PatchOutcome {
        let sites = patch::apply_patch(self.sys.patch_window(), patch);
        for &loc in &sites {
            let (start, len) = patch::flush_range(loc, patch.replacement.len());
            self.sys.sync_range(start, len);
        }
        PatchOutcome::from_sites(sites.len())
    }
}

impl<S: SystemControl> Patched<S> {
    /// Reloads system software if elevated access was held, then brings up
    /// networking. Neither failure stops startup.
    pub fn bring_up_network(mut self) -> NetworkReady<S> {
        let reload = if self.elevated {
            let version = self.sys.firmware_version();
            info!("Reloading firmware {version}...");
            match self.sys.reload(version) {
                Ok(()) => {
                    info!("Firmware reloaded successfully");
                    ReloadOutcome::Reloaded
                }
                Err(code) => {
                    warn!("Firmware reload failed (error {code}), continuing anyway...");
                    ReloadOutcome::Failed(code)
                }
            }
        } else {
            ReloadOutcome::Skipped
        };

        info!("Initializing network...");
        let network = self.sys.init_network().map_err(NetError::Init);
        match &network {
            Ok(addr) => info!("Network ready: {addr}"),
            Err(e) => error!("Network error: {e}"),
        }

        NetworkReady {
            sys: self.sys,
            bootstrap: Bootstrap {
                snapshot: self.snapshot,
                elevated: self.elevated,
                patch: self.patch,
                isfs_patch: self.isfs_patch,
                reload,
                network,
            },
        }
    }
}

impl<S: SystemControl> NetworkReady<S> {
    pub fn bootstrap(&self) -> &Bootstrap {
        &self.bootstrap
    }

    pub fn into_parts(self) -> (S, Bootstrap) {
        (self.sys, self.bootstrap)
    }
}

/// Runs every stage in order.
pub fn run<S: SystemControl, F: FlashFs>(sys: S, reader: SaveReader<F>, cfg: &AgentConfig) -> NetworkReady<S> {
    let span = span!(Level::INFO, "Startup");
    let _enter = span.enter();

    Sequencer::new(sys)
        .read_save(reader, cfg)
        .patch(cfg.patch.isfs_permissions)
        .bring_up_network()
}


#[cfg(test)]
mod tests {
    use super::mock::MockSystem;
    use super::*;
    use crate::{
        save::fixture::SaveImage,
        storage::mock::{CallLog, MemFlash},
    };

    const PATH: &str = "/title/00010000/52465045/data/FitPlus0.dat";

    fn flash(log: &CallLog) -> MemFlash {
        let mut img = SaveImage::with_slots(1);
        img.profile(0, "Kai", 172, [0x19, 0x90, 0x02, 0x14]);
        MemFlash {
            log: log.clone(),
            ..MemFlash::with_file(PATH, img.bytes)
        }
    }

    fn position(log: &CallLog, call: &str) -> usize {
        log.borrow()
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("`{call}` never happened: {:?}", log.borrow()))
    }

    fn es_window() -> Vec<u8> {
        let mut window = vec![0; 0x1000];
        window[0x100..0x100 + ES_PRESERVE_ACCESS.pattern.len()].copy_from_slice(ES_PRESERVE_ACCESS.pattern);
        window
    }

    #[test]
    fn test_read_finishes_before_reload() {
        let log = CallLog::default();
        let mut sys = MockSystem::new(log.clone());
        sys.window = es_window();

        let ready = run(sys, SaveReader::new(flash(&log)), &AgentConfig::default());
        let boot = ready.bootstrap();

        assert!(matches!(boot.snapshot, Snapshot::Loaded(_)));
        let last_read = log.borrow().iter().rposition(|c| c == "flash.read").unwrap();
        let deinit = position(&log, "flash.deinit");
        let reload = position(&log, "reload 58");
        assert!(last_read < deinit);
        assert!(deinit < reload);
        assert!(reload < position(&log, "network.init"));
        // nothing touches flash after the reload
        assert!(log.borrow()[reload..].iter().all(|c| !c.starts_with("flash.")));
    }

    #[test]
    fn test_failed_read_still_ordered() {
        let log = CallLog::default();
        let sys = MockSystem::new(log.clone());
        let fs = MemFlash {
            log: log.clone(),
            ..MemFlash::default()
        };

        let ready = run(sys, SaveReader::new(fs), &AgentConfig::default());
        assert!(matches!(ready.bootstrap().snapshot, Snapshot::Failed { code: -2, .. }));
        assert!(position(&log, "flash.deinit") < position(&log, "reload 58"));
    }

    #[test]
    fn test_patch_applied_and_flushed() {
        let log = CallLog::default();
        let mut sys = MockSystem::new(log.clone());
        sys.window = es_window();

        let (sys, boot) = run(sys, SaveReader::new(flash(&log)), &AgentConfig::default()).into_parts();
        assert_eq!(boot.patch, PatchOutcome::Applied { sites: 1 });
        assert_eq!(boot.isfs_patch, PatchOutcome::NotAttempted);
        assert_eq!(sys.window[0x100 + 25], 0x01);
        assert_eq!(sys.synced, vec![(0x100, 64)]);
        assert!(position(&log, "unlock") < position(&log, "patch"));
    }

    #[test]
    fn test_reload_even_without_patch_match() {
        let log = CallLog::default();
        let sys = MockSystem::new(log.clone());

        let boot = run(sys, SaveReader::new(flash(&log)), &AgentConfig::default()).bootstrap().clone();
        assert_eq!(boot.patch, PatchOutcome::NotFound);
        assert_eq!(boot.reload, ReloadOutcome::Reloaded);
    }

    #[test]
    fn test_isfs_patch_when_enabled() {
        let log = CallLog::default();
        let mut sys = MockSystem::new(log.clone());
        sys.window[0x300..0x306].copy_from_slice(ISFS_PERMISSIONS.pattern);
        let mut cfg = AgentConfig::default();
        cfg.patch.isfs_permissions = true;

        let (sys, boot) = run(sys, SaveReader::new(flash(&log)), &cfg).into_parts();
        assert_eq!(boot.isfs_patch, PatchOutcome::Applied { sites: 1 });
        assert_eq!(sys.window[0x300], 0xE0);
    }

    #[test]
    fn test_not_elevated_skips_patch_and_reload() {
        let log = CallLog::default();
        let mut sys = MockSystem::new(log.clone());
        sys.elevated = false;

        let boot = run(sys, SaveReader::new(flash(&log)), &AgentConfig::default()).bootstrap().clone();
        assert_eq!(boot.patch, PatchOutcome::NotAttempted);
        assert_eq!(boot.reload, ReloadOutcome::Skipped);
        assert!(!log.borrow().iter().any(|c| c == "unlock" || c.starts_with("reload")));
        assert_eq!(boot.network, Ok(Ipv4Addr::new(192, 168, 1, 40)));
    }

    #[test]
    fn test_failures_do_not_stop_startup() {
        let log = CallLog::default();
        let mut sys = MockSystem::new(log.clone());
        sys.reload_error = Some(-1017);
        sys.network_error = Some(-116);

        let boot = run(sys, SaveReader::new(flash(&log)), &AgentConfig::default()).bootstrap().clone();
        assert_eq!(boot.reload, ReloadOutcome::Failed(-1017));
        assert_eq!(boot.network, Err(NetError::Init(-116)));
        assert!(matches!(boot.snapshot, Snapshot::Loaded(_)));
    }
}
