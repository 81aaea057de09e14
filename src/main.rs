use std::{error::Error, io, time::Duration};

use fitsync::{
    app::App,
    config::AgentConfig,
    host::{
        console::{AnsiScreen, AutoPilot},
        flash::DirFlash,
        net::StdNetwork,
        system::SimulatedSystem,
    },
    pacer::ThreadPacer,
    sequencer,
    storage::SaveReader,
    transport::SyncServer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let cfg = AgentConfig::load()?;
    info!("flash root {}", cfg.host.nand_root.display());

    let sys = SimulatedSystem::new(&cfg.host)?;
    let reader = SaveReader::new(DirFlash::new(&cfg.host.nand_root));
    let (_, boot) = sequencer::run(sys, reader, &cfg).into_parts();

    let server = SyncServer::new(StdNetwork, cfg.transport.clone());
    let app = App::new(server, AutoPilot::new(cfg.host.autostart), AnsiScreen::stdout(), boot);
    app.run(&mut ThreadPacer, Duration::from_millis(cfg.host.frame_interval_ms));

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the operator screen
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
