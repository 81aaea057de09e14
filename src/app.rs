//! Operator-facing loop: menu, waiting for a client, syncing, exit.
//!
//! One call to [`App::step`] is one frame. Input, accept polling and a
//! session (when a client is connected) all happen on the same thread.

use std::time::Duration;

use tracing::info;

use crate::{
    pacer::Pacer,
    sequencer::Bootstrap,
    snapshot::Snapshot,
    transport::{socket::Network, Accept, SessionOutcome, SyncServer},
};

pub const TITLE: &str = "Wii Fit Sync";

/// Buttons newly pressed this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Buttons {
    pub a: bool,
    pub b: bool,
    pub home: bool,
}

impl Buttons {
    pub const A: Self = Self {
        a: true,
        b: false,
        home: false,
    };
    pub const B: Self = Self {
        a: false,
        b: true,
        home: false,
    };
    pub const HOME: Self = Self {
        a: false,
        b: false,
        home: true,
    };
}

pub trait Controller {
    fn poll(&mut self) -> Buttons;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Title,
    Good,
    Warn,
    Bad,
    Hint,
}

pub trait Screen {
    fn clear(&mut self);
    fn line(&mut self, tone: Tone, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Menu,
    Waiting,
    Syncing,
    Exit,
}

pub struct App<N: Network, C: Controller, D: Screen> {
    server: SyncServer<N>,
    controller: C,
    screen: D,
    boot: Bootstrap,
    state: AppState,
    redraw: bool,
}

impl<N: Network, C: Controller, D: Screen> App<N, C, D> {
    pub fn new(server: SyncServer<N>, controller: C, screen: D, boot: Bootstrap) -> Self {
        Self {
            server,
            controller,
            screen,
            boot,
            state: AppState::Menu,
            redraw: true,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn server(&self) -> &SyncServer<N> {
        &self.server
    }

    pub fn screen(&self) -> &D {
        &self.screen
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.boot.snapshot
    }

    fn enter(&mut self, state: AppState) {
        self.state = state;
        self.redraw = true;
    }

    /// Starts listening, moving to the waiting screen. Needs networking.
    pub fn start_server(&mut self) {
        if self.boot.network.is_err() {
            self.screen.line(Tone::Warn, "Network unavailable - cannot sync");
            return;
        }
        match self.server.start() {
            Ok(()) => self.enter(AppState::Waiting),
            Err(e) => self.screen.line(Tone::Bad, &format!("Failed to start server: {e}")),
        }
    }

    pub fn step(&mut self, pacer: &mut impl Pacer) -> AppState {
        if self.redraw {
            self.redraw = false;
            match self.state {
                AppState::Menu => self.draw_menu(),
                AppState::Waiting => self.draw_waiting(),
                AppState::Syncing | AppState::Exit => {}
            }
        }

        match self.state {
            AppState::Menu => {
                let pressed = self.controller.poll();
                if pressed.home {
                    self.enter(AppState::Exit);
                } else if pressed.a {
                    self.start_server();
                }
            }
            AppState::Waiting => {
                let pressed = self.controller.poll();
                if pressed.home {
                    self.enter(AppState::Exit);
                } else if pressed.b {
                    self.server.stop();
                    self.enter(AppState::Menu);
                } else {
                    match self.server.poll_accept() {
                        Ok(Accept::Accepted | Accept::Busy) => {
                            self.screen.line(Tone::Good, "Client connected!");
                            self.state = AppState::Syncing;
                        }
                        Ok(Accept::Idle) => {}
                        Err(e) => self.screen.line(Tone::Bad, &e.to_string()),
                    }
                }
            }
            AppState::Syncing => {
                self.screen.line(Tone::Plain, "Waiting for sync request...");
                let outcome = self.server.serve(&self.boot.snapshot, pacer);
                self.enter(AppState::Waiting);
                // shown under the redrawn waiting screen
                self.draw_waiting();
                self.redraw = false;
                self.screen.line(outcome_tone(&outcome), &outcome.to_string());
            }
            AppState::Exit => {}
        }
        self.state
    }

    /// Runs frames until exit, then closes the server.
    pub fn run(mut self, pacer: &mut impl Pacer, frame: Duration) -> Self {
        while self.step(pacer) != AppState::Exit {
            pacer.pause(frame);
        }
        self.server.stop();
        info!("exiting");
        self
    }

    fn header(&mut self) {
        self.screen.clear();
        self.screen.line(Tone::Title, "====================================");
        self.screen.line(Tone::Title, &format!("     {TITLE} v{}", env!("CARGO_PKG_VERSION")));
        self.screen.line(Tone::Title, "====================================");
        self.screen.line(Tone::Plain, "");
    }

    fn draw_menu(&mut self) {
        self.header();

        let network_ok = match self.boot.network {
            Ok(addr) => {
                self.screen.line(Tone::Plain, &format!("IP Address: {addr}"));
                self.screen.line(Tone::Plain, &format!("Port: {}", self.server.port()));
                true
            }
            Err(_) => {
                self.screen.line(Tone::Warn, "Network not available");
                false
            }
        };
        self.screen.line(Tone::Plain, "");

        match &self.boot.snapshot {
            Snapshot::Loaded(save) if !save.profiles.is_empty() => {
                self.screen.line(
                    Tone::Good,
                    &format!("Wii Fit Data: Loaded {} profile(s)", save.profiles.len()),
                );
                for p in &save.profiles {
                    self.screen.line(
                        Tone::Plain,
                        &format!("  - {}: {} measurements", p.name, p.measurements.len()),
                    );
                }
            }
            snapshot => {
                self.screen.line(Tone::Bad, "Wii Fit Data: Not loaded");
                if let Snapshot::Failed { message, .. } = snapshot {
                    self.screen.line(Tone::Bad, &format!("  {}", snapshot.summary()));
                    self.screen.line(Tone::Plain, &format!("  {message}"));
                }
            }
        }

        self.screen.line(Tone::Plain, "");
        if network_ok {
            self.screen.line(Tone::Hint, "Press A to start sync server");
        } else {
            self.screen.line(Tone::Hint, "Network unavailable - cannot sync");
        }
        self.screen.line(Tone::Hint, "Press HOME to exit");
    }

    fn draw_waiting(&mut self) {
        self.header();
        self.screen.line(Tone::Plain, "Waiting for connection...");
        self.screen.line(Tone::Plain, "");
        let addr = match self.boot.network {
            Ok(addr) => addr.to_string(),
            Err(_) => "N/A".to_string(),
        };
        self.screen.line(Tone::Good, &format!("Connect to: {addr}:{}", self.server.port()));
        self.screen.line(Tone::Plain, "");
        self.screen.line(Tone::Hint, "Press B to go back");
        self.screen.line(Tone::Hint, "Press HOME to exit");
    }
}

fn outcome_tone(outcome: &SessionOutcome) -> Tone {
    match outcome {
        SessionOutcome::Synced { acked: true, .. } => Tone::Good,
        SessionOutcome::Synced { .. } | SessionOutcome::Disconnected | SessionOutcome::NoSession => {
            Tone::Plain
        }
        SessionOutcome::TimedOut | SessionOutcome::Ignored => Tone::Warn,
        SessionOutcome::EncodeFailed
        | SessionOutcome::ReceiveFailed(_)
        | SessionOutcome::SendFailed(_) => Tone::Bad,
    }
}
