pub mod app;
pub mod config;
pub mod encoder;
pub mod host;
pub mod pacer;
pub mod save;
pub mod sequencer;
pub mod snapshot;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod tests;
