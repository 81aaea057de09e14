use std::{thread, time::Duration};

/// Suspends the polling loop between non-blocking attempts.
pub trait Pacer {
    fn pause(&mut self, d: Duration);
}

pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, d: Duration) {
        thread::sleep(d);
    }
}

/// Doesn't sleep, only adds up how long it was asked to.
#[derive(Debug, Default)]
pub struct CountingPacer {
    pub pauses: usize,
    pub total: Duration,
}

impl Pacer for CountingPacer {
    fn pause(&mut self, d: Duration) {
        self.pauses += 1;
        self.total += d;
    }
}
