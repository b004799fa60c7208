//! The fixed-rate tick scheduler.
//!
//! A dedicated thread runs at 20 Hz. Each tick swaps the arenas — which is
//! the whole handoff between the network side and the simulation — then
//! sleeps off the remainder of the 50 ms budget on the monotonic clock.
//! Overrunning the budget logs a lag warning and skips the sleep so the loop
//! catches up instead of drifting.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::tick_arena::TickArenas;

/// 20 ticks per second.
pub const TICK_DURATION: Duration = Duration::from_millis(50);

/// Spawns the game-loop thread. It runs for the life of the process.
pub fn spawn(arenas: Arc<TickArenas>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("game-loop".to_owned())
        .spawn(move || run(&arenas))
}

fn run(arenas: &TickArenas) -> ! {
    let mut last_report = Instant::now();
    let mut ticks = 0_u32;

    loop {
        let tick_start = Instant::now();

        arenas.swap();
        // Per-tick simulation work goes here.

        ticks += 1;

        let elapsed = tick_start.elapsed();
        if elapsed > TICK_DURATION {
            warn!("tick took {elapsed:?}, lagging");
        } else {
            // std's sleep resumes after signal interruption on its own.
            thread::sleep(TICK_DURATION - elapsed);
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            debug!("current tps: {ticks}");
            last_report = Instant::now();
            ticks = 0;
        }
    }
}
