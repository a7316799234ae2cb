//! Playback drain loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::state::ShutdownSignal;
use crate::audio::PlaybackSink;
use crate::buffering::jitter::JitterBuffer;

/// Drain tick interval.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
pub struct PlaybackCounters {
    pub samples_played: AtomicUsize,
    pub samples_discarded: AtomicUsize,
}

/// Tick `jitter` every [`DRAIN_INTERVAL`] and hand each released block to
/// `sink`, until `shutdown` is triggered. The queue lock is never held while
/// the sink runs.
///
/// A tick is skipped while the sink has no room for a full high-watermark
/// block; inbound audio keeps queueing meanwhile and is never dropped.
pub fn run_drain_loop(
    mut jitter: JitterBuffer,
    sink: &mut dyn PlaybackSink,
    shutdown: &ShutdownSignal,
    counters: &PlaybackCounters,
) {
    let discarding = sink.is_discarding();

    while !shutdown.is_triggered() {
        if sink.has_room_for(jitter.high_watermark()) {
            if let Some(block) = jitter.tick() {
                let counter = if discarding {
                    &counters.samples_discarded
                } else {
                    &counters.samples_played
                };
                counter.fetch_add(block.len(), Ordering::Relaxed);
                sink.play(block);
                if jitter.is_drained() {
                    sink.finish_tail();
                }
            }
        }
        thread::sleep(DRAIN_INTERVAL);
    }

    debug!(left_buffered = jitter.buffered(), "drain loop finished");
}
