use std::sync::atomic::{AtomicBool, Ordering};

/// Observer for fractional completion updates in `[0, 1]`.
///
/// Purely observational: delivery is best-effort and must never influence
/// generation. Implementations are shared across worker threads.
pub trait ProgressSink: Sync {
    fn report(&self, fraction: f32);
}

/// Sink that drops every update.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _fraction: f32) {}
}

/// Sink that logs updates at debug level.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, fraction: f32) {
        log::debug!("progress: {:.0}%", fraction * 100.0);
    }
}

/// Cooperative cancellation flag, checked between candidates so that
/// already-packaged outputs survive an abort.
#[derive(Debug, Default)]
pub struct CancelToken {
    flag: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
