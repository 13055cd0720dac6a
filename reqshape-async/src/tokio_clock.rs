use reqshape_core::Clock;
use std::time::Instant;

/// [`Clock`] backed by tokio's timer.
///
/// Follows the runtime's clock, so a paused test runtime drives cache TTLs,
/// rate-limit windows and pool idle timeouts along with every `sleep`.
/// Outside a runtime it reads the system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}
