//! Render worker threads and their per-frame handshake
pub mod render_workers;
pub mod shutdown;
pub mod work_item;

use std::num::NonZeroUsize;

pub use render_workers::{WorkerPhase, WorkerPool};
pub use shutdown::ShutdownSignal;
pub use work_item::{partition, WorkItem};

use crate::constants::frame::FALLBACK_WORKER_COUNT;

/// Worker count used when the config leaves it unset
pub fn default_worker_count() -> usize {
    worker_count_or_fallback(std::thread::available_parallelism().ok())
}

/// Hardware thread count if it could be detected, [`FALLBACK_WORKER_COUNT`] otherwise
pub fn worker_count_or_fallback(detected: Option<NonZeroUsize>) -> usize {
    match detected {
        Some(threads) => threads.get(),
        None => {
            log::warn!(
                "[WorkerPool] Hardware thread count unavailable, using {} workers",
                FALLBACK_WORKER_COUNT
            );
            FALLBACK_WORKER_COUNT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detected_thread_count_is_used() {
        assert_eq!(worker_count_or_fallback(NonZeroUsize::new(12)), 12);
        assert_eq!(worker_count_or_fallback(NonZeroUsize::new(1)), 1);
    }

    #[test]
    fn test_undetectable_thread_count_falls_back() {
        assert_eq!(worker_count_or_fallback(None), FALLBACK_WORKER_COUNT);
        assert_eq!(FALLBACK_WORKER_COUNT, 8);
    }

    #[test]
    fn test_default_worker_count_is_positive() {
        assert!(default_worker_count() > 0);
    }
}
