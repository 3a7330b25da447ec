use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag for a run.
///
/// Raising it stops the engine from starting new work. Work already in flight
/// is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
  cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::Release);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Acquire)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clones_share_the_flag() {
    let signal = CancelSignal::new();
    let clone = signal.clone();
    assert!(!clone.is_cancelled());

    signal.cancel();
    assert!(clone.is_cancelled());
  }
}
