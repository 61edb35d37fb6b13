use std::time::Duration;

use crate::domain::config::PipelineConfig;

/// Retry schedule for failed media loads.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRetryPolicy {
  /// Total attempts per item, including the first
  pub max_attempts: u32,
  /// Delay before the first retry
  pub initial_backoff: Duration,
  /// Maximum delay between attempts
  pub max_backoff: Duration,
  /// Backoff multiplier (exponential factor)
  pub backoff_multiplier: f64,
}

impl Default for LoadRetryPolicy {
  fn default() -> Self {
    Self::from_config(&PipelineConfig::default())
  }
}

impl LoadRetryPolicy {
  pub fn from_config(config: &PipelineConfig) -> Self {
    Self {
      max_attempts: config.max_load_attempts.max(1),
      initial_backoff: Duration::from_millis(config.retry_backoff_ms),
      max_backoff: Duration::from_millis(config.max_backoff_ms),
      backoff_multiplier: 2.0,
    }
  }

  /// Delay before attempt number `attempt` (0-based). The first attempt is immediate.
  pub fn delay_before(&self, attempt: u32) -> Duration {
    if attempt == 0 {
      return Duration::ZERO;
    }
    let base_ms = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
    let capped_ms = base_ms.min(self.max_backoff.as_millis() as f64);
    Duration::from_millis(capped_ms.round() as u64)
  }

  /// Whether another attempt is allowed after `failures` failed ones.
  pub fn allows_retry(&self, failures: u32) -> bool {
    failures < self.max_attempts
  }
}
