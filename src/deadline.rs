use std::time::Duration;

use tokio::time::Instant;

/// Budget for point reads such as loading one pair for a form.
pub const SHORT_READ: Duration = Duration::from_secs(3);
/// Budget for list, create, update and delete.
pub const STORE_OPERATION: Duration = Duration::from_secs(5);
/// Budget for a round trip to the answer service.
pub const ANSWER_PROXY: Duration = Duration::from_secs(20);

/// A point in time by which a request's downstream work must finish.
///
/// Created once per request by the handler and handed to every store or
/// proxy call the request makes, so the calls share one budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn within(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
        }
    }

    pub fn instant(&self) -> Instant {
        self.expires_at
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let deadline = Deadline::within(Duration::from_secs(3));
        assert_eq!(deadline.remaining(), Duration::from_secs(3));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(deadline.remaining(), Duration::from_secs(1));
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(deadline.is_expired());
    }
}
