/// Cooldown for triggering updates.
///
/// The engine itself is stateless with respect to timing; whoever triggers
/// updates (the watch loop, an HTTP handler) owns one of these.
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default minimum spacing between two updates
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Update on cooldown, {}s remaining", .remaining.as_secs().max(1))]
pub struct OnCooldown {
    pub remaining: Duration,
}

/// Tracks when the last successful update started
#[derive(Debug, Clone)]
pub struct UpdateGate {
    cooldown: Duration,
    last_success: Option<Instant>,
}

impl Default for UpdateGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl UpdateGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_success: None,
        }
    }

    /// Whether an update may start at `now`
    pub fn check(&self, now: Instant) -> Result<(), OnCooldown> {
        match self.last_success {
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.cooldown {
                    Err(OnCooldown {
                        remaining: self.cooldown - elapsed,
                    })
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    /// Record a successful update; failed runs are not recorded
    pub fn record_success(&mut self, now: Instant) {
        self.last_success = Some(now);
    }

    /// Run `update` if the cooldown allows it, recording success.
    pub fn run<T, E>(
        &mut self,
        now: Instant,
        update: impl FnOnce() -> Result<T, E>,
    ) -> Result<Result<T, E>, OnCooldown> {
        self.check(now)?;
        let result = update();
        if result.is_ok() {
            self.record_success(now);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_trigger_is_allowed() {
        let gate = UpdateGate::default();
        assert!(gate.check(Instant::now()).is_ok());
    }

    #[test]
    fn test_cooldown_after_success() {
        let mut gate = UpdateGate::new(Duration::from_secs(60));
        let start = Instant::now();

        let ran = gate.run(start, || Ok::<_, String>(3)).unwrap();
        assert_eq!(ran, Ok(3));

        let err = gate
            .run(start + Duration::from_secs(20), || Ok::<_, String>(0))
            .unwrap_err();
        assert_eq!(err.remaining, Duration::from_secs(40));
        assert_eq!(err.to_string(), "Update on cooldown, 40s remaining");

        assert!(gate.check(start + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_failure_does_not_start_cooldown() {
        let mut gate = UpdateGate::new(Duration::from_secs(60));
        let start = Instant::now();

        let ran = gate.run(start, || Err::<(), _>("disk full")).unwrap();
        assert_eq!(ran, Err("disk full"));
        assert!(gate.check(start + Duration::from_secs(1)).is_ok());
    }
}
