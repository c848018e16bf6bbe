//! Fixed-interval polling with cooperative cancellation.
//!
//! [`poll_until`] runs a check, and while the check reports "not yet" it
//! sleeps for a fixed interval and tries again. There is no retry limit: the
//! loop ends only when the check resolves or its [`CancelToken`] is set.
//!
//! Cancellation never aborts an in-flight check. It is observed before each
//! check and again after each check completes, so a result that arrives after
//! cancellation is dropped and nothing is rescheduled.

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// Interval between two checks of a handshake poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// A cancellation flag shared between a poll loop and whoever may stop it.
///
/// Single-task only: clones share one `Cell`, so a loop and its canceller
/// must run on the same task (e.g. under `tokio::join!` or `tokio::select!`).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }

    /// `true` if both handles refer to the same flag.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Non-blocking sleep, supplied by the platform.
pub trait Timer {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// [`Timer`] backed by `tokio::time::sleep`.
#[cfg(feature = "native")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[cfg(feature = "native")]
impl Timer for TokioTimer {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        tokio::time::sleep(duration)
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The check produced a value. Happens at most once per loop.
    Resolved(T),
    /// The token was set before the check resolved.
    Cancelled,
}

impl<T> PollOutcome<T> {
    pub fn resolved(self) -> Option<T> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Cancelled => None,
        }
    }
}

/// Run `check` until it yields `Some`, sleeping `interval` between attempts.
///
/// Checks never overlap: the next one starts only after the previous one
/// finished and the interval elapsed.
pub async fn poll_until<T, C, Fut, K>(
    mut check: C,
    interval: Duration,
    cancel: &CancelToken,
    timer: &K,
) -> PollOutcome<T>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
    K: Timer + ?Sized,
{
    let mut tick: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            tracing::debug!(tick, "Poll cancelled before check");
            return PollOutcome::Cancelled;
        }

        tick += 1;
        tracing::trace!(tick, "Poll tick");
        let result = check().await;

        if cancel.is_cancelled() {
            tracing::debug!(tick, "Poll cancelled during check; result discarded");
            return PollOutcome::Cancelled;
        }
        if let Some(value) = result {
            return PollOutcome::Resolved(value);
        }

        timer.sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    const INTERVAL: Duration = DEFAULT_POLL_INTERVAL;

    #[tokio::test(start_paused = true)]
    async fn resolves_on_first_hit_without_sleeping() {
        let start = Instant::now();
        let calls = Cell::new(0);

        let outcome = poll_until(
            || {
                calls.set(calls.get() + 1);
                async { Some("g1") }
            },
            INTERVAL,
            &CancelToken::new(),
            &TokioTimer,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Resolved("g1"));
        assert_eq!(calls.get(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_at_fixed_interval() {
        let start = Instant::now();
        let calls = Cell::new(0u32);

        let outcome = poll_until(
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { (n == 3).then_some(n) }
            },
            INTERVAL,
            &CancelToken::new(),
            &TokioTimer,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Resolved(3));
        assert_eq!(start.elapsed(), INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_skips_the_check() {
        let token = CancelToken::new();
        token.cancel();
        let calls = Cell::new(0);

        let outcome = poll_until(
            || {
                calls.set(calls.get() + 1);
                async { Some(()) }
            },
            INTERVAL,
            &token,
            &TokioTimer,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_sleep_stops_rescheduling() {
        let token = CancelToken::new();
        let calls = Cell::new(0);

        let poll = poll_until(
            || {
                calls.set(calls.get() + 1);
                async { None::<()> }
            },
            INTERVAL,
            &token,
            &TokioTimer,
        );
        let canceller = async {
            tokio::time::sleep(INTERVAL * 2 + Duration::from_millis(500)).await;
            token.cancel();
        };
        let (outcome, ()) = tokio::join!(poll, canceller);

        assert_eq!(outcome, PollOutcome::Cancelled);
        // Checks at 0s, 1s and 2s; the 3s tick sees the flag first.
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn result_of_in_flight_check_is_discarded_after_cancel() {
        let token = CancelToken::new();

        let poll = poll_until(
            || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Some("late")
            },
            INTERVAL,
            &token,
            &TokioTimer,
        );
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        };
        let (outcome, ()) = tokio::join!(poll, canceller);

        assert_eq!(outcome, PollOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_check_in_flight() {
        let in_flight = Cell::new(0u32);
        let max_in_flight = Cell::new(0u32);
        let calls = Cell::new(0u32);

        let outcome = poll_until(
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                let (in_flight, max_in_flight) = (&in_flight, &max_in_flight);
                async move {
                    in_flight.set(in_flight.get() + 1);
                    max_in_flight.set(max_in_flight.get().max(in_flight.get()));
                    // Slower than the interval on purpose.
                    tokio::time::sleep(INTERVAL * 3).await;
                    in_flight.set(in_flight.get() - 1);
                    (n == 4).then_some(n)
                }
            },
            INTERVAL,
            &CancelToken::new(),
            &TokioTimer,
        )
        .await;

        assert_eq!(outcome, PollOutcome::Resolved(4));
        assert_eq!(max_in_flight.get(), 1);
    }

    #[test]
    fn token_clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&CancelToken::new()));
        b.cancel();
        assert!(a.is_cancelled());
        assert_eq!(PollOutcome::Resolved(1).resolved(), Some(1));
        assert_eq!(PollOutcome::<u8>::Cancelled.resolved(), None);
    }
}
