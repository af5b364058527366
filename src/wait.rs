//! Bounded waits
//!
//! Nothing in the driver spins forever. Negotiation polling is bounded by a
//! poll count ([`PollBudget`]); completion waits are bounded by elapsed time on
//! the HAL clock ([`Deadline`]).

use crate::hal::Clock;

/// The condition did not hold before the budget ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut;

/// Outcome of a failed [`poll_until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollError<E> {
    TimedOut,
    Probe(E),
}

/// Maximum number of probes and the delay between two of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub max_polls: u32,
    pub interval_us: u64,
}

impl PollBudget {
    pub const fn new(max_polls: u32, interval_us: u64) -> Self {
        Self {
            max_polls,
            interval_us,
        }
    }

    /// Upper bound on the time a poll loop can take, ignoring probe cost
    pub const fn worst_case_us(&self) -> u64 {
        self.max_polls as u64 * self.interval_us
    }
}

/// Absolute expiry time on a [`Clock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at_us: u64,
}

impl Deadline {
    pub fn after<C: Clock + ?Sized>(clock: &C, budget_us: u64) -> Self {
        Self {
            expires_at_us: clock.now_us().saturating_add(budget_us),
        }
    }

    pub fn has_expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        clock.now_us() >= self.expires_at_us
    }
}

/// Busy-wait until `done` returns true or `deadline` passes
///
/// The condition is evaluated once more after expiry so a completion that
/// lands between the last check and the clock read is not lost.
pub fn spin_until<C, F>(clock: &C, deadline: Deadline, mut done: F) -> Result<(), TimedOut>
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    loop {
        if done() {
            return Ok(());
        }
        if deadline.has_expired(clock) {
            return if done() { Ok(()) } else { Err(TimedOut) };
        }
        core::hint::spin_loop();
    }
}

/// Probe up to `budget.max_polls` times, sleeping `budget.interval_us` between
/// probes, until `probe` reports true
///
/// Returns the number of probes it took.
pub fn poll_until<C, E, F>(clock: &C, budget: PollBudget, mut probe: F) -> Result<u32, PollError<E>>
where
    C: Clock + ?Sized,
    F: FnMut() -> Result<bool, E>,
{
    for attempt in 1..=budget.max_polls {
        if probe().map_err(PollError::Probe)? {
            return Ok(attempt);
        }
        if attempt < budget.max_polls {
            clock.delay_us(budget.interval_us);
        }
    }
    Err(PollError::TimedOut)
}
