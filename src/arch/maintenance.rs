//! Ordering of range-based data cache maintenance over an inner (L1) and an
//! outer (L2) cache
//!
//! The CPU-specific code executes the [`Step`]s; the order lives here so it
//! can be checked on the host.
//!
//! - **Flush**: clean L1, barrier, clean L2, sync
//! - **Invalidate**: clean+invalidate partial lines in L1, barrier; then in
//!   L2 clean+invalidate the partial lines and invalidate the rest, sync;
//!   finally invalidate the whole lines in L1, barrier
//!
//! A dirty L1 copy of a partial line must reach L2 before L2 writes that
//! line back to memory.
//!
//! ## References
//!
//! - CoreLink Level 2 Cache Controller L2C-310 TRM, Section 3.3.10

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    L1,
    L2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    Clean,
    Invalidate,
    CleanInvalidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Line(Level, LineOp, usize),
    /// `dsb` for L1, a cache sync for L2
    Complete(Level),
}

/// Start of each `line_size` line overlapping `addr..addr + len`
pub fn lines(addr: usize, len: usize, line_size: usize) -> impl Iterator<Item = usize> {
    let start = addr & !(line_size - 1);
    let end = addr.saturating_add(len);
    (start..end).step_by(line_size)
}

pub fn flush_steps(addr: usize, len: usize, line_size: usize, mut step: impl FnMut(Step)) {
    if len == 0 {
        return;
    }
    for line in lines(addr, len, line_size) {
        step(Step::Line(Level::L1, LineOp::Clean, line));
    }
    step(Step::Complete(Level::L1));
    for line in lines(addr, len, line_size) {
        step(Step::Line(Level::L2, LineOp::Clean, line));
    }
    step(Step::Complete(Level::L2));
    step(Step::Complete(Level::L1));
}

pub fn invalidate_steps(addr: usize, len: usize, line_size: usize, mut step: impl FnMut(Step)) {
    if len == 0 {
        return;
    }
    let end = addr.saturating_add(len);
    let first = addr & !(line_size - 1);
    let last = (end - 1) & !(line_size - 1);
    let partial = |line: usize| {
        (line == first && addr % line_size != 0) || (line == last && end % line_size != 0)
    };

    for line in lines(addr, len, line_size).filter(|&l| partial(l)) {
        step(Step::Line(Level::L1, LineOp::CleanInvalidate, line));
    }
    step(Step::Complete(Level::L1));

    for line in lines(addr, len, line_size) {
        let op = if partial(line) {
            LineOp::CleanInvalidate
        } else {
            LineOp::Invalidate
        };
        step(Step::Line(Level::L2, op, line));
    }
    step(Step::Complete(Level::L2));

    for line in lines(addr, len, line_size).filter(|&l| !partial(l)) {
        step(Step::Line(Level::L1, LineOp::Invalidate, line));
    }
    step(Step::Complete(Level::L1));
}
