use std::cell::Cell;

thread_local! {
    /// How many derived values and queries were evaluated on this thread.
    static EVALUATIONS: Cell<usize> = const { Cell::new(0) };
}

/// How many derived values and queries were evaluated on this thread so far.
pub fn evaluations() -> usize {
    EVALUATIONS.with(|cell| cell.get())
}

/// Counts one evaluation.
pub(crate) fn register_evaluation() {
    EVALUATIONS.with(|cell| cell.set(cell.get() + 1))
}
