//! A task's completion outcome (`spec.md` §3.5) and the result-merging
//! lattice (`spec.md` §4.3.4).

use std::sync::Arc;

use crate::error::UserError;

/// The tagged outcome of one `AsyncTask` (`spec.md` §3.5). `Failed` and
/// `Cancelled` carry `Arc`-wrapped state so a completed task's outcome can
/// be read more than once (`AsyncTask::result()`/`get_now()` are not
/// one-shot).
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Failed(Arc<UserError>),
    Cancelled,
}

/// The result of folding two or more [`Outcome`]s together with
/// [`merge_outcomes`]. Kept distinct from `Outcome<T>` because a fold of
/// two failures must remember both, not just the first.
#[derive(Debug)]
pub enum MergedOutcome<T> {
    Success(T),
    Failed {
        primary: Arc<UserError>,
        suppressed: Vec<Arc<UserError>>,
    },
    Cancelled,
}

impl<T> From<Outcome<T>> for MergedOutcome<T> {
    fn from(outcome: Outcome<T>) -> MergedOutcome<T> {
        match outcome {
            Outcome::Success(value) => MergedOutcome::Success(value),
            Outcome::Failed(cause) => MergedOutcome::Failed {
                primary: cause,
                suppressed: Vec::new(),
            },
            Outcome::Cancelled => MergedOutcome::Cancelled,
        }
    }
}

/// Folds two outcomes per the lattice in `spec.md` §4.3.4:
/// SUCCESS⊕SUCCESS combines via `combine`; a SUCCESS on either side wins
/// outright; FAILED⊕FAILED keeps the first failure and records the second
/// as suppressed; FAILED⊕CANCELLED keeps the FAILED; CANCELLED⊕CANCELLED
/// stays CANCELLED. Commutative up to which failure ends up primary vs
/// suppressed, which follows argument order.
pub fn merge_outcomes<T>(
    a: MergedOutcome<T>,
    b: MergedOutcome<T>,
    combine: impl FnOnce(T, T) -> T,
) -> MergedOutcome<T> {
    match (a, b) {
        (MergedOutcome::Success(x), MergedOutcome::Success(y)) => MergedOutcome::Success(combine(x, y)),
        (MergedOutcome::Success(x), _) => MergedOutcome::Success(x),
        (_, MergedOutcome::Success(y)) => MergedOutcome::Success(y),
        (
            MergedOutcome::Failed { primary, mut suppressed },
            MergedOutcome::Failed {
                primary: second_primary,
                suppressed: second_suppressed,
            },
        ) => {
            suppressed.push(second_primary);
            suppressed.extend(second_suppressed);
            MergedOutcome::Failed { primary, suppressed }
        }
        (MergedOutcome::Failed { primary, suppressed }, MergedOutcome::Cancelled) => {
            MergedOutcome::Failed { primary, suppressed }
        }
        (MergedOutcome::Cancelled, MergedOutcome::Failed { primary, suppressed }) => {
            MergedOutcome::Failed { primary, suppressed }
        }
        (MergedOutcome::Cancelled, MergedOutcome::Cancelled) => MergedOutcome::Cancelled,
    }
}
