//! Apply a local change before the remote store confirms it, and undo it
//! if confirmation fails.

use std::fmt::Display;
use std::future::Future;

/// A reversible change to some piece of local state.
pub trait Mutation {
    type Target;
    /// Whatever `revert` needs to restore the pre-change state.
    type Undo;

    fn apply(&self, target: &mut Self::Target) -> Self::Undo;
    fn revert(&self, target: &mut Self::Target, undo: Self::Undo);
}

/// A mutation that has been applied locally and awaits the remote outcome.
///
/// Dropping it without calling `settle` keeps the change.
#[must_use]
pub struct Pending<M: Mutation> {
    mutation: M,
    undo: M::Undo,
}

impl<M: Mutation> Pending<M> {
    pub fn apply(mutation: M, target: &mut M::Target) -> Self {
        let undo = mutation.apply(target);
        Pending { mutation, undo }
    }

    pub fn mutation(&self) -> &M {
        &self.mutation
    }

    /// Keeps the change on success, reverts it on failure. Returns whether
    /// the change stuck.
    pub fn settle<E: Display>(self, target: &mut M::Target, outcome: Result<(), E>) -> bool {
        match outcome {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "remote update failed, rolling back");
                self.mutation.revert(target, self.undo);
                false
            }
        }
    }
}

/// Applies `mutation`, awaits `persist` and reverts on failure.
///
/// `persist` is only polled after the local change is in place.
pub async fn apply_and_persist<M, E, F>(target: &mut M::Target, mutation: M, persist: F) -> bool
where
    M: Mutation,
    E: Display,
    F: Future<Output = Result<(), E>>,
{
    let pending = Pending::apply(mutation, target);
    let outcome = persist.await;
    pending.settle(target, outcome)
}
