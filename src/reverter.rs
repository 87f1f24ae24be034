// src/reverter.rs

//! A scoped-rollback helper: register cleanup actions as you make progress,
//! call `success()` once the scope completes without error. Dropping the
//! reverter before `success()` runs every registered action in reverse
//! order, so a failure anywhere in `init` leaves the state directory as it
//! was before `Run` was called (modulo the one-time creation of the
//! directory itself).

/// Accumulates rollback closures and runs them on drop unless [`Reverter::success`]
/// was called first.
#[derive(Default)]
pub struct Reverter {
    actions: Vec<Box<dyn FnOnce() + Send>>,
    succeeded: bool,
}

impl Reverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action to run, in LIFO order, if the reverter is dropped
    /// without `success()` having been called.
    pub fn on_rollback(&mut self, action: impl FnOnce() + Send + 'static) {
        self.actions.push(Box::new(action));
    }

    /// Marks the scope as having completed successfully; no rollback actions
    /// will run when this reverter drops.
    pub fn success(mut self) {
        self.succeeded = true;
        self.actions.clear();
    }
}

impl Drop for Reverter {
    fn drop(&mut self) {
        if self.succeeded {
            return;
        }
        for action in self.actions.drain(..).rev() {
            action();
        }
    }
}
