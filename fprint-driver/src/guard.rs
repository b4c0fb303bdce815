//! RAII guard for the `is_validating` flag (spec §5: "the validation
//! flag must be cleared on every exit path, including cancellation and
//! timeout").

use std::sync::Arc;

use crate::state::SharedState;

/// Sets `is_validating` on construction, clears it on drop — so an
/// early return, a `?`, or a cancelled future all still release it.
pub struct OperationGuard {
    state: Arc<SharedState>,
}

impl OperationGuard {
    #[must_use]
    pub fn acquire(state: Arc<SharedState>) -> Self {
        state.set_validating(true);
        Self { state }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.state.set_validating(false);
    }
}
