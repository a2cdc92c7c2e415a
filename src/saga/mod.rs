//! Multi-step wallet workflows (sagas)
//!
//! Everything here coordinates several backend calls into one user-level
//! operation: freezing the right coins before a sweep, creating a
//! fidelity bond step by step, moving an expired bond, and waiting for a
//! spend to be reflected by the backend wallet. Each workflow records
//! what it changed and restores it afterwards.

pub mod cancellation;
pub mod create;
pub mod freeze_guard;
pub mod move_bond;
pub mod poller;

pub mod mocks;

pub use cancellation::{
    AlwaysCancel, AtomicCancellationToken, CancellationHandle, CancellationToken, NeverCancel,
};
pub use create::{CreateBondSaga, CreateBondStep, SelectionSafety};
pub use freeze_guard::FreezeGuard;
pub use move_bond::MoveBondSaga;
pub use poller::{PollOutcome, SpendConfirmationPoller};
