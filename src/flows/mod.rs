//! Interaction state machines for the three mutation flows.
//!
//! Each flow owns its own typed selection; closing one never touches another's
//! bound data. Transitions are split into a `begin_*` step that hands out the
//! request to make and a `finish_*` step that consumes its result, so the
//! console can run the request on a spawned task. The `*_with` helpers run both
//! steps inline against a [`crate::store::TaskStore`].

pub mod confirm;
pub mod detail;
pub mod form;

pub use confirm::DeleteConfirm;
pub use detail::DetailView;
pub use form::{FormField, TaskForm};
