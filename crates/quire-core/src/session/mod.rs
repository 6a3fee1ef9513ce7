//! Edit session state machine.
//!
//! `EditSession` owns the local and last-saved copies of one document and
//! decides when to save and render. It never performs I/O: every input is a
//! [`SessionEvent`], every output an [`Effect`] for the driver to execute.
//! Results of those effects come back as events tagged with the
//! [`Revision`] they were issued for, so a late answer can never overwrite
//! fresher state.
//!
//! ```text
//!  Idle --Open--> Loading --Loaded--> Ready ----Close----> Closed
//!                    |                  |
//!                    +--LoadFailed--> Idle
//!
//!  Ready sub-phases:
//!
//!    Clean --edit--> Dirty --timer/flush--> Saving --ok--> Rendering
//!      ^               ^                      |               |
//!      |               +-------- failure -----+---------------+
//!      +------------- render ok, local == saved --------------+
//! ```
//!
//! At most one save/render round trip is in flight. A timer that fires
//! during a round trip only marks a save as queued; when the round trip ends
//! the queued save carries whatever the local text is at that moment.

mod event;
mod machine;


pub use event::{
    Effect, FailedPhase, Revision, SessionError, SessionEvent, SessionNotice, TimerId,
};
pub use machine::{DEFAULT_QUIET_PERIOD, EditSession, SessionConfig, SessionPhase, SyncPhase};
