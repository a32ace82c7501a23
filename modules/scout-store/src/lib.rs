//! Postgres-backed execution store: scouts, executions, steps, and
//! per-user credentials. All mutations are single-row and transactional;
//! the at-most-one-running invariant is a partial unique index, not an
//! in-process lock, so it survives executor crashes.

pub mod credentials;
pub mod executions;
pub mod migrate;
pub mod scouts;
pub mod steps;

pub use credentials::{get_credential, get_notification_email, mark_credential_invalid};
pub use executions::{
    create_running, find_running, finish_execution, list_executions,
    list_recent_completed_with_embedding, reap_stale_running, try_claim_running, ClaimOutcome,
    FinishFields,
};
pub use migrate::migrate;
pub use scouts::{
    disable_all_user_scouts, get_scout, list_due_scouts, update_scout_post_run, PostRunOutcome,
};
pub use steps::{append_step, list_steps, update_step, StepFinish};
