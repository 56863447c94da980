//! Cross-reboot synchronization
//!
//! The handshake runs between two agents on the same machine:
//!
//! 1. A test inside the monitored unit calls `reboot-request <mark>`, which
//!    persists the mark through [`MarkStore`] and then blocks in the
//!    synchronization unit ([`request_reboot`]).
//! 2. The agent running `run-test-unit` sees the synchronization unit start,
//!    reads the mark back, and reports it as a [`RebootRecord`].
//! 3. The harness stops the synchronization unit, which unblocks the
//!    request, and reboots the machine.

mod mark;
mod record;
mod request;

pub use mark::MarkStore;
pub use record::RebootRecord;
pub use request::{request_reboot, SYNC_UNIT_COMMAND};
