//! Integration tests for weedsync-sync
//!
//! Drive the orchestrator end to end against an in-memory store and a
//! copy-based delta engine.


mod test_cancel;
mod test_locking;
