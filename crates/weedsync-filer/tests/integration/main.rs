//! Integration tests for weedsync-filer
//!
//! Uses wiremock to simulate the filer HTTP API and local TCP listeners to
//! play the filer's side of transfer sessions.

mod common;

mod test_tags;
mod test_transfer;
