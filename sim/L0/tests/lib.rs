//! End-to-end tests for the strand crates. See `integration/`.
