// crates/analyst-store-sqlite/tests/run_lock.rs
// ============================================================================
// Module: Run Lock Tests
// Description: Validate persisted mutual exclusion and best-effort release.
// Purpose: Ensure one writer per vertical across concurrent sessions.
// Dependencies: analyst-store-sqlite, analyst-core, tempfile
// ============================================================================

//! ## Overview
//! Exercises lock acquisition under contention from independent sessions,
//! guard-based release, and the release-failure counter.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Barrier;

use analyst_core::LockKey;
use analyst_core::MetaNamespace;
use analyst_core::NoopRunEventSink;
use analyst_store_sqlite::RunLock;
use tempfile::TempDir;

use crate::common::drop_table;
use crate::common::memory_events;
use crate::common::namespace;
use crate::common::open_session;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn concurrent_acquire_yields_exactly_one_winner() {
    let temp = TempDir::new().unwrap();
    // Bootstrap the schema once so both contenders race only on the insert.
    drop(open_session(temp.path()));
    let lock = RunLock::new(Arc::new(NoopRunEventSink));
    let barrier = Barrier::new(2);
    let key = LockKey::for_plugin("pharma");

    let results: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0 .. 2)
            .map(|_| {
                scope.spawn(|| {
                    let session = open_session(temp.path());
                    barrier.wait();
                    lock.acquire(&session, &namespace(), &key).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|acquired| **acquired).count(), 1);
}

#[test]
fn release_frees_the_key() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let (sink, events) = memory_events();
    let lock = RunLock::new(events);
    let key = LockKey::for_plugin("pharma");

    assert!(lock.acquire(&session, &namespace(), &key).unwrap());
    assert!(!lock.acquire(&session, &namespace(), &key).unwrap());
    assert!(lock.is_held(&session, &namespace(), &key).unwrap());
    lock.release(&session, &namespace(), &key);
    assert!(!lock.is_held(&session, &namespace(), &key).unwrap());
    assert!(lock.acquire(&session, &namespace(), &key).unwrap());
    assert_eq!(
        sink.names(),
        vec!["lock_acquired", "lock_not_acquired", "lock_released", "lock_acquired"]
    );
}

#[test]
fn keys_are_scoped_by_namespace() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let lock = RunLock::new(Arc::new(NoopRunEventSink));
    let key = LockKey::for_plugin("shared");
    let other = MetaNamespace::parse("other_meta").unwrap();

    assert!(lock.acquire(&session, &namespace(), &key).unwrap());
    assert!(lock.acquire(&session, &other, &key).unwrap());
}

#[test]
fn guard_releases_on_drop() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let lock = RunLock::new(Arc::new(NoopRunEventSink));
    let key = LockKey::for_plugin("auctions");

    {
        let guard = lock.acquire_guard(&session, &namespace(), &key).unwrap().unwrap();
        assert_eq!(guard.key(), &key);
        assert!(lock.acquire_guard(&session, &namespace(), &key).unwrap().is_none());
    }
    assert!(!lock.is_held(&session, &namespace(), &key).unwrap());
}

#[test]
fn release_failures_are_counted_and_swallowed() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let (sink, events) = memory_events();
    let lock = RunLock::new(events);
    let key = LockKey::for_plugin("pharma");

    assert!(lock.acquire(&session, &namespace(), &key).unwrap());
    drop_table(&session, "job_locks");
    lock.release(&session, &namespace(), &key);
    lock.release(&session, &namespace(), &key);

    assert_eq!(lock.release_failures(), 2);
    assert_eq!(sink.names().last().copied(), Some("lock_release_error"));
}

#[test]
fn acquire_propagates_non_contention_errors() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let lock = RunLock::new(Arc::new(NoopRunEventSink));
    drop_table(&session, "job_locks");

    let result = lock.acquire(&session, &namespace(), &LockKey::for_plugin("pharma"));
    assert!(result.is_err());
}
