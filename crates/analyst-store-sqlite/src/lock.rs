// crates/analyst-store-sqlite/src/lock.rs
// ============================================================================
// Module: Run Lock
// Description: Per-vertical mutual exclusion via a persisted unique key.
// Purpose: Guarantee a single writer per vertical across processes.
// Dependencies: analyst-core, rusqlite
// ============================================================================

//! ## Overview
//! A lock is held while a `job_locks` row exists for `(namespace, lock_key)`.
//! Acquisition is a plain insert; contention surfaces as a unique-constraint
//! violation and is reported as "not acquired" rather than an error.
//!
//! Release is best effort: failures are logged, counted, and swallowed.
//! [`HeldLock`] releases on drop so every exit path after acquisition frees
//! the key. Rows orphaned by a crashed process are not reclaimed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use analyst_core::LockKey;
use analyst_core::MetaNamespace;
use analyst_core::RunEvent;
use analyst_core::RunEventSink;
use analyst_core::unix_millis;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::session::StoreError;
use crate::session::StoreSession;

// ============================================================================
// SECTION: Run Lock
// ============================================================================

/// Persisted advisory lock manager.
///
/// # Invariants
/// - At most one `job_locks` row exists per `(namespace, lock_key)`.
/// - `release_failures` only increases for the lifetime of the value.
pub struct RunLock {
    /// Event sink for lock transitions.
    events: Arc<dyn RunEventSink>,
    /// Count of release attempts that failed.
    release_failures: AtomicU64,
}

impl RunLock {
    /// Creates a lock manager reporting to `events`.
    #[must_use]
    pub fn new(events: Arc<dyn RunEventSink>) -> Self {
        Self {
            events,
            release_failures: AtomicU64::new(0),
        }
    }

    /// Attempts to take the lock.
    ///
    /// Returns `Ok(true)` when the row was inserted and `Ok(false)` when the
    /// key is already held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for any persistence failure other than
    /// contention.
    pub fn acquire(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        key: &LockKey,
    ) -> Result<bool, StoreError> {
        let result = session.with_connection(|connection| {
            let inserted = connection.execute(
                "INSERT INTO job_locks (namespace, lock_key, acquired_at) VALUES (?1, ?2, ?3)",
                params![namespace.as_str(), key.as_str(), unix_millis()],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(err) => Err(StoreError::Db(err.to_string())),
            }
        });
        let event = match &result {
            Ok(true) => RunEvent::info("lock_acquired"),
            Ok(false) => RunEvent::warn("lock_not_acquired"),
            Err(err) => RunEvent::error("lock_error").with("error", err.to_string()),
        };
        self.events.record(&event.with("namespace", namespace.as_str()).with("lock_key", key.as_str()));
        result
    }

    /// Attempts to take the lock and wraps it in a releasing guard.
    ///
    /// Returns `Ok(None)` when the key is already held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for any persistence failure other than
    /// contention.
    pub fn acquire_guard<'a>(
        &'a self,
        session: &'a StoreSession,
        namespace: &MetaNamespace,
        key: &LockKey,
    ) -> Result<Option<HeldLock<'a>>, StoreError> {
        if !self.acquire(session, namespace, key)? {
            return Ok(None);
        }
        Ok(Some(HeldLock {
            lock: self,
            session,
            namespace: namespace.clone(),
            key: key.clone(),
        }))
    }

    /// Releases the lock. Failures are logged and counted, never raised.
    pub fn release(&self, session: &StoreSession, namespace: &MetaNamespace, key: &LockKey) {
        let result = session.with_connection(|connection| {
            connection
                .execute(
                    "DELETE FROM job_locks WHERE namespace = ?1 AND lock_key = ?2",
                    params![namespace.as_str(), key.as_str()],
                )
                .map_err(|err| StoreError::Db(err.to_string()))
        });
        let event = match result {
            Ok(_) => RunEvent::info("lock_released"),
            Err(err) => {
                self.release_failures.fetch_add(1, Ordering::Relaxed);
                RunEvent::error("lock_release_error").with("error", err.to_string())
            }
        };
        self.events.record(&event.with("namespace", namespace.as_str()).with("lock_key", key.as_str()));
    }

    /// Returns true when a row exists for the key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    pub fn is_held(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        key: &LockKey,
    ) -> Result<bool, StoreError> {
        session.with_connection(|connection| {
            let row: Option<i64> = connection
                .query_row(
                    "SELECT 1 FROM job_locks WHERE namespace = ?1 AND lock_key = ?2",
                    params![namespace.as_str(), key.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| StoreError::Db(err.to_string()))?;
            Ok(row.is_some())
        })
    }

    /// Returns the number of failed release attempts so far.
    #[must_use]
    pub fn release_failures(&self) -> u64 {
        self.release_failures.load(Ordering::Relaxed)
    }
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Scoped lock ownership; releases the key when dropped.
pub struct HeldLock<'a> {
    /// Lock manager that performs the release.
    lock: &'a RunLock,
    /// Session used for the release.
    session: &'a StoreSession,
    /// Namespace the key lives in.
    namespace: MetaNamespace,
    /// Held key.
    key: LockKey,
}

impl HeldLock<'_> {
    /// Returns the held key.
    #[must_use]
    pub const fn key(&self) -> &LockKey {
        &self.key
    }
}

impl Drop for HeldLock<'_> {
    fn drop(&mut self) {
        self.lock.release(self.session, &self.namespace, &self.key);
    }
}
