//! # Lock Protocol
//!
//! Implements the reader / writer / committer interlock over a pair of
//! raw reader-writer locks and a raw mutex.
//!
//! ## Lock Hierarchy
//!
//! - **Read lock**: shared with other readers and with a writer; excluded
//!   only by an active commit.
//! - **Write lock**: exclusive among writers; compatible with readers.
//! - **Commit lock**: upgrades a held write lock, writers stay excluded
//!   (the write lock is retained) and readers are excluded by taking the
//!   shared lock exclusively.
//!
//! A third lock, the *signal* lock, serializes commit against read
//! acquisition: a pending commit takes it exclusively, which stops new
//! readers from entering `shared` while the committer waits for the
//! stragglers to drain.
//!
//! ## Acquisition Order
//!
//! signal → shared → writer. The `try_` variants release anything partially
//! acquired and hand back what the caller passed in, so a failed attempt
//! leaves the protocol exactly as it found it.
//!
//! ## Guard Ownership
//!
//! Guards own an `Arc` of the protocol instead of borrowing it, so they can
//! outlive the stack frame that acquired them and travel inside transaction
//! objects. Raw lock primitives (via `lock_api`) make the manual
//! unlock-on-drop sound.

use std::sync::Arc;

use parking_lot::lock_api::{RawMutex as _, RawRwLock as _};
use parking_lot::{RawMutex, RawRwLock};

/// The three-mode lock hierarchy guarding one file.
pub struct LockProtocol {
    signal: RawRwLock,
    shared: RawRwLock,
    writer: RawMutex,
}

impl LockProtocol {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            signal: RawRwLock::INIT,
            shared: RawRwLock::INIT,
            writer: RawMutex::INIT,
        })
    }

    /// Blocks until read access is granted.
    pub fn read_access(this: &Arc<Self>) -> ReadLock {
        this.signal.lock_shared();
        this.shared.lock_shared();
        // SAFETY: the shared signal lock was acquired two lines up and is
        // released exactly once, here.
        unsafe { this.signal.unlock_shared() };
        ReadLock {
            protocol: Arc::clone(this),
        }
    }

    /// Returns `None` if either the signal or the shared lock is contended.
    pub fn try_read_access(this: &Arc<Self>) -> Option<ReadLock> {
        if !this.signal.try_lock_shared() {
            return None;
        }
        let acquired = this.shared.try_lock_shared();
        // SAFETY: the shared signal lock was acquired above; released once.
        unsafe { this.signal.unlock_shared() };
        if !acquired {
            return None;
        }
        Some(ReadLock {
            protocol: Arc::clone(this),
        })
    }

    /// Blocks until write access is granted. Readers may still be active.
    pub fn write_access(this: &Arc<Self>) -> WriteLock {
        this.writer.lock();
        WriteLock {
            protocol: Arc::clone(this),
        }
    }

    pub fn try_write_access(this: &Arc<Self>) -> Option<WriteLock> {
        if !this.writer.try_lock() {
            return None;
        }
        Some(WriteLock {
            protocol: Arc::clone(this),
        })
    }

    /// Upgrades a held write lock to a commit lock, excluding readers.
    ///
    /// # Panics
    ///
    /// Panics when `write_lock` belongs to a different protocol instance;
    /// that is a caller bug, not a recoverable condition.
    pub fn commit_access(this: &Arc<Self>, write_lock: WriteLock) -> CommitLock {
        assert!(
            Arc::ptr_eq(this, &write_lock.protocol),
            "incompatible write lock passed to commit_access"
        );

        this.signal.lock_exclusive();
        this.shared.lock_exclusive();
        // SAFETY: the exclusive signal lock was acquired above; released
        // exactly once, after the shared lock is held.
        unsafe { this.signal.unlock_exclusive() };

        CommitLock {
            write_lock,
            shared_held: true,
        }
    }

    /// Non-blocking variant of [`Self::commit_access`]. On contention the
    /// write lock is handed back untouched.
    ///
    /// # Panics
    ///
    /// Panics when `write_lock` belongs to a different protocol instance.
    pub fn try_commit_access(
        this: &Arc<Self>,
        write_lock: WriteLock,
    ) -> Result<CommitLock, WriteLock> {
        assert!(
            Arc::ptr_eq(this, &write_lock.protocol),
            "incompatible write lock passed to try_commit_access"
        );

        if !this.signal.try_lock_exclusive() {
            return Err(write_lock);
        }
        let acquired = this.shared.try_lock_exclusive();
        // SAFETY: the exclusive signal lock was acquired above; released once.
        unsafe { this.signal.unlock_exclusive() };
        if !acquired {
            return Err(write_lock);
        }

        Ok(CommitLock {
            write_lock,
            shared_held: true,
        })
    }
}

/// Shared read access. Dropping releases it.
pub struct ReadLock {
    protocol: Arc<LockProtocol>,
}

impl Drop for ReadLock {
    fn drop(&mut self) {
        // SAFETY: constructing a ReadLock acquires exactly one shared hold
        // on `shared`, released exactly once here.
        unsafe { self.protocol.shared.unlock_shared() };
    }
}

/// Exclusive write access among writers. Dropping releases it.
pub struct WriteLock {
    protocol: Arc<LockProtocol>,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        // SAFETY: constructing a WriteLock acquires the writer mutex,
        // released exactly once here.
        unsafe { self.protocol.writer.unlock() };
    }
}

/// Full exclusion: holds the write lock plus exclusive shared access.
pub struct CommitLock {
    write_lock: WriteLock,
    shared_held: bool,
}

impl CommitLock {
    /// Downgrades back to plain write access, letting readers in again.
    pub fn into_write_lock(mut self) -> WriteLock {
        self.release_shared();
        // SAFETY: write_lock is moved out and `self` forgotten, so neither
        // Drop runs twice nor is the writer mutex released early.
        unsafe {
            let write_lock = std::ptr::read(&self.write_lock);
            std::mem::forget(self);
            write_lock
        }
    }

    fn release_shared(&mut self) {
        if self.shared_held {
            // SAFETY: the exclusive shared lock is held while shared_held
            // is true; released exactly once.
            unsafe { self.write_lock.protocol.shared.unlock_exclusive() };
            self.shared_held = false;
        }
    }
}

impl Drop for CommitLock {
    fn drop(&mut self) {
        self.release_shared();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_share_access() {
        let protocol = LockProtocol::new();

        let r1 = LockProtocol::read_access(&protocol);
        let r2 = LockProtocol::try_read_access(&protocol);
        assert!(r2.is_some());

        drop(r1);
        drop(r2);
    }

    #[test]
    fn writers_exclude_writers_but_not_readers() {
        let protocol = LockProtocol::new();

        let w = LockProtocol::write_access(&protocol);
        assert!(LockProtocol::try_write_access(&protocol).is_none());
        assert!(LockProtocol::try_read_access(&protocol).is_some());

        drop(w);
        assert!(LockProtocol::try_write_access(&protocol).is_some());
    }

    #[test]
    fn commit_excludes_readers() {
        let protocol = LockProtocol::new();

        let w = LockProtocol::write_access(&protocol);
        let c = LockProtocol::commit_access(&protocol, w);

        assert!(LockProtocol::try_read_access(&protocol).is_none());
        assert!(LockProtocol::try_write_access(&protocol).is_none());

        drop(c);
        assert!(LockProtocol::try_read_access(&protocol).is_some());
        assert!(LockProtocol::try_write_access(&protocol).is_some());
    }

    #[test]
    fn try_commit_returns_write_lock_on_contention() {
        let protocol = LockProtocol::new();

        let reader = LockProtocol::read_access(&protocol);
        let w = LockProtocol::write_access(&protocol);

        let w = match LockProtocol::try_commit_access(&protocol, w) {
            Ok(_) => panic!("commit must not succeed while a reader is active"),
            Err(w) => w,
        };

        drop(reader);
        assert!(LockProtocol::try_commit_access(&protocol, w).is_ok());
    }

    #[test]
    fn commit_downgrades_to_write_lock() {
        let protocol = LockProtocol::new();

        let w = LockProtocol::write_access(&protocol);
        let c = LockProtocol::commit_access(&protocol, w);

        let _w = c.into_write_lock();
        assert!(LockProtocol::try_read_access(&protocol).is_some());
        assert!(LockProtocol::try_write_access(&protocol).is_none());
    }

    #[test]
    #[should_panic(expected = "incompatible write lock")]
    fn commit_access_rejects_foreign_write_lock() {
        let a = LockProtocol::new();
        let b = LockProtocol::new();

        let w = LockProtocol::write_access(&a);
        let _ = LockProtocol::commit_access(&b, w);
    }
}
