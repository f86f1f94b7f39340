// Copyright 2024 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The refresh state machine shared by secondary and stub zones.
//!
//! The machine's transitions are driven by the apex SOA timers: a zone
//! becomes due for refresh `refresh` seconds after its last successful
//! refresh, retries every `retry` seconds after a failure, and expires
//! once `expire` seconds have passed without success. While a zone is
//! expired, every query against it answers SERVFAIL; a successful
//! refresh returns it to service.
//!
//! The tracker only records state; the refresh driver in the catalog
//! owns the timer thread and the transfer I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// The refresh state of a secondary or stub zone.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RefreshState {
    /// The zone is current; the next refresh is due per the SOA refresh
    /// timer.
    Idle,

    /// A refresh is running.
    Refreshing,

    /// The last refresh attempt failed; the next attempt is due per the
    /// SOA retry timer.
    Failed,

    /// The SOA expire interval has elapsed without a successful
    /// refresh. Queries answer SERVFAIL until a refresh succeeds.
    Expired,
}

#[derive(Debug)]
struct Inner {
    state: RefreshState,
    last_refreshed: Option<SystemTime>,
    last_attempt: Option<SystemTime>,
}

/// Tracks the refresh state of one zone.
#[derive(Debug)]
pub struct RefreshTracker {
    inner: Mutex<Inner>,

    /// Suppresses concurrent refreshes of the same zone. Checked and
    /// set together in [`RefreshTracker::begin`].
    in_progress: AtomicBool,
}

impl RefreshTracker {
    /// Creates a tracker for a zone that has never been refreshed. Such
    /// a zone is due for refresh immediately.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                last_refreshed: None,
                last_attempt: None,
            }),
            in_progress: AtomicBool::new(false),
        }
    }

    /// Creates a tracker for a zone whose content was just accepted
    /// (e.g. loaded from a snapshot written after a transfer).
    pub fn refreshed_at(time: SystemTime) -> Self {
        let tracker = Self::new();
        tracker.inner.lock().unwrap().last_refreshed = Some(time);
        tracker
    }

    /// Attempts to begin a refresh. Returns `false` if one is already
    /// in progress, in which case the caller must back off.
    pub fn begin(&self) -> bool {
        if self.in_progress.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.last_attempt = Some(SystemTime::now());
        if inner.state != RefreshState::Expired {
            inner.state = RefreshState::Refreshing;
        }
        true
    }

    /// Records a successful refresh, returning the zone to service.
    pub fn complete(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = RefreshState::Idle;
        inner.last_refreshed = Some(SystemTime::now());
        drop(inner);
        self.in_progress.store(false, Ordering::Release);
    }

    /// Records a failed or cancelled refresh. The zone stays in service
    /// (unless already expired); the retry timer schedules the next
    /// attempt.
    pub fn fail(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != RefreshState::Expired {
            inner.state = RefreshState::Failed;
        }
        drop(inner);
        self.in_progress.store(false, Ordering::Release);
    }

    /// Checks the zone against the SOA expire interval, moving it to
    /// [`RefreshState::Expired`] when the interval has elapsed since
    /// the last successful refresh. Returns the resulting state.
    pub fn check_expiry(&self, expire: Duration, now: SystemTime) -> RefreshState {
        let mut inner = self.inner.lock().unwrap();
        if let Some(last) = inner.last_refreshed {
            if now.duration_since(last).unwrap_or(Duration::ZERO) > expire {
                inner.state = RefreshState::Expired;
            }
        }
        inner.state
    }

    /// Returns the current state.
    pub fn state(&self) -> RefreshState {
        self.inner.lock().unwrap().state
    }

    /// Returns whether the zone is expired.
    pub fn is_expired(&self) -> bool {
        self.state() == RefreshState::Expired
    }

    /// Returns the time of the last successful refresh.
    pub fn last_refreshed(&self) -> Option<SystemTime> {
        self.inner.lock().unwrap().last_refreshed
    }

    /// Computes when the next refresh attempt is due, given the zone's
    /// SOA refresh and retry intervals. A zone that has never been
    /// refreshed (or has failed or expired) is driven by the retry
    /// timer from its last attempt; otherwise the refresh timer runs
    /// from the last success.
    pub fn next_due(&self, refresh: Duration, retry: Duration) -> SystemTime {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            RefreshState::Idle => match inner.last_refreshed {
                Some(last) => last + refresh,
                None => SystemTime::now(),
            },
            RefreshState::Refreshing => match inner.last_attempt {
                // Re-examined a retry interval later; the in-progress
                // flag suppresses an overlapping attempt either way.
                Some(last) => last + retry,
                None => SystemTime::now(),
            },
            RefreshState::Failed | RefreshState::Expired => match inner.last_attempt {
                Some(last) => last + retry,
                None => SystemTime::now(),
            },
        }
    }
}

impl Default for RefreshTracker {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
