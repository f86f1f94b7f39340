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

//! The debounced zone-save loop.
//!
//! Saving is coalesced: each request records the zone in a pending set
//! and arms a single ten-second timer. When the timer fires, the whole
//! batch is serialized in one critical section; zones whose save fails
//! are re-queued and the timer is rearmed. Dropping the scheduler
//! flushes whatever is still pending, synchronously.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::error;

/// How long saves are debounced before a batch is written.
pub const SAVE_DEBOUNCE: Duration = Duration::from_secs(10);

/// The function that actually serializes one zone, by its lowercase
/// name. Returns whether the save succeeded; failed zones stay
/// pending.
type FlushFn = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct State {
    pending: HashSet<String>,
    deadline: Option<Instant>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
    flush: FlushFn,
}

/// The debounced save scheduler. One exists per catalog.
pub struct SaveScheduler {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl SaveScheduler {
    /// Creates the scheduler and starts its timer thread.
    pub fn new(flush: FlushFn) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: HashSet::new(),
                deadline: None,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
            flush,
        });
        let thread_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("zone-saver".to_owned())
            .spawn(move || run(&thread_shared))
            .ok();
        if thread.is_none() {
            error!("failed to start the zone save thread; saves will only happen on shutdown");
        }
        Self { shared, thread }
    }

    /// Records a zone as pending and arms the timer if it is not
    /// already armed.
    pub fn schedule(&self, zone: String) {
        let mut state = self.shared.state.lock().unwrap();
        state.pending.insert(zone);
        if state.deadline.is_none() {
            state.deadline = Some(Instant::now() + SAVE_DEBOUNCE);
        }
        drop(state);
        self.shared.wakeup.notify_one();
    }

    /// Writes out everything pending, synchronously, without waiting
    /// for the timer.
    pub fn flush_now(&self) {
        let mut state = self.shared.state.lock().unwrap();
        let batch: Vec<String> = state.pending.drain().collect();
        state.deadline = None;
        for zone in batch {
            if !(self.shared.flush)(&zone) {
                state.pending.insert(zone);
            }
        }
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
        }
        self.shared.wakeup.notify_one();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        // Whatever is still pending is written before we go away.
        self.flush_now();
    }
}

fn run(shared: &Shared) {
    let mut state = shared.state.lock().unwrap();
    loop {
        if state.shutdown {
            return;
        }
        match state.deadline {
            None => {
                state = shared.wakeup.wait(state).unwrap();
            }
            Some(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    let (next, _) = shared
                        .wakeup
                        .wait_timeout(state, deadline - now)
                        .unwrap();
                    state = next;
                    continue;
                }

                // The batch is serialized in one critical section;
                // failures are re-queued for the next tick.
                let batch: Vec<String> = state.pending.drain().collect();
                state.deadline = None;
                for zone in batch {
                    if !(shared.flush)(&zone) {
                        state.pending.insert(zone);
                    }
                }
                if !state.pending.is_empty() {
                    state.deadline = Some(Instant::now() + SAVE_DEBOUNCE);
                }
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn scheduling_is_coalesced_until_flush() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = written.clone();
        let scheduler = SaveScheduler::new(Box::new(move |zone| {
            sink.lock().unwrap().push(zone.to_owned());
            true
        }));

        scheduler.schedule("example.com.".to_owned());
        scheduler.schedule("example.com.".to_owned());
        scheduler.schedule("example.org.".to_owned());

        // Nothing is written while the timer is armed.
        assert!(written.lock().unwrap().is_empty());

        scheduler.flush_now();
        let mut batch = written.lock().unwrap().clone();
        batch.sort();
        assert_eq!(batch, ["example.com.", "example.org."]);
    }

    #[test]
    fn failed_saves_stay_pending() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let scheduler = SaveScheduler::new(Box::new(move |_| {
            // Fail the first attempt, succeed afterwards.
            counter.fetch_add(1, Ordering::SeqCst) > 0
        }));

        scheduler.schedule("example.com.".to_owned());
        scheduler.flush_now();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        // The zone is still pending, so the next flush retries it.
        scheduler.flush_now();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn drop_flushes_whatever_is_pending() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = written.clone();
        let scheduler = SaveScheduler::new(Box::new(move |zone| {
            sink.lock().unwrap().push(zone.to_owned());
            true
        }));
        scheduler.schedule("example.com.".to_owned());
        drop(scheduler);
        assert_eq!(&*written.lock().unwrap(), &["example.com."]);
    }
}
