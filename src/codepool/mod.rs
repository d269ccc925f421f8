//! Per-host pools of access codes with cool-down timestamps
//!
//! Each backend host owns an ordered queue of [`Codepoint`]s guarded by its
//! own lock. The set of hosts is fixed at construction.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::models::Codepoint;
use crate::utils::mask_code;

#[derive(Debug, Default)]
pub struct CodePool {
    pools: HashMap<String, Mutex<VecDeque<Codepoint>>>,
}

impl CodePool {
    /// Place every code into every host's pool, in the given order
    pub fn new<H, C>(hosts: H, codes: &[C]) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        C: AsRef<str>,
    {
        let now = Utc::now();
        let pools = hosts
            .into_iter()
            .map(|host| {
                let queue = codes
                    .iter()
                    .map(|c| Codepoint {
                        code: c.as_ref().to_string(),
                        next_usable_at: now,
                    })
                    .collect();
                (host.into(), Mutex::new(queue))
            })
            .collect();
        Self { pools }
    }

    fn queue(&self, host: &str) -> Option<MutexGuard<'_, VecDeque<Codepoint>>> {
        self.pools
            .get(host)
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// First codepoint in queue order that is usable now
    pub fn usable(&self, host: &str) -> Option<Codepoint> {
        self.usable_at(host, Utc::now())
    }

    /// First codepoint in queue order that is usable at `now`
    pub fn usable_at(&self, host: &str, now: DateTime<Utc>) -> Option<Codepoint> {
        self.queue(host)?
            .iter()
            .find(|cp| cp.is_usable_at(now))
            .cloned()
    }

    /// Park `code` for `duration` starting now
    pub fn cool_down(&self, host: &str, code: &str, duration: Duration) {
        self.cool_down_at(host, code, duration, Utc::now());
    }

    /// Park `code` until `now + duration`
    pub fn cool_down_at(&self, host: &str, code: &str, duration: Duration, now: DateTime<Utc>) {
        let Some(mut queue) = self.queue(host) else {
            return;
        };
        if let Some(cp) = queue.iter_mut().find(|cp| cp.code == code) {
            cp.next_usable_at = now + duration;
            debug!(
                host = %host,
                code = %mask_code(code),
                until = %cp.next_usable_at,
                "Code cooling down"
            );
        }
    }

    /// Delete `code` from the host's pool. Absent codes are ignored.
    pub fn remove(&self, host: &str, code: &str) {
        let Some(mut queue) = self.queue(host) else {
            return;
        };
        let before = queue.len();
        queue.retain(|cp| cp.code != code);
        if queue.len() < before {
            info!(host = %host, code = %mask_code(code), remaining = queue.len(), "Code removed");
        }
    }

    /// Move the first codepoint to the back
    pub fn rotate(&self, host: &str) {
        if let Some(mut queue) = self.queue(host) {
            if let Some(front) = queue.pop_front() {
                queue.push_back(front);
            }
        }
    }

    /// Number of codes left for a host
    pub fn len(&self, host: &str) -> usize {
        self.queue(host).map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, host: &str) -> bool {
        self.len(host) == 0
    }

    /// Snapshot of a host's queue in order
    pub fn codes(&self, host: &str) -> Vec<Codepoint> {
        self.queue(host)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }
}
