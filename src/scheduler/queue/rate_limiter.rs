//! Per-sort concurrency and a global per-minute cap for queue jobs.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{AcquireError, Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Limits job starts in two ways: at most `per_key_limit` jobs run at once
/// for any one key (the listing sort), and at most `per_minute` jobs start in
/// any sliding 60 second window across all keys.
#[derive(Debug)]
pub struct JobRateLimiter {
    per_key_limit: usize,
    per_minute: usize,
    semaphores: RwLock<HashMap<String, Arc<Semaphore>>>,
    recent_starts: Mutex<VecDeque<Instant>>,
}

impl JobRateLimiter {
    #[must_use]
    pub fn new(per_key_limit: usize, per_minute: u32) -> Self {
        Self {
            per_key_limit: per_key_limit.max(1),
            per_minute: usize::try_from(per_minute).unwrap_or(usize::MAX).max(1),
            semaphores: RwLock::new(HashMap::new()),
            recent_starts: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait for a slot for `key`, then for room in the per-minute window.
    ///
    /// # Errors
    ///
    /// Fails only if the key's semaphore was closed.
    pub async fn acquire(&self, key: &str) -> Result<JobPermit, AcquireError> {
        let semaphore = self.get_or_create_semaphore(key).await;
        let permit = semaphore.acquire_owned().await?;
        self.wait_for_window().await;

        Ok(JobPermit {
            key: key.to_string(),
            _permit: permit,
        })
    }

    /// Take a slot for `key` if one is free right now. Does not consult the
    /// per-minute window.
    pub async fn try_acquire(&self, key: &str) -> Option<JobPermit> {
        let semaphore = self.get_or_create_semaphore(key).await;
        semaphore.try_acquire_owned().ok().map(|permit| JobPermit {
            key: key.to_string(),
            _permit: permit,
        })
    }

    async fn wait_for_window(&self) {
        loop {
            let wait = {
                let mut starts = self.recent_starts.lock().await;
                let now = Instant::now();
                while starts.front().is_some_and(|t| now.duration_since(*t) >= WINDOW) {
                    starts.pop_front();
                }
                if starts.len() < self.per_minute {
                    starts.push_back(now);
                    return;
                }
                // Full: wait until the oldest start leaves the window.
                starts
                    .front()
                    .map_or(WINDOW, |oldest| WINDOW.saturating_sub(now.duration_since(*oldest)))
            };
            tokio::time::sleep(wait).await;
        }
    }

    async fn get_or_create_semaphore(&self, key: &str) -> Arc<Semaphore> {
        {
            let read_guard = self.semaphores.read().await;
            if let Some(sem) = read_guard.get(key) {
                return Arc::clone(sem);
            }
        }

        let mut write_guard = self.semaphores.write().await;
        if let Some(sem) = write_guard.get(key) {
            return Arc::clone(sem);
        }

        let semaphore = Arc::new(Semaphore::new(self.per_key_limit));
        write_guard.insert(key.to_string(), Arc::clone(&semaphore));
        semaphore
    }

    /// Number of keys seen so far.
    pub async fn key_count(&self) -> usize {
        self.semaphores.read().await.len()
    }

    /// Job starts counted in the current window.
    pub async fn starts_in_window(&self) -> usize {
        let starts = self.recent_starts.lock().await;
        let now = Instant::now();
        starts.iter().filter(|t| now.duration_since(**t) < WINDOW).count()
    }
}

/// Permission to run one job. Released on drop.
#[derive(Debug)]
pub struct JobPermit {
    key: String,
    _permit: OwnedSemaphorePermit,
}

impl JobPermit {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}
