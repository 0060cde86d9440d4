/*!
 * Token-bucket gate for upstream drive calls
 *
 * Every call that reaches the drive API reserves one token first. A caller
 * that cannot get a token within the wait timeout fails with
 * `DavError::RateLimited` instead of queueing forever.
 */

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::DavError;

/// Upper bound on how long a single caller waits for a token
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

struct Bucket {
    /// May go negative: each negative unit is a reservation queued for a future refill
    tokens: i64,
    last_refill: Instant,
}

struct PendingReservation<'a> {
    limiter: &'a RateLimiter,
    completed: bool,
}

impl Drop for PendingReservation<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.limiter.cancel_reservation();
        }
    }
}

pub struct RateLimiter {
    capacity: i64,
    refill_every: Duration,
    max_wait: Duration,
    bucket: Mutex<Bucket>,
    name: String,
}

impl RateLimiter {
    /// Bucket holding `capacity` tokens, adding one back every `refill_every`.
    /// Starts full.
    pub fn new(capacity: u32, refill_every: Duration, max_wait: Duration, name: String) -> Self {
        let capacity = i64::from(capacity.max(1));
        Self {
            capacity,
            refill_every,
            max_wait,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            name,
        }
    }

    /// `rate` tokens of burst, one token refilled per second, 10 second wait bound
    pub fn per_second(rate: u32) -> Self {
        Self::new(rate, Duration::from_secs(1), DEFAULT_WAIT_TIMEOUT, "drive".to_string())
    }

    /// Waits for a token. Fails immediately when the wait would exceed the timeout.
    pub async fn acquire(&self) -> Result<(), DavError> {
        let wait = self.reserve(Instant::now())?;

        if wait.is_zero() {
            return Ok(());
        }
        if wait > Duration::from_millis(100) {
            debug!("Rate limiter '{}': waiting {:?} for a token", self.name, wait);
        }

        // Dropped mid-sleep (client went away): the queued token goes back
        let mut pending = PendingReservation {
            limiter: self,
            completed: false,
        };
        tokio::time::sleep(wait).await;
        pending.completed = true;
        Ok(())
    }

    /// Tokens that can be taken right now without waiting
    pub fn available(&self) -> u32 {
        let mut bucket = self.lock();
        self.refill(&mut bucket, Instant::now());
        u32::try_from(bucket.tokens.max(0)).unwrap_or(0)
    }

    fn reserve(&self, now: Instant) -> Result<Duration, DavError> {
        let mut bucket = self.lock();
        self.refill(&mut bucket, now);

        bucket.tokens -= 1;
        if bucket.tokens >= 0 {
            return Ok(Duration::ZERO);
        }

        let deficit = u32::try_from(-bucket.tokens).unwrap_or(u32::MAX);
        let wait = (self.refill_every * deficit).saturating_sub(now.duration_since(bucket.last_refill));

        if wait > self.max_wait {
            bucket.tokens += 1;
            warn!("Rate limiter '{}': no token within {:?}", self.name, self.max_wait);
            return Err(DavError::RateLimited);
        }

        Ok(wait)
    }

    fn cancel_reservation(&self) {
        let mut bucket = self.lock();
        bucket.tokens = (bucket.tokens + 1).min(self.capacity);
        debug!("Rate limiter '{}': abandoned wait returned its token", self.name);
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        if self.refill_every.is_zero() {
            bucket.tokens = self.capacity;
            bucket.last_refill = now;
            return;
        }

        let elapsed = now.duration_since(bucket.last_refill);
        let intervals = elapsed.as_nanos() / self.refill_every.as_nanos();
        if intervals > 0 {
            let intervals = u32::try_from(intervals).unwrap_or(u32::MAX);
            bucket.tokens = bucket.tokens.saturating_add(i64::from(intervals));
            bucket.last_refill += self.refill_every * intervals;
        }
        if bucket.tokens >= self.capacity {
            bucket.tokens = self.capacity;
            bucket.last_refill = now;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bucket> {
        // Bucket arithmetic cannot leave the state torn, so a poisoned lock is still usable
        self.bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
