//! Ordered candidate host list with shuffle-once and reconnect backoff.

use rand::seq::SliceRandom;

use crate::config::{ConnectionConfig, HostSpec};

/// Tracks which host to try next and how long to wait before the attempt.
pub struct HostPool {
    hosts: Vec<HostSpec>,
    index: usize,
    current_delay_ms: u64,
    initial_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
    exponential: bool,
    max_attempts: u32,
    attempts: u32,
}

impl HostPool {
    pub fn new(config: &ConnectionConfig) -> Self {
        let mut hosts = config.hosts.clone();
        if config.randomize {
            hosts.shuffle(&mut rand::thread_rng());
        }
        HostPool {
            hosts,
            index: 0,
            current_delay_ms: config.initial_reconnect_delay_ms,
            initial_delay_ms: config.initial_reconnect_delay_ms,
            max_delay_ms: config.max_reconnect_delay_ms,
            multiplier: config.back_off_multiplier,
            exponential: config.use_exponential_back_off,
            max_attempts: config.max_reconnect_attempts,
            attempts: 0,
        }
    }

    pub fn current(&self) -> &HostSpec {
        &self.hosts[self.index]
    }

    /// Advance to the next host in list order, wrapping around. Returns the
    /// delay to sleep before attempting it, and increments the attempt
    /// counter. Returns `Err` once `max_reconnect_attempts` is exhausted.
    pub fn change_host(&mut self) -> Result<u64, u32> {
        self.attempts += 1;
        if self.max_attempts != 0 && self.attempts > self.max_attempts {
            return Err(self.attempts);
        }
        self.index = (self.index + 1) % self.hosts.len();
        let delay = self.current_delay_ms;
        self.current_delay_ms = if self.exponential {
            ((self.current_delay_ms as f64) * self.multiplier) as u64
        } else {
            self.current_delay_ms + self.initial_delay_ms
        }
        .min(self.max_delay_ms);
        Ok(delay)
    }

    /// Reset attempt count and backoff after a successful connect.
    pub fn on_connected(&mut self) {
        self.attempts = 0;
        self.current_delay_ms = self.initial_delay_ms;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(n: usize) -> Vec<HostSpec> {
        (0..n).map(|i| HostSpec::new(format!("h{i}"), 61613)).collect()
    }

    #[test]
    fn change_host_cycles_in_list_order() {
        let config = ConnectionConfig::new(hosts(3));
        let mut pool = HostPool::new(&config);
        assert_eq!(pool.current().host, "h0");
        pool.change_host().unwrap();
        assert_eq!(pool.current().host, "h1");
        pool.change_host().unwrap();
        assert_eq!(pool.current().host, "h2");
        pool.change_host().unwrap();
        assert_eq!(pool.current().host, "h0");
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let config = ConnectionConfig::new(hosts(1)).backoff(10, 50, 2.0, true);
        let mut pool = HostPool::new(&config);
        assert_eq!(pool.change_host().unwrap(), 10);
        assert_eq!(pool.change_host().unwrap(), 20);
        assert_eq!(pool.change_host().unwrap(), 40);
        assert_eq!(pool.change_host().unwrap(), 50); // capped
    }

    #[test]
    fn max_reconnect_attempts_zero_is_unlimited() {
        let config = ConnectionConfig::new(hosts(1)).max_reconnect_attempts(0);
        let mut pool = HostPool::new(&config);
        for _ in 0..50 {
            assert!(pool.change_host().is_ok());
        }
    }

    #[test]
    fn max_reconnect_attempts_exhausts() {
        let config = ConnectionConfig::new(hosts(1)).max_reconnect_attempts(2);
        let mut pool = HostPool::new(&config);
        assert!(pool.change_host().is_ok());
        assert!(pool.change_host().is_ok());
        assert!(pool.change_host().is_err());
    }

    #[test]
    fn on_connected_resets_backoff_and_attempts() {
        let config = ConnectionConfig::new(hosts(1)).backoff(10, 50, 2.0, true);
        let mut pool = HostPool::new(&config);
        pool.change_host().unwrap();
        pool.change_host().unwrap();
        pool.on_connected();
        assert_eq!(pool.attempts(), 0);
        assert_eq!(pool.change_host().unwrap(), 10);
    }
}
