//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::discovery::ServiceInstance;
use crate::load_balancer::LoadBalancer;

/// Round-robin selector.
/// Stores one counter per service name to rotate through its instances.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counters: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_index(&self, service: &str) -> usize {
        if let Some(counter) = self.counters.get(service) {
            return counter.fetch_add(1, Ordering::Relaxed);
        }
        self.counters
            .entry(service.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed)
    }
}

impl LoadBalancer for RoundRobin {
    fn select(&self, service: &str, instances: &[ServiceInstance]) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }

        let index = self.next_index(service) % instances.len();
        Some(instances[index].clone())
    }
}
