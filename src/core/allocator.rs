//! TW-004: Deterministic port allocation.
//!
//! A seed (integer, hashed string, or the number of prior allocations) seeds
//! a ChaCha8 generator that yields a candidate in [1024, 65535]. Collisions
//! probe seed+1, seed+2, ... up to `PROBE_LIMIT`; past that the allocator
//! sweeps upward from the last candidate so a free port is always found while
//! one exists. A full range is `AllocationExhausted`, never a loop.

use super::error::{SynthError, SynthResult};
use super::naming::seed_hash;
use rand_chacha::{
    rand_core::{Rng, SeedableRng},
    ChaCha8Rng,
};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

/// Lowest allocatable port.
pub const PORT_MIN: u16 = 1024;
/// Highest allocatable port.
pub const PORT_MAX: u16 = 65535;
/// Number of ports in the allocatable range.
pub const PORT_RANGE: usize = (PORT_MAX - PORT_MIN) as usize + 1;

const PROBE_LIMIT: usize = 1024;

/// Fixed host port of the local web app dev server.
pub const WEB_APP_PORT: u16 = 4000;
/// Fixed host port of the Step Functions emulator.
pub const STEP_FUNCTIONS_PORT: u16 = 8083;
/// Fixed host port of the Lambda emulator.
pub const LAMBDA_PORT: u16 = 3001;

/// Ports held back from seeded allocation for the whole session, so an
/// early allocation can never take a port a later construct needs.
pub const WELL_KNOWN_PORTS: [u16; 3] = [LAMBDA_PORT, WEB_APP_PORT, STEP_FUNCTIONS_PORT];

/// Seed for a port allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSeed {
    Number(u64),
    Name(String),
}

impl PortSeed {
    fn counter(&self) -> u64 {
        match self {
            Self::Number(n) => *n,
            Self::Name(s) => u64::from(seed_hash(s)),
        }
    }
}

impl From<u64> for PortSeed {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl From<u32> for PortSeed {
    fn from(n: u32) -> Self {
        Self::Number(u64::from(n))
    }
}

impl From<&str> for PortSeed {
    fn from(s: &str) -> Self {
        Self::Name(s.to_string())
    }
}

impl From<String> for PortSeed {
    fn from(s: String) -> Self {
        Self::Name(s)
    }
}

/// Candidate port for a seed counter. Pure.
pub fn candidate_port(counter: u64) -> u16 {
    let mut rng = ChaCha8Rng::seed_from_u64(counter);
    let r = u64::from(rng.next_u32());
    let offset = (r * PORT_RANGE as u64) >> 32;
    PORT_MIN + offset as u16
}

/// Allocation history for one synthesis session.
#[derive(Debug, Default, Clone)]
pub struct PortAllocator {
    history: Vec<u16>,
    reserved: FxHashSet<u16>,
    taken: FxHashSet<u16>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator with `ports` reserved up front.
    pub fn with_reserved(ports: &[u16]) -> Self {
        let mut alloc = Self::new();
        for &port in ports {
            alloc.reserved.insert(port);
            if port >= PORT_MIN {
                alloc.taken.insert(port);
            }
        }
        alloc
    }

    pub fn is_reserved(&self, port: u16) -> bool {
        self.reserved.contains(&port)
    }

    /// Allocate a port. `None` seeds with the number of prior allocations.
    pub fn allocate(&mut self, seed: Option<PortSeed>) -> SynthResult<u16> {
        if self.taken.len() >= PORT_RANGE {
            return Err(self.exhausted());
        }

        let mut counter = seed
            .as_ref()
            .map(PortSeed::counter)
            .unwrap_or(self.history.len() as u64);

        let mut last = candidate_port(counter);
        for probe in 0..PROBE_LIMIT {
            if probe > 0 {
                counter = counter.wrapping_add(1);
                last = candidate_port(counter);
            }
            if !self.taken.contains(&last) {
                debug!(port = last, probes = probe, ?seed, "allocated port");
                return Ok(self.accept(last));
            }
        }

        warn!(?seed, "port probing exceeded {} attempts; sweeping", PROBE_LIMIT);
        let start = usize::from(last - PORT_MIN);
        for step in 1..=PORT_RANGE {
            let port = PORT_MIN + ((start + step) % PORT_RANGE) as u16;
            if !self.taken.contains(&port) {
                return Ok(self.accept(port));
            }
        }
        Err(self.exhausted())
    }

    /// Mark a fixed port as in use so allocations avoid it. Reserving the
    /// same port twice is fine; reserving an allocated port is not.
    pub fn reserve(&mut self, port: u16) -> SynthResult<()> {
        if self.reserved.contains(&port) {
            return Ok(());
        }
        if self.taken.contains(&port) {
            return Err(SynthError::PortInUse(port));
        }
        self.reserved.insert(port);
        if port >= PORT_MIN {
            self.taken.insert(port);
        }
        Ok(())
    }

    /// Ports handed out by `allocate`, in order.
    pub fn history(&self) -> &[u16] {
        &self.history
    }

    pub fn is_taken(&self, port: u16) -> bool {
        self.taken.contains(&port)
    }

    /// Forget all allocations. Reservations stay.
    pub fn reset(&mut self) {
        self.history.clear();
        self.taken.clear();
        self.taken
            .extend(self.reserved.iter().copied().filter(|&p| p >= PORT_MIN));
    }

    fn accept(&mut self, port: u16) -> u16 {
        self.taken.insert(port);
        self.history.push(port);
        port
    }

    fn exhausted(&self) -> SynthError {
        SynthError::AllocationExhausted {
            low: PORT_MIN,
            high: PORT_MAX,
            allocated: self.taken.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tw004_candidate_in_range() {
        for counter in 0..500u64 {
            let p = candidate_port(counter);
            assert!(p >= PORT_MIN);
        }
    }

    #[test]
    fn test_tw004_same_seed_probes_forward() {
        let mut a = PortAllocator::new();
        let first = a.allocate(Some("Postgres".into())).unwrap();
        let second = a.allocate(Some("Postgres".into())).unwrap();
        assert_ne!(first, second);
        assert_eq!(first, candidate_port(u64::from(seed_hash("Postgres"))));
    }

    #[test]
    fn test_tw004_reproducible_across_sessions() {
        let seeds: Vec<PortSeed> = vec!["Postgres".into(), 7u64.into(), "Queue".into(), 7u64.into()];
        let run = |seeds: &[PortSeed]| {
            let mut a = PortAllocator::new();
            seeds
                .iter()
                .map(|s| a.allocate(Some(s.clone())).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(&seeds), run(&seeds));
    }

    #[test]
    fn test_tw004_omitted_seed_uses_history_len() {
        let mut a = PortAllocator::new();
        let p = a.allocate(None).unwrap();
        assert_eq!(p, candidate_port(0));
        let q = a.allocate(None).unwrap();
        assert_eq!(q, candidate_port(1));
        assert_eq!(a.history(), &[p, q]);
    }

    #[test]
    fn test_tw004_reserved_ports_avoided() {
        let mut a = PortAllocator::new();
        let blocked = candidate_port(42);
        a.reserve(blocked).unwrap();
        let p = a.allocate(Some(42u64.into())).unwrap();
        assert_ne!(p, blocked);
        if candidate_port(43) != blocked {
            assert_eq!(p, candidate_port(43));
        }
        // reserving twice is idempotent
        a.reserve(blocked).unwrap();
        // reserving an allocated port conflicts
        assert!(matches!(a.reserve(p), Err(SynthError::PortInUse(_))));
    }

    #[test]
    fn test_tw004_exhaustion_is_an_error() {
        let mut a = PortAllocator::new();
        let free = [2000u16, 40000, 65535];
        for port in PORT_MIN..=PORT_MAX {
            if !free.contains(&port) {
                a.reserve(port).unwrap();
            }
        }
        let mut got: Vec<u16> = (0..3).map(|i| a.allocate(Some(PortSeed::Number(i))).unwrap()).collect();
        got.sort_unstable();
        assert_eq!(got, free.to_vec());
        let err = a.allocate(None).unwrap_err();
        assert!(matches!(err, SynthError::AllocationExhausted { .. }));
    }

    #[test]
    fn test_tw004_reset_keeps_reservations() {
        let mut a = PortAllocator::new();
        let p = a.allocate(None).unwrap();
        a.reserve(4000).unwrap();
        a.reset();
        assert!(a.history().is_empty());
        if p != 4000 {
            assert!(!a.is_taken(p));
        }
        assert!(a.is_taken(4000));
    }

    #[test]
    fn test_tw004_well_known_ports_never_allocated() {
        let mut a = PortAllocator::with_reserved(&WELL_KNOWN_PORTS);
        for port in WELL_KNOWN_PORTS {
            assert!(a.is_reserved(port));
            // the owning construct reserves again later
            a.reserve(port).unwrap();
        }
        let counter = (0..u64::MAX)
            .find(|&c| candidate_port(c) == WEB_APP_PORT)
            .unwrap();
        let p = a.allocate(Some(counter.into())).unwrap();
        assert_ne!(p, WEB_APP_PORT);
        a.reset();
        assert_ne!(a.allocate(Some(counter.into())).unwrap(), WEB_APP_PORT);
    }

    proptest! {
        #[test]
        fn prop_tw004_distinct_ports(seeds in proptest::collection::vec(any::<u64>(), 1..64)) {
            let mut a = PortAllocator::new();
            let mut seen = std::collections::HashSet::new();
            for s in seeds {
                let p = a.allocate(Some(s.into())).unwrap();
                prop_assert!(p >= PORT_MIN);
                prop_assert!(seen.insert(p));
            }
        }
    }
}
