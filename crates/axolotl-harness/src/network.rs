//! Lossy, reordering message transport.

use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha20Rng;

use crate::Envelope;

/// Faults the network applies to each sent envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryPolicy {
    /// Probability an envelope is silently lost
    pub drop_rate: f64,
    /// Probability a delivered envelope arrives twice
    pub duplicate_rate: f64,
    /// Shuffle each flushed batch
    pub reorder: bool,
}

impl DeliveryPolicy {
    /// Every envelope delivered once, in send order.
    pub fn reliable() -> Self {
        Self { drop_rate: 0.0, duplicate_rate: 0.0, reorder: false }
    }

    /// Every envelope delivered once, in random order.
    pub fn reordering() -> Self {
        Self { reorder: true, ..Self::reliable() }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::reliable()
    }
}

/// Counters for what the network did to traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Envelopes handed to [`SimNetwork::send`]
    pub sent: usize,
    /// Envelopes lost
    pub dropped: usize,
    /// Extra copies injected
    pub duplicated: usize,
}

/// Seeded in-memory network.
///
/// Envelopes accumulate until [`SimNetwork::flush`] hands the batch back.
/// Batches never interleave, so a test controls how far traffic may be
/// reordered by choosing when to flush.
pub struct SimNetwork {
    rng: ChaCha20Rng,
    policy: DeliveryPolicy,
    in_flight: Vec<Envelope>,
    stats: NetworkStats,
}

impl SimNetwork {
    /// Network with `policy`, seeded with `seed`.
    ///
    /// # Panics
    ///
    /// Panics if a rate is outside `[0.0, 1.0]`.
    pub fn new(policy: DeliveryPolicy, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&policy.drop_rate),
            "drop_rate must be between 0.0 and 1.0, got {}",
            policy.drop_rate
        );
        assert!(
            (0.0..=1.0).contains(&policy.duplicate_rate),
            "duplicate_rate must be between 0.0 and 1.0, got {}",
            policy.duplicate_rate
        );

        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            policy,
            in_flight: Vec::new(),
            stats: NetworkStats::default(),
        }
    }

    /// Queue `envelope`, applying loss and duplication.
    pub fn send(&mut self, envelope: Envelope) {
        self.stats.sent += 1;
        if self.rng.gen_bool(self.policy.drop_rate) {
            self.stats.dropped += 1;
            tracing::trace!(from = %envelope.from, to = %envelope.to, "Dropped envelope");
            return;
        }
        if self.rng.gen_bool(self.policy.duplicate_rate) {
            self.stats.duplicated += 1;
            self.in_flight.push(envelope.clone());
        }
        self.in_flight.push(envelope);
    }

    /// Queue every envelope in `envelopes`.
    pub fn send_all(&mut self, envelopes: impl IntoIterator<Item = Envelope>) {
        for envelope in envelopes {
            self.send(envelope);
        }
    }

    /// Hand back everything queued since the last flush.
    pub fn flush(&mut self) -> Vec<Envelope> {
        let mut batch = std::mem::take(&mut self.in_flight);
        if self.policy.reorder {
            batch.shuffle(&mut self.rng);
        }
        batch
    }

    /// Number of queued envelopes.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Traffic counters so far.
    pub fn stats(&self) -> NetworkStats {
        self.stats
    }
}
