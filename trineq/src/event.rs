//! Events: fixed-length outcome sequences, their canonical hash, and enumeration (spec §3).

/// A single outcome. `UNKNOWN` sentinel values (used in bound-aware contexts) are represented as
/// `n` where `n` is the number of "real" outcomes for the context at hand.
pub type Outcome = u8;

/// An event: an ordered sequence of outcomes, one per party in the current context.
pub type Event = Vec<Outcome>;

/// Computes the canonical hash of `event` for an alphabet of size `base` (spec §3): `sum_i
/// event[i] * base^i`. `base` is `n` in "plain" contexts and `n+1` in bound-aware ones.
#[must_use]
pub fn hash_event(event: &[Outcome], base: u64) -> u64 {
    let mut acc = 0u64;
    let mut weight = 1u64;
    for &o in event {
        acc += u64::from(o) * weight;
        weight *= base;
    }
    acc
}

/// Reconstructs the event of length `len` whose hash (under alphabet size `base`) is `hash`.
#[must_use]
pub fn event_from_hash(mut hash: u64, base: u64, len: usize) -> Event {
    let mut event = Event::with_capacity(len);
    for _ in 0..len {
        event.push(u8::try_from(hash % base).unwrap());
        hash /= base;
    }
    event
}

/// Iterates over every event of length `len` over an alphabet of size `base`, in lexicographic
/// order (position `0` varies slowest), matching the depth-first enumeration order used by the
/// tree filler (spec §4.5) and the orbit partition (spec §4.2).
pub struct EventRange {
    len: usize,
    base: u8,
    next: Option<Event>,
}

impl EventRange {
    /// Creates a new range over events of length `len` with `base` outcomes per position.
    #[must_use]
    pub fn new(len: usize, base: u8) -> Self {
        let next = if base == 0 && len > 0 {
            None
        } else {
            Some(vec![0; len])
        };
        Self { len, base, next }
    }
}

impl Iterator for EventRange {
    type Item = Event;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;

        // advance `self.next`, least-significant position (the last one) first
        let mut advance = current.clone();
        let mut carry = true;
        for slot in advance.iter_mut().rev() {
            if !carry {
                break;
            }
            *slot += 1;
            if *slot == self.base {
                *slot = 0;
            } else {
                carry = false;
            }
        }
        self.next = if carry { None } else { Some(advance) };

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trips() {
        let event = vec![1, 2, 0];
        let h = hash_event(&event, 3);
        assert_eq!(event_from_hash(h, 3, 3), event);
    }

    #[test]
    fn event_range_enumerates_all_events_lexicographically() {
        let events: Vec<_> = EventRange::new(2, 2).collect();
        assert_eq!(events, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn event_range_empty_length_yields_one_empty_event() {
        let events: Vec<_> = EventRange::new(0, 3).collect();
        assert_eq!(events, vec![Vec::<u8>::new()]);
    }
}
