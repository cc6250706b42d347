//! Interleaver (C8): disperses a burst of consecutive losses across
//! multiple FEC blocks by permuting packets within a fixed window
//! before they reach the network.

use crate::packet::Packet;

/// Deterministic pseudo-random permutation of `[0, window)`, generated
/// once per `Interleaver` from `seed` via Fisher-Yates with an xorshift
/// generator — the same flavor of seeded PRNG used by the codec's
/// staircase neighbor selection, kept dependency-free and reproducible
/// across sender/receiver test runs.
fn permutation(window: usize, seed: u64) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..window).collect();
    let mut state = seed | 1;
    for i in (1..window).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state as usize) % (i + 1);
        perm.swap(i, j);
    }
    perm
}

/// Holds up to `window` packets, releasing them in permuted order once
/// the window fills, or immediately on `flush()`.
pub struct Interleaver {
    window: usize,
    order: Vec<usize>,
    /// Slots indexed by *write* position `[0, window)`; released by
    /// walking `order`.
    slots: Vec<Option<Packet>>,
    filled: usize,
}

impl Interleaver {
    pub fn new(window: usize, seed: u64) -> Self {
        let window = window.max(1);
        Self {
            window,
            order: permutation(window, seed),
            slots: (0..window).map(|_| None).collect(),
            filled: 0,
        }
    }

    /// Writes the next packet into the window. Returns the packets
    /// released (in permuted order) once the window fills; empty while
    /// still accumulating.
    pub fn write(&mut self, packet: Packet) -> Vec<Packet> {
        let pos = self.filled;
        self.slots[pos] = Some(packet);
        self.filled += 1;

        if self.filled == self.window {
            self.drain_all()
        } else {
            Vec::new()
        }
    }

    /// Drains whatever is currently buffered, in permuted order,
    /// regardless of whether the window is full.
    pub fn flush(&mut self) -> Vec<Packet> {
        self.drain_all()
    }

    fn drain_all(&mut self) -> Vec<Packet> {
        let mut out = Vec::with_capacity(self.filled);
        for &slot in &self.order {
            if slot < self.filled {
                if let Some(p) = self.slots[slot].take() {
                    out.push(p);
                }
            }
        }
        for s in self.slots.iter_mut() {
            *s = None;
        }
        self.filled = 0;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketFlags;

    fn tagged(n: u8) -> Packet {
        let mut p = Packet::new(PacketFlags::AUDIO);
        p.payload = bytes::Bytes::from(vec![n]);
        p
    }

    #[test]
    fn releases_nothing_until_window_fills() {
        let mut il = Interleaver::new(4, 42);
        assert!(il.write(tagged(0)).is_empty());
        assert!(il.write(tagged(1)).is_empty());
        assert!(il.write(tagged(2)).is_empty());
        let released = il.write(tagged(3));
        assert_eq!(released.len(), 4);
    }

    #[test]
    fn releases_are_a_permutation_not_a_loss() {
        let mut il = Interleaver::new(5, 7);
        let mut tags = Vec::new();
        for i in 0..5u8 {
            tags.extend(il.write(tagged(i)));
        }
        let mut values: Vec<u8> = tags.iter().map(|p| p.payload[0]).collect();
        values.sort_unstable();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn flush_drains_partial_window() {
        let mut il = Interleaver::new(8, 1);
        il.write(tagged(0));
        il.write(tagged(1));
        let released = il.flush();
        assert_eq!(released.len(), 2);
    }
}
