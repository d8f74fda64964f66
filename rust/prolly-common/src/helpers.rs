use rand::{RngCore, SeedableRng, rngs::StdRng};

/// Produces reproducible keys and values for benchmarks. The same seed always
/// yields the same sequence of buffers.
pub struct BenchData {
    rng: StdRng,
}

impl BenchData {
    /// Create a generator from a fixed seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `count` buffers holding big-endian counters `0..count`, right aligned
    /// in `SIZE` bytes, so they sort in generation order
    pub fn sequential_buffers<const SIZE: usize>(&mut self, count: usize) -> Vec<[u8; SIZE]> {
        (0..count as u64)
            .map(|index| {
                let mut buffer = [0u8; SIZE];
                let counter = index.to_be_bytes();
                let width = counter.len().min(SIZE);
                buffer[SIZE - width..].copy_from_slice(&counter[counter.len() - width..]);
                buffer
            })
            .collect()
    }

    /// `count` buffers of `SIZE` random bytes
    pub fn random_buffers<const SIZE: usize>(&mut self, count: usize) -> Vec<[u8; SIZE]> {
        (0..count)
            .map(|_| {
                let mut buffer = [0u8; SIZE];
                self.rng.fill_bytes(&mut buffer);
                buffer
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_repeats_itself_for_the_same_seed() {
        let first = BenchData::new(42).random_buffers::<16>(8);
        let second = BenchData::new(42).random_buffers::<16>(8);
        assert_eq!(first, second);
    }

    #[test]
    fn it_generates_ascending_sequential_buffers() {
        let buffers = BenchData::new(0).sequential_buffers::<16>(300);
        assert!(buffers.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
