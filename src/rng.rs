//! Random Number Generation for Generators
//!
//! Random sources draw from their own seedable Xorshift128+ stream so a session
//! with a fixed seed replays identically. Without a seed, streams are seeded
//! from OS entropy (feature `entropy`) or a fixed constant.

/// Xorshift128+ generator. Fast, allocation-free, period 2^128 - 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorShift {
    s0: u64,
    s1: u64,
}

const FALLBACK_SEED: u64 = 0x853c_49e6_748f_ea9b;

impl XorShift {
    /// Derive both state words from one seed via splitmix64
    pub fn from_seed(seed: u64) -> Self {
        let s0 = splitmix64(seed);
        let s1 = splitmix64(seed.wrapping_add(0x9e37_79b9_7f4a_7c15));
        // All-zero state would be stuck at zero forever
        if s0 == 0 && s1 == 0 {
            Self { s0: 1, s1: 0 }
        } else {
            Self { s0, s1 }
        }
    }

    /// Seed from OS entropy when available, otherwise from a fixed constant
    pub fn from_entropy() -> Self {
        #[cfg(feature = "entropy")]
        {
            Self::from_seed(rand::random::<u64>())
        }
        #[cfg(not(feature = "entropy"))]
        {
            Self::from_seed(FALLBACK_SEED)
        }
    }

    /// Independent stream for the `index`-th generator of a session seed
    pub fn for_stream(seed: u64, index: usize) -> Self {
        Self::from_seed(seed ^ splitmix64(index as u64 + 1))
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.s0;
        let mut s1 = self.s1;
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.s0 = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.s1 = s1.rotate_left(37);

        result
    }

    /// Uniform value in [0, 1)
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform value in [-1, 1)
    #[inline]
    pub fn next_f64_bipolar(&mut self) -> f64 {
        self.next_f64() * 2.0 - 1.0
    }
}

impl Default for XorShift {
    fn default() -> Self {
        Self::from_seed(FALLBACK_SEED)
    }
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
