// Caller-owned pseudo-random source.
//
// This is NOT cryptographically secure.
// It is used only for weight initialization, exploration noise and
// reproducible evaluation. Components borrow it; they never own or reseed it.

/// Source of uniform and Gaussian draws.
///
/// Every component in this crate takes `&mut R where R: RandomSource + ?Sized`,
/// so tests can substitute a scripted or recorded sequence.
pub trait RandomSource {
    /// Uniform draw in `[lo, hi)`.
    fn uniform(&mut self, lo: f32, hi: f32) -> f32;

    /// Gaussian draw with the given mean and standard deviation.
    fn gaussian(&mut self, mean: f32, std_dev: f32) -> f32;
}

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
    // Second Box-Muller sample, kept so draws come in pairs.
    spare_normal: Option<f32>,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self {
            state: seed,
            spare_normal: None,
        }
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    pub fn next_f32_01(&mut self) -> f32 {
        // Convert to [0,1).
        let x = self.next_u32() >> 8;
        (x as f32) / ((1u32 << 24) as f32)
    }

    #[inline]
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32_01()
    }

    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low) as u32;
        let v = self.next_u32() % span;
        low + v as usize
    }

    /// Standard normal draw (Box-Muller).
    pub fn next_standard_normal(&mut self) -> f32 {
        if let Some(z) = self.spare_normal.take() {
            return z;
        }

        // u1 in (0,1] so ln() stays finite.
        let u1 = 1.0 - self.next_f32_01();
        let u2 = self.next_f32_01();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = core::f32::consts::TAU * u2;

        self.spare_normal = Some(radius * theta.sin());
        radius * theta.cos()
    }
}

impl RandomSource for Prng {
    #[inline]
    fn uniform(&mut self, lo: f32, hi: f32) -> f32 {
        self.gen_range_f32(lo, hi)
    }

    fn gaussian(&mut self, mean: f32, std_dev: f32) -> f32 {
        mean + std_dev * self.next_standard_normal()
    }
}
