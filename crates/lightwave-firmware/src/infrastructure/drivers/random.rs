use esp_hal::rng::Rng;
use lightwave_ota::ports::EntropySource;

pub(crate) fn get_seed() -> u64 {
    let rng = Rng::new();
    u64::from(rng.random()) << 32 | u64::from(rng.random())
}

/// Hardware RNG. Only random while the radio is running.
pub(crate) struct EspEntropy {
    rng: Rng,
}

impl EspEntropy {
    pub(crate) fn new() -> Self {
        Self { rng: Rng::new() }
    }
}

impl EntropySource for EspEntropy {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(4) {
            let word = self.rng.random().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}
