//! Register storage and RAM initialization.
//!
//! This module consists of:
//! - [`RegFile`]: The general purpose register file.
//! - [`CtlRegFile`]: The control register file.
//! - [`MemInitStrategy`]: How RAM devices are filled when they are created.

use rand::rngs::StdRng;
use rand::Rng;

use crate::isa::ctl;

/// The 32 general purpose registers.
///
/// Register 0 always reads as 0. Writes to it through [`RegFile::set`] are discarded.
///
/// ```
/// use niisim::sim::mem::RegFile;
///
/// let mut regs = RegFile::new();
/// regs.set(0, 0x1234);
/// regs.set(5, 0x5678);
/// assert_eq!(regs[0], 0);
/// assert_eq!(regs[5], 0x5678);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegFile([u32; 32]);

impl RegFile {
    /// Creates a register file with all registers cleared.
    pub fn new() -> Self {
        Self([0; 32])
    }

    /// Writes a register. Writes to register 0 are ignored.
    pub fn set(&mut self, r: usize, data: u32) {
        if (1..32).contains(&r) {
            self.0[r] = data;
        }
    }

    /// Clears every register.
    pub fn clear(&mut self) {
        self.0 = [0; 32];
    }

    /// All register values, indexed by register number.
    pub fn as_slice(&self) -> &[u32; 32] {
        &self.0
    }
}
impl Default for RegFile {
    fn default() -> Self {
        Self::new()
    }
}
impl std::ops::Index<usize> for RegFile {
    type Output = u32;

    /// Accesses a register. Out of range indices wrap to 5 bits.
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index & 0x1F]
    }
}

/// The 32 control registers.
///
/// `ipending` is never stored here; the CPU computes it on read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CtlRegFile([u32; 32]);

impl CtlRegFile {
    /// Reads a stored control register.
    pub fn get(&self, r: usize) -> u32 {
        self.0[r & 0x1F]
    }
    /// Writes a control register. Writes to `ipending` are ignored.
    pub fn set(&mut self, r: usize, data: u32) {
        let r = r & 0x1F;
        if r != ctl::IPENDING {
            self.0[r] = data;
        }
    }
    /// Clears every control register.
    pub fn clear(&mut self) {
        self.0 = [0; 32];
    }
}

/// Trait that describes types that can produce the power-on content of RAM.
pub trait ByteFiller {
    /// Generate one byte.
    fn generate(&mut self) -> u8;

    /// Fill a slice.
    fn fill(&mut self, buf: &mut [u8]) {
        buf.iter_mut().for_each(|b| *b = self.generate());
    }
}
impl ByteFiller for () {
    /// This creates unseeded, non-deterministic values.
    fn generate(&mut self) -> u8 {
        rand::random()
    }
}
impl ByteFiller for u8 {
    /// Sets each byte to the given value.
    fn generate(&mut self) -> u8 {
        *self
    }
    fn fill(&mut self, buf: &mut [u8]) {
        buf.fill(*self);
    }
}
impl ByteFiller for StdRng {
    /// This creates values from the standard random number generator.
    ///
    /// This can be used to create deterministic, seeded values.
    fn generate(&mut self) -> u8 {
        self.gen()
    }
    fn fill(&mut self, buf: &mut [u8]) {
        Rng::fill(self, buf);
    }
}

/// Strategy used to initialize RAM devices when a system is configured.
///
/// Programs that read RAM they never wrote see these values.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum MemInitStrategy {
    /// Initializes each byte to a known value.
    Known {
        /// The value to initialize each byte to.
        value: u8
    },

    /// Initializes each byte randomly and deterministically.
    Seeded {
        /// The seed the RNG was initialized with.
        seed: u64
    },

    /// Initializes each byte randomly and non-deterministically.
    Unseeded,

    /// Initializes every byte to zero.
    #[default]
    Zeroed,
}

impl MemInitStrategy {
    pub(crate) fn generator(&self) -> impl ByteFiller {
        use rand::SeedableRng;

        match self {
            MemInitStrategy::Unseeded => Generator::Unseeded,
            MemInitStrategy::Seeded { seed } => Generator::Seeded(Box::new(StdRng::seed_from_u64(*seed))),
            MemInitStrategy::Known { value } => Generator::Known(*value),
            MemInitStrategy::Zeroed => Generator::Known(0),
        }
    }
}

enum Generator {
    Unseeded,
    Seeded(Box<StdRng>),
    Known(u8)
}
impl ByteFiller for Generator {
    fn generate(&mut self) -> u8 {
        match self {
            Generator::Unseeded  => ().generate(),
            Generator::Seeded(r) => r.generate(),
            Generator::Known(k)  => k.generate(),
        }
    }
    fn fill(&mut self, buf: &mut [u8]) {
        match self {
            Generator::Unseeded  => ().fill(buf),
            Generator::Seeded(r) => ByteFiller::fill(&mut **r, buf),
            Generator::Known(k)  => k.fill(buf),
        }
    }
}
