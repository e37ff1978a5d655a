use crate::sim::bus::AccessSize;
use crate::sim::mem::{ByteFiller, MemInitStrategy};

use super::{MmDevice, Peripherals};

/// Little-endian byte-addressable RAM.
///
/// Program segments written with [`Sdram::load`] are remembered as init images
/// and copied back in on every reset. Bytes outside any image keep whatever value
/// they had.
#[derive(Debug)]
pub struct Sdram {
    data: Vec<u8>,
    init: Vec<(usize, Vec<u8>)>,
}

impl Sdram {
    /// Creates a RAM device of `span` bytes, filled according to `strategy`.
    pub fn new(span: u32, strategy: MemInitStrategy) -> Self {
        let mut data = vec![0; span as usize];
        strategy.generator().fill(&mut data);
        Self { data, init: vec![] }
    }

    /// The size of this RAM in bytes.
    pub fn span(&self) -> u32 {
        self.data.len() as u32
    }

    /// Copies `bytes` in at `offset` and records them as an init image.
    ///
    /// Bytes that would land past the end of the RAM are dropped.
    pub fn load(&mut self, offset: u32, bytes: &[u8]) {
        let start = offset as usize;
        let Some(window) = self.data.get_mut(start..) else { return };
        let len = bytes.len().min(window.len());
        window[..len].copy_from_slice(&bytes[..len]);
        self.init.push((start, bytes[..len].to_vec()));
    }

    /// Forgets all recorded init images. The current contents are left alone.
    pub fn clear_init(&mut self) {
        self.init.clear();
    }

    /// Raw view of the RAM contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl MmDevice for Sdram {
    fn mm_read(&mut self, offset: u32, size: AccessSize, _io: &mut Peripherals) -> u32 {
        let start = offset as usize;
        let Some(bytes) = self.data.get(start..start + size.bytes()) else { return 0 };

        bytes.iter()
            .rev()
            .fold(0, |acc, &b| (acc << 8) | u32::from(b))
    }

    fn mm_write(&mut self, offset: u32, size: AccessSize, data: u32, _io: &mut Peripherals) {
        let start = offset as usize;
        if let Some(bytes) = self.data.get_mut(start..start + size.bytes()) {
            let le = data.to_le_bytes();
            bytes.copy_from_slice(&le[..bytes.len()]);
        }
    }

    fn mm_reset(&mut self, _io: &mut Peripherals) {
        for (start, image) in &self.init {
            self.data[*start..*start + image.len()].copy_from_slice(image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian() {
        let mut io = Peripherals::default();
        let mut ram = Sdram::new(16, MemInitStrategy::Zeroed);

        ram.mm_write(4, AccessSize::Word, 0x1234_5678, &mut io);
        assert_eq!(&ram.as_bytes()[4..8], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(ram.mm_read(4, AccessSize::Half, &mut io), 0x5678);
        assert_eq!(ram.mm_read(7, AccessSize::Byte, &mut io), 0x12);

        ram.mm_write(0, AccessSize::Byte, 0xFFFF_FFAB, &mut io);
        assert_eq!(ram.mm_read(0, AccessSize::Word, &mut io), 0xAB);
    }

    #[test]
    fn test_out_of_range() {
        let mut io = Peripherals::default();
        let mut ram = Sdram::new(8, MemInitStrategy::Known { value: 0xEE });

        assert_eq!(ram.mm_read(6, AccessSize::Word, &mut io), 0);
        ram.mm_write(6, AccessSize::Word, 0, &mut io);
        assert_eq!(ram.as_bytes(), &[0xEE; 8]);
    }

    #[test]
    fn test_reset_restores_images() {
        let mut io = Peripherals::default();
        let mut ram = Sdram::new(16, MemInitStrategy::Zeroed);
        ram.load(4, &[1, 2, 3, 4]);

        ram.mm_write(4, AccessSize::Word, 0, &mut io);
        ram.mm_write(12, AccessSize::Word, 0xCAFE, &mut io);
        ram.mm_reset(&mut io);
        assert_eq!(ram.mm_read(4, AccessSize::Word, &mut io), 0x0403_0201);
        assert_eq!(ram.mm_read(12, AccessSize::Word, &mut io), 0xCAFE);

        ram.clear_init();
        ram.mm_write(4, AccessSize::Word, 0, &mut io);
        ram.mm_reset(&mut io);
        assert_eq!(ram.mm_read(4, AccessSize::Word, &mut io), 0);
    }
}
