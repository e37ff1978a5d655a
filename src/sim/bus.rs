//! The system bus.
//!
//! The bus maps address ranges to devices. Each [`Region`] covers `span` bytes
//! starting at `base`, and accesses inside it are routed to the region's device
//! with the address made relative to `base`.
//!
//! Regions are searched in the order they were added, so if two regions overlap,
//! the earlier one wins. Accesses that hit no region read as 0 and write nowhere;
//! checking validity beforehand is the caller's job ([`Bus::is_valid`]).
//!
//! The bus can also record a trace of the non-IO accesses going through it.
//! Each record is a line `"{kind} {addr:08X}"` where kind is `0` for a load,
//! `1` for a store, and `2` for an instruction fetch.
//!
//! ```
//! use niisim::sim::bus::{Access, AccessSize, Bus};
//! use niisim::sim::device::Sdram;
//! use niisim::sim::mem::MemInitStrategy;
//!
//! let mut bus = Bus::new();
//! bus.add_region("sdram", 0x1000, 0x100, Sdram::new(0x100, MemInitStrategy::Zeroed));
//!
//! bus.write(0x1010, AccessSize::Word, 0xDEAD_BEEF, Access::Data);
//! assert_eq!(bus.read(0x1010, AccessSize::Half, Access::Data), 0xBEEF);
//! assert!(bus.is_valid(0x10FF));
//! assert!(!bus.is_valid(0x1100));
//! ```

use super::device::{Device, MmDevice, Peripherals};

/// Width of a bus access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessSize {
    /// 8 bits.
    Byte,
    /// 16 bits.
    Half,
    /// 32 bits.
    Word,
}
impl AccessSize {
    /// The width in bits.
    pub fn bits(self) -> u32 {
        match self {
            AccessSize::Byte => 8,
            AccessSize::Half => 16,
            AccessSize::Word => 32,
        }
    }
    /// The width in bytes.
    pub fn bytes(self) -> usize {
        match self {
            AccessSize::Byte => 1,
            AccessSize::Half => 2,
            AccessSize::Word => 4,
        }
    }
    /// Mask covering the low `bits()` bits.
    pub fn mask(self) -> u32 {
        match self {
            AccessSize::Byte => 0xFF,
            AccessSize::Half => 0xFFFF,
            AccessSize::Word => 0xFFFF_FFFF,
        }
    }
    /// Whether `addr` is a multiple of this access width.
    pub fn is_aligned(self, addr: u32) -> bool {
        addr % self.bytes() as u32 == 0
    }
}

/// The purpose of a bus access, which decides whether it is traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// A regular load or store.
    Data,
    /// A load or store that bypasses the cache (`ldwio`, `stbio`, ...). Never traced.
    Io,
    /// An instruction fetch.
    Fetch,
}

/// Handle to a region (and so to a device) on a [`Bus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(usize);

/// A device mapped into the address space.
#[derive(Debug)]
pub struct Region {
    name: String,
    base: u32,
    span: u32,
    /// The device.
    pub device: Device,
}
impl Region {
    /// The configured device name.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The first address of the region.
    pub fn base(&self) -> u32 {
        self.base
    }
    /// The size of the region in bytes.
    pub fn span(&self) -> u32 {
        self.span
    }
    /// Whether `addr` is inside this region.
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr - self.base < self.span
    }
    fn overlaps(&self, base: u32, span: u32) -> bool {
        let (a0, a1) = (u64::from(self.base), u64::from(self.base) + u64::from(self.span));
        let (b0, b1) = (u64::from(base), u64::from(base) + u64::from(span));
        a0 < b1 && b0 < a1
    }
}

/// The system bus, along with the peripherals its devices write into.
#[derive(Debug, Default)]
pub struct Bus {
    regions: Vec<Region>,
    /// External attachments of the devices (consoles and board).
    pub io: Peripherals,
    trace: Option<Vec<String>>,
}

impl Bus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a device at `base..base + span`.
    ///
    /// Overlapping an existing region is allowed (the existing region keeps priority), but is logged.
    pub fn add_region(&mut self, name: &str, base: u32, span: u32, device: impl Into<Device>) -> DeviceId {
        if let Some(r) = self.regions.iter().find(|r| r.overlaps(base, span)) {
            log::warn!("device {name} at {base:#010x} overlaps device {} at {:#010x}", r.name, r.base);
        }
        self.regions.push(Region { name: name.to_string(), base, span, device: device.into() });
        DeviceId(self.regions.len() - 1)
    }

    /// Removes every region.
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    /// All regions, in lookup order.
    pub fn regions(&self) -> impl Iterator<Item = (DeviceId, &Region)> {
        self.regions.iter()
            .enumerate()
            .map(|(i, r)| (DeviceId(i), r))
    }

    /// All regions mutably, in lookup order.
    pub fn regions_mut(&mut self) -> impl Iterator<Item = (DeviceId, &mut Region)> {
        self.regions.iter_mut()
            .enumerate()
            .map(|(i, r)| (DeviceId(i), r))
    }

    /// Gets a region.
    pub fn region(&self, id: DeviceId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    /// Gets a region mutably.
    pub fn region_mut(&mut self, id: DeviceId) -> Option<&mut Region> {
        self.regions.get_mut(id.0)
    }

    /// Finds the first region with the given device name.
    pub fn find_by_name(&self, name: &str) -> Option<DeviceId> {
        self.regions.iter()
            .position(|r| r.name == name)
            .map(DeviceId)
    }

    fn find(&self, addr: u32) -> Option<usize> {
        self.regions.iter().position(|r| r.contains(addr))
    }

    /// Whether any device is mapped at `addr`.
    pub fn is_valid(&self, addr: u32) -> bool {
        self.find(addr).is_some()
    }

    /// Reads from the device at `addr`. Unmapped addresses read as 0.
    pub fn read(&mut self, addr: u32, size: AccessSize, access: Access) -> u32 {
        let kind = match access {
            Access::Fetch => Some(2),
            Access::Data  => Some(0),
            Access::Io    => None,
        };
        self.record(kind, addr);

        let Self { regions, io, .. } = self;
        match regions.iter_mut().find(|r| r.contains(addr)) {
            Some(r) => r.device.mm_read(addr - r.base, size, io),
            None => 0,
        }
    }

    /// Writes to the device at `addr`. Writes to unmapped addresses are dropped.
    pub fn write(&mut self, addr: u32, size: AccessSize, data: u32, access: Access) {
        let kind = match access {
            Access::Io => None,
            _ => Some(1),
        };
        self.record(kind, addr);

        let Self { regions, io, .. } = self;
        if let Some(r) = regions.iter_mut().find(|r| r.contains(addr)) {
            r.device.mm_write(addr - r.base, size, data & size.mask(), io);
        }
    }

    fn record(&mut self, kind: Option<u8>, addr: u32) {
        if let (Some(trace), Some(kind)) = (&mut self.trace, kind) {
            trace.push(format!("{kind} {addr:08X}"));
        }
    }

    /// Starts recording accesses, discarding any earlier trace.
    pub fn start_trace(&mut self) {
        self.trace = Some(vec![]);
    }
    /// Stops recording accesses, returning the trace recorded so far.
    pub fn stop_trace(&mut self) -> Vec<String> {
        self.trace.take().unwrap_or_default()
    }
    /// Drains the trace recorded so far, without stopping it.
    pub fn take_trace(&mut self) -> Vec<String> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }
    /// Whether accesses are being recorded.
    pub fn is_tracing(&self) -> bool {
        self.trace.is_some()
    }

    /// Advances every timer by one tick, in region order.
    pub fn tick_timers(&mut self) {
        for r in &mut self.regions {
            if let Device::Timer(t) = &mut r.device {
                t.on_clock();
            }
        }
    }

    /// Resets every device.
    pub fn reset(&mut self) {
        let Self { regions, io, .. } = self;
        for r in regions {
            r.device.mm_reset(io);
        }
    }
}
