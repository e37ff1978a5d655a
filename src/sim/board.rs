//! The development board attached to a system.
//!
//! A board is a collection of named device groups (rows of LEDs, seven-segment
//! displays, push buttons, toggle switches) plus an optional character display
//! screen. Each group can be bound to a [`Pio`] on the bus, which mirrors
//! the group's value.
//!
//! The board never owns the port it is bound to. Groups remember the port's
//! [`DeviceId`] and the port remembers the group's [`GroupId`]; the [`System`]
//! resolves both.
//!
//! [`Pio`]: crate::sim::device::Pio
//! [`System`]: crate::sim::System

use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use super::bus::DeviceId;
use super::device::{PioDirection, LCD_TEXT_LEN};

/// Handle to a device group on a [`Board`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(usize);

/// Handle to a single device on a [`Board`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoardDeviceId {
    /// The group the device belongs to.
    pub group: GroupId,
    index: usize,
}

/// The kind of a board device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardDeviceKind {
    /// A single LED, one bit wide.
    Led,
    /// A seven-segment display, seven bits wide.
    SevenSegment,
    /// A momentary push button. Reads 1 when released, 0 while held.
    Push,
    /// A toggle switch. Reads 0 until flipped.
    Toggle,
}
impl BoardDeviceKind {
    fn idle_value(self) -> u32 {
        match self {
            BoardDeviceKind::Push => 1,
            _ => 0
        }
    }
}
impl FromStr for BoardDeviceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LED"    => Ok(Self::Led),
            "SSLED"  => Ok(Self::SevenSegment),
            "PUSH"   => Ok(Self::Push),
            "TOGGLE" => Ok(Self::Toggle),
            _ => Err(())
        }
    }
}

/// A device on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardDevice {
    kind: BoardDeviceKind,
    bit: u32,
    value: u32,
}
impl BoardDevice {
    /// The kind of this device.
    pub fn kind(&self) -> BoardDeviceKind {
        self.kind
    }
    /// The lowest bit of the group value this device is mapped to.
    pub fn bit(&self) -> u32 {
        self.bit
    }
    /// The device's current value (an LED state, segment pattern, or switch position).
    pub fn value(&self) -> u32 {
        self.value
    }
}

/// A named group of board devices, sharing one data word.
#[derive(Debug, Clone)]
pub struct DeviceGroup {
    name: String,
    direction: PioDirection,
    devices: Vec<BoardDevice>,
    pio: Option<DeviceId>,
}
impl DeviceGroup {
    /// The name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Whether this group is an input or an output.
    pub fn direction(&self) -> PioDirection {
        self.direction
    }
    /// The devices in this group.
    pub fn devices(&self) -> &[BoardDevice] {
        &self.devices
    }
    /// The port this group is bound to.
    pub fn pio(&self) -> Option<DeviceId> {
        self.pio
    }

    fn data(&self) -> u32 {
        match self.direction {
            PioDirection::In => self.devices.iter()
                .fold(0, |acc, d| acc | d.value.checked_shl(d.bit).unwrap_or(0)),
            PioDirection::Out => 0
        }
    }

    fn set_data(&mut self, data: u32) {
        if self.direction != PioDirection::Out { return; }

        for d in &mut self.devices {
            let bits = data.checked_shr(d.bit).unwrap_or(0);
            match d.kind {
                BoardDeviceKind::Led => d.value = bits & 0x1,
                BoardDeviceKind::SevenSegment => d.value = bits & 0x7F,
                _ => {}
            }
        }
    }
}

/// A user action on an input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardAction {
    /// A push button is pressed, or a toggle switch is flipped.
    Press,
    /// A push button is released. Toggle switches ignore this.
    Release,
}

/// A change to an input group's value, to be delivered to the group's port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputChange {
    /// The port to notify, if the group is bound to one.
    pub pio: Option<DeviceId>,
    /// The group's new value.
    pub data: u32,
    /// The bit of the device that changed.
    pub bit: u32,
}

/// A development board.
#[derive(Debug, Default)]
pub struct Board {
    name: String,
    background_image: Option<String>,
    lcd_name: Option<String>,
    lcd_screen: Arc<RwLock<[u8; LCD_TEXT_LEN]>>,
    groups: Vec<DeviceGroup>,
}

impl Board {
    /// The board's display name.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Sets the board's display name.
    pub fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.name);
    }
    /// The board's background image path, if any.
    pub fn background_image(&self) -> Option<&str> {
        self.background_image.as_deref()
    }
    /// Sets the board's background image path.
    pub fn set_background_image(&mut self, path: &str) {
        self.background_image = Some(path.to_string());
    }

    /// The name of the board's character display, if it has one.
    pub fn lcd_name(&self) -> Option<&str> {
        self.lcd_name.as_deref()
    }
    /// Adds a character display to the board.
    pub fn set_lcd(&mut self, name: &str) {
        self.lcd_name = Some(name.to_string());
    }
    /// Gets a reference to the board's screen buffer.
    ///
    /// This is replaced wholesale every time the display's text changes.
    pub fn get_lcd_screen(&self) -> &Arc<RwLock<[u8; LCD_TEXT_LEN]>> {
        &self.lcd_screen
    }
    /// A copy of the board's screen buffer.
    pub fn lcd_text(&self) -> [u8; LCD_TEXT_LEN] {
        *self.lcd_screen.read().unwrap_or_else(PoisonError::into_inner)
    }
    /// Replaces the board's screen buffer.
    pub fn update_lcd_text(&mut self, text: &[u8; LCD_TEXT_LEN]) {
        *self.lcd_screen.write().unwrap_or_else(PoisonError::into_inner) = *text;
    }

    /// Adds a new, empty device group.
    pub fn add_group(&mut self, name: &str, direction: PioDirection) -> GroupId {
        self.groups.push(DeviceGroup {
            name: name.to_string(),
            direction,
            devices: vec![],
            pio: None,
        });
        GroupId(self.groups.len() - 1)
    }
    /// Finds a device group by name.
    pub fn find_group(&self, name: &str) -> Option<GroupId> {
        self.groups.iter()
            .position(|g| g.name == name)
            .map(GroupId)
    }
    /// Gets a device group.
    pub fn group(&self, id: GroupId) -> Option<&DeviceGroup> {
        self.groups.get(id.0)
    }
    /// All device groups, with their handles.
    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &DeviceGroup)> {
        self.groups.iter()
            .enumerate()
            .map(|(i, g)| (GroupId(i), g))
    }
    /// Binds a group to a port on the bus.
    pub fn bind_pio(&mut self, id: GroupId, pio: DeviceId) {
        if let Some(g) = self.groups.get_mut(id.0) {
            g.pio = Some(pio);
        }
    }

    /// Adds a device to a group. Returns `None` if the group does not exist.
    pub fn add_device(&mut self, group: GroupId, kind: BoardDeviceKind, bit: u32) -> Option<BoardDeviceId> {
        let g = self.groups.get_mut(group.0)?;
        g.devices.push(BoardDevice { kind, bit, value: kind.idle_value() });
        Some(BoardDeviceId { group, index: g.devices.len() - 1 })
    }
    /// Handles to every device of a group, in the order they were added.
    pub fn device_ids(&self, group: GroupId) -> impl Iterator<Item = BoardDeviceId> {
        let len = self.group(group).map_or(0, |g| g.devices.len());
        (0..len).map(move |index| BoardDeviceId { group, index })
    }
    /// Gets a device.
    pub fn device(&self, id: BoardDeviceId) -> Option<&BoardDevice> {
        self.group(id.group)?.devices.get(id.index)
    }

    /// The value of an input group, composed from its devices. Output groups read 0.
    pub fn group_data(&self, id: GroupId) -> u32 {
        self.group(id).map_or(0, DeviceGroup::data)
    }
    /// Decodes a value written to an output group into its devices. Input groups ignore this.
    pub fn set_group_data(&mut self, id: GroupId, data: u32) {
        if let Some(g) = self.groups.get_mut(id.0) {
            g.set_data(data);
        }
    }

    /// Applies a user action to an input device.
    ///
    /// Returns the resulting change to the group's value, or `None` if nothing changed
    /// (an output device, a release on a toggle switch, or an unknown device).
    pub fn apply(&mut self, id: BoardDeviceId, action: BoardAction) -> Option<InputChange> {
        let g = self.groups.get_mut(id.group.0)?;
        if g.direction != PioDirection::In { return None; }

        let d = g.devices.get_mut(id.index)?;
        match (d.kind, action) {
            (BoardDeviceKind::Toggle, BoardAction::Press)   => d.value ^= 1,
            (BoardDeviceKind::Push,   BoardAction::Press)   => d.value = 0,
            (BoardDeviceKind::Push,   BoardAction::Release) => d.value = 1,
            _ => return None
        }
        let bit = d.bit;

        Some(InputChange { pio: g.pio, data: g.data(), bit })
    }
}
