//! Profile button assignments (report 0x07, 99 bytes).
//!
//! The record holds 32 three-byte slots after the id/size/profile header:
//! the 16 physical buttons in their standard layer, then the same 16 buttons
//! in the EasyShift layer.
//!
//! Each slot is `{function, modifier, key}`. `modifier` and `key` only
//! carry meaning for [`ButtonFunction::Shortcut`]; the key byte is a HID
//! usage code translated by [`crate::keymap`].

use crate::error::Result;
use crate::keymap::{KeyCombination, KeyboardLayout};
use crate::report::{check_sized_frame, ids, FeatureReport};
use crate::safety;

/// Number of physical buttons.
pub const PHYSICAL_BUTTONS: usize = 16;
/// Number of slots in a buttons record (standard + EasyShift).
pub const BUTTON_SLOTS: usize = PHYSICAL_BUTTONS * 2;

/// Function assigned to a button slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonFunction {
    Unused,
    Click,
    Menu,
    UniversalScrolling,
    DoubleClick,
    Shortcut,
    Disabled,
    Forward,
    Backward,
    TiltLeft,
    TiltRight,
    WheelUp,
    WheelDown,
    QuickLaunch,
    ProfileCycle,
    ProfileUp,
    ProfileDown,
    CpiCycle,
    CpiUp,
    CpiDown,
    SensitivityCycle,
    SensitivityUp,
    SensitivityDown,
    WindowsKey,
    OpenDriver,
    OpenPlayer,
    PreviousTrack,
    NextTrack,
    PlayPause,
    Stop,
    Mute,
    VolumeUp,
    VolumeDown,
    Macro,
    Timer,
    TimerStop,
    EasyShift,
    /// Code this crate has no name for; kept verbatim.
    Other(u8),
}

impl ButtonFunction {
    /// Named functions offered for assignment.
    pub const ALL: &'static [ButtonFunction] = &[
        Self::Unused,
        Self::Click,
        Self::Menu,
        Self::UniversalScrolling,
        Self::DoubleClick,
        Self::Shortcut,
        Self::Disabled,
        Self::Forward,
        Self::Backward,
        Self::TiltLeft,
        Self::TiltRight,
        Self::WheelUp,
        Self::WheelDown,
        Self::QuickLaunch,
        Self::ProfileCycle,
        Self::ProfileUp,
        Self::ProfileDown,
        Self::CpiCycle,
        Self::CpiUp,
        Self::CpiDown,
        Self::SensitivityCycle,
        Self::SensitivityUp,
        Self::SensitivityDown,
        Self::WindowsKey,
        Self::OpenDriver,
        Self::OpenPlayer,
        Self::PreviousTrack,
        Self::NextTrack,
        Self::PlayPause,
        Self::Stop,
        Self::Mute,
        Self::VolumeUp,
        Self::VolumeDown,
        Self::Macro,
        Self::Timer,
        Self::TimerStop,
        Self::EasyShift,
    ];

    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::Unused,
            0x01 => Self::Click,
            0x02 => Self::Menu,
            0x03 => Self::UniversalScrolling,
            0x04 => Self::DoubleClick,
            0x05 => Self::Shortcut,
            0x06 => Self::Disabled,
            0x07 => Self::Forward,
            0x08 => Self::Backward,
            0x09 => Self::TiltLeft,
            0x0A => Self::TiltRight,
            0x0D => Self::WheelUp,
            0x0E => Self::WheelDown,
            0x0F => Self::QuickLaunch,
            0x10 => Self::ProfileCycle,
            0x11 => Self::ProfileUp,
            0x12 => Self::ProfileDown,
            0x14 => Self::CpiCycle,
            0x15 => Self::CpiUp,
            0x16 => Self::CpiDown,
            0x17 => Self::SensitivityCycle,
            0x18 => Self::SensitivityUp,
            0x19 => Self::SensitivityDown,
            0x1A => Self::WindowsKey,
            0x1B => Self::OpenDriver,
            0x20 => Self::OpenPlayer,
            0x21 => Self::PreviousTrack,
            0x22 => Self::NextTrack,
            0x23 => Self::PlayPause,
            0x24 => Self::Stop,
            0x25 => Self::Mute,
            0x26 => Self::VolumeUp,
            0x27 => Self::VolumeDown,
            0x30 => Self::Macro,
            0x31 => Self::Timer,
            0x32 => Self::TimerStop,
            0x41 => Self::EasyShift,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Unused => 0x00,
            Self::Click => 0x01,
            Self::Menu => 0x02,
            Self::UniversalScrolling => 0x03,
            Self::DoubleClick => 0x04,
            Self::Shortcut => 0x05,
            Self::Disabled => 0x06,
            Self::Forward => 0x07,
            Self::Backward => 0x08,
            Self::TiltLeft => 0x09,
            Self::TiltRight => 0x0A,
            Self::WheelUp => 0x0D,
            Self::WheelDown => 0x0E,
            Self::QuickLaunch => 0x0F,
            Self::ProfileCycle => 0x10,
            Self::ProfileUp => 0x11,
            Self::ProfileDown => 0x12,
            Self::CpiCycle => 0x14,
            Self::CpiUp => 0x15,
            Self::CpiDown => 0x16,
            Self::SensitivityCycle => 0x17,
            Self::SensitivityUp => 0x18,
            Self::SensitivityDown => 0x19,
            Self::WindowsKey => 0x1A,
            Self::OpenDriver => 0x1B,
            Self::OpenPlayer => 0x20,
            Self::PreviousTrack => 0x21,
            Self::NextTrack => 0x22,
            Self::PlayPause => 0x23,
            Self::Stop => 0x24,
            Self::Mute => 0x25,
            Self::VolumeUp => 0x26,
            Self::VolumeDown => 0x27,
            Self::Macro => 0x30,
            Self::Timer => 0x31,
            Self::TimerStop => 0x32,
            Self::EasyShift => 0x41,
            Self::Other(b) => *b,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unused => "Unused",
            Self::Click => "Click",
            Self::Menu => "Menu",
            Self::UniversalScrolling => "Universal Scrolling",
            Self::DoubleClick => "Double Click",
            Self::Shortcut => "Shortcut",
            Self::Disabled => "Disabled",
            Self::Forward => "Browser Forward",
            Self::Backward => "Browser Backward",
            Self::TiltLeft => "Tilt Left",
            Self::TiltRight => "Tilt Right",
            Self::WheelUp => "Wheel Up",
            Self::WheelDown => "Wheel Down",
            Self::QuickLaunch => "Quicklaunch",
            Self::ProfileCycle => "Profile Cycle",
            Self::ProfileUp => "Profile Up",
            Self::ProfileDown => "Profile Down",
            Self::CpiCycle => "CPI Cycle",
            Self::CpiUp => "CPI Up",
            Self::CpiDown => "CPI Down",
            Self::SensitivityCycle => "Sensitivity Cycle",
            Self::SensitivityUp => "Sensitivity Up",
            Self::SensitivityDown => "Sensitivity Down",
            Self::WindowsKey => "Windows Key",
            Self::OpenDriver => "Open Driver",
            Self::OpenPlayer => "Open Player",
            Self::PreviousTrack => "Previous Track",
            Self::NextTrack => "Next Track",
            Self::PlayPause => "Play/Pause",
            Self::Stop => "Stop",
            Self::Mute => "Mute",
            Self::VolumeUp => "Volume Up",
            Self::VolumeDown => "Volume Down",
            Self::Macro => "Macro",
            Self::Timer => "Timer",
            Self::TimerStop => "Timer Stop",
            Self::EasyShift => "EasyShift",
            Self::Other(_) => "Unknown",
        }
    }

    /// Parse a CLI-friendly function name (case-insensitive, `-`/`_`/space
    /// separated words, e.g. "cpi-up", "easyshift", "play_pause").
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' ' | '/'))
            .collect::<String>()
            .to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        Self::ALL.iter().copied().find(|f| {
            let label: String = f
                .label()
                .chars()
                .filter(|c| !matches!(c, ' ' | '/'))
                .collect::<String>()
                .to_lowercase();
            let debug = format!("{f:?}").to_lowercase();
            label == wanted || debug == wanted
        })
    }
}

impl std::fmt::Display for ButtonFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(b) => write!(f, "Unknown (0x{b:02X})"),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// Physical buttons, in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalButton {
    Left,
    Right,
    Middle,
    ThumbBackward,
    ThumbForward,
    ThumbPedal,
    FinUp,
    FinDown,
    WheelUp,
    WheelDown,
    TiltLeft,
    TiltRight,
    TopForward,
    TopBackward,
    XCeleratorUp,
    XCeleratorDown,
}

impl PhysicalButton {
    pub const ALL: [PhysicalButton; PHYSICAL_BUTTONS] = [
        Self::Left,
        Self::Right,
        Self::Middle,
        Self::ThumbBackward,
        Self::ThumbForward,
        Self::ThumbPedal,
        Self::FinUp,
        Self::FinDown,
        Self::WheelUp,
        Self::WheelDown,
        Self::TiltLeft,
        Self::TiltRight,
        Self::TopForward,
        Self::TopBackward,
        Self::XCeleratorUp,
        Self::XCeleratorDown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Middle => "Middle",
            Self::ThumbBackward => "Thumb Backward",
            Self::ThumbForward => "Thumb Forward",
            Self::ThumbPedal => "Thumb Pedal",
            Self::FinUp => "Fin Up",
            Self::FinDown => "Fin Down",
            Self::WheelUp => "Wheel Up",
            Self::WheelDown => "Wheel Down",
            Self::TiltLeft => "Tilt Left",
            Self::TiltRight => "Tilt Right",
            Self::TopForward => "Top Forward",
            Self::TopBackward => "Top Backward",
            Self::XCeleratorUp => "X-Celerator Up",
            Self::XCeleratorDown => "X-Celerator Down",
        }
    }

    /// Slot of this button in the standard layer.
    pub fn slot(&self) -> usize {
        *self as usize
    }

    /// Slot of this button in the EasyShift layer.
    pub fn easyshift_slot(&self) -> usize {
        *self as usize + PHYSICAL_BUTTONS
    }

    /// Button and layer for a slot index.
    pub fn from_slot(slot: usize) -> Option<(Self, bool)> {
        if slot >= BUTTON_SLOTS {
            return None;
        }
        Some((Self::ALL[slot % PHYSICAL_BUTTONS], slot >= PHYSICAL_BUTTONS))
    }

    fn default_function(&self) -> ButtonFunction {
        match self {
            Self::Left => ButtonFunction::Click,
            Self::Right => ButtonFunction::Menu,
            Self::Middle => ButtonFunction::UniversalScrolling,
            Self::ThumbBackward => ButtonFunction::Backward,
            Self::ThumbForward => ButtonFunction::Forward,
            Self::ThumbPedal => ButtonFunction::EasyShift,
            Self::FinUp => ButtonFunction::CpiUp,
            Self::FinDown => ButtonFunction::CpiDown,
            Self::WheelUp => ButtonFunction::WheelUp,
            Self::WheelDown => ButtonFunction::WheelDown,
            Self::TiltLeft => ButtonFunction::TiltLeft,
            Self::TiltRight => ButtonFunction::TiltRight,
            Self::TopForward => ButtonFunction::ProfileUp,
            Self::TopBackward => ButtonFunction::ProfileDown,
            Self::XCeleratorUp => ButtonFunction::Unused,
            Self::XCeleratorDown => ButtonFunction::Unused,
        }
    }

    fn default_easyshift_function(&self) -> ButtonFunction {
        match self {
            Self::Left | Self::Right | Self::Middle => self.default_function(),
            Self::ThumbBackward => ButtonFunction::PreviousTrack,
            Self::ThumbForward => ButtonFunction::NextTrack,
            Self::ThumbPedal => ButtonFunction::Unused,
            Self::FinUp => ButtonFunction::SensitivityUp,
            Self::FinDown => ButtonFunction::SensitivityDown,
            Self::WheelUp => ButtonFunction::VolumeUp,
            Self::WheelDown => ButtonFunction::VolumeDown,
            Self::TiltLeft | Self::TiltRight => ButtonFunction::Unused,
            Self::TopForward | Self::TopBackward => ButtonFunction::CpiCycle,
            Self::XCeleratorUp | Self::XCeleratorDown => ButtonFunction::Unused,
        }
    }
}

pub use crate::keymap::modifiers;

/// One button slot, raw device representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonSlot {
    pub function: u8,
    pub modifier: u8,
    pub key: u8,
}

impl ButtonSlot {
    pub const SIZE: usize = 3;

    /// Slot with a non-shortcut function.
    pub fn new(function: ButtonFunction) -> Self {
        Self {
            function: function.as_byte(),
            modifier: 0,
            key: 0,
        }
    }

    /// Shortcut slot for a host key combination.
    pub fn shortcut(combo: &KeyCombination, layout: KeyboardLayout) -> Self {
        let (modifier, key) = combo.encode(layout);
        Self {
            function: ButtonFunction::Shortcut.as_byte(),
            modifier,
            key,
        }
    }

    pub fn function(&self) -> ButtonFunction {
        ButtonFunction::from_byte(self.function)
    }

    /// Host key combination, for shortcut slots whose key code is known.
    pub fn key_combination(&self, layout: KeyboardLayout) -> Option<KeyCombination> {
        if self.function() != ButtonFunction::Shortcut {
            return None;
        }
        KeyCombination::decode(self.modifier, self.key, layout)
    }

    /// Short description for listings.
    pub fn describe(&self, layout: KeyboardLayout) -> String {
        match self.key_combination(layout) {
            Some(combo) => format!("{} [{combo}]", self.function()),
            None => self.function().to_string(),
        }
    }
}

/// Per-profile button record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileButtons {
    pub profile_index: u8,
    pub slots: [ButtonSlot; BUTTON_SLOTS],
}

impl ProfileButtons {
    /// Default assignments for a slot.
    pub fn defaults(profile_index: u8) -> Self {
        let mut slots = [ButtonSlot::default(); BUTTON_SLOTS];
        for button in PhysicalButton::ALL {
            slots[button.slot()] = ButtonSlot::new(button.default_function());
            slots[button.easyshift_slot()] = ButtonSlot::new(button.default_easyshift_function());
        }
        Self {
            profile_index,
            slots,
        }
    }

    pub fn slot(&self, index: usize) -> Result<&ButtonSlot> {
        safety::validate_button_slot(index)?;
        Ok(&self.slots[index])
    }

    pub fn set_slot(&mut self, index: usize, slot: ButtonSlot) -> Result<()> {
        safety::validate_button_slot(index)?;
        self.slots[index] = slot;
        Ok(())
    }
}

impl FeatureReport for ProfileButtons {
    const REPORT_ID: u8 = ids::PROFILE_BUTTONS;
    const SIZE: usize = 3 + BUTTON_SLOTS * ButtonSlot::SIZE;

    fn decode(data: &[u8]) -> Result<Self> {
        check_sized_frame(data, Self::REPORT_ID, Self::SIZE)?;
        let mut slots = [ButtonSlot::default(); BUTTON_SLOTS];
        for (slot, chunk) in slots.iter_mut().zip(data[3..].chunks_exact(ButtonSlot::SIZE)) {
            *slot = ButtonSlot {
                function: chunk[0],
                modifier: chunk[1],
                key: chunk[2],
            };
        }
        Ok(Self {
            profile_index: data[2],
            slots,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&[Self::REPORT_ID, Self::SIZE as u8, self.profile_index]);
        for slot in &self.slots {
            buf.extend_from_slice(&[slot.function, slot.modifier, slot.key]);
        }
        buf
    }
}
