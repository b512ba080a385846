//! Translation between shortcut slots and host key combinations.
//!
//! Device key bytes are HID keyboard usage codes. A host key is a logical
//! key plus a keypad flag: the digit row and the keypad share host keys
//! (`5` vs `Kp5`) but not usage codes, so every table entry carries a
//! [`KeypadRule`] saying which keypad state it answers to.
//!
//! Under a German layout Y and Z trade places. The swap is applied to the
//! usage code on both the encode and the decode path, so a shortcut typed
//! as Ctrl+Z on a German keyboard fires the key labelled Z.

use serde::{Deserialize, Serialize};

/// Modifier bits, shared by the device modifier byte and host combinations.
pub mod modifiers {
    pub const SHIFT: u8 = 0x01;
    pub const CTRL: u8 = 0x02;
    pub const ALT: u8 = 0x04;
    pub const WIN: u8 = 0x08;
    pub const ALL: u8 = SHIFT | CTRL | ALT | WIN;
}

const USAGE_Y: u8 = 0x1C;
const USAGE_Z: u8 = 0x1D;

/// Keyboard layout affecting the key code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyboardLayout {
    #[default]
    Default,
    German,
}

impl KeyboardLayout {
    /// Layout for a POSIX or BCP 47 locale name ("de_DE.UTF-8", "de-AT").
    pub fn from_locale(locale: &str) -> Self {
        let lang = locale
            .split(|c| matches!(c, '_' | '-' | '.' | '@'))
            .next()
            .unwrap_or("");
        if lang.eq_ignore_ascii_case("de") {
            Self::German
        } else {
            Self::Default
        }
    }

    /// Layout from the process locale environment.
    pub fn from_env() -> Self {
        ["LC_ALL", "LC_CTYPE", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty())
            .map(|value| Self::from_locale(&value))
            .unwrap_or_default()
    }

    /// Apply the layout's code swap. Self-inverse.
    fn swap(&self, code: u8) -> u8 {
        match (self, code) {
            (Self::German, USAGE_Y) => USAGE_Z,
            (Self::German, USAGE_Z) => USAGE_Y,
            _ => code,
        }
    }
}

/// Logical host key.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKey {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Digit0, Digit1, Digit2, Digit3, Digit4,
    Digit5, Digit6, Digit7, Digit8, Digit9,
    Enter,
    Escape,
    Backspace,
    Tab,
    Space,
    Minus,
    Equal,
    BracketLeft,
    BracketRight,
    Backslash,
    Semicolon,
    Apostrophe,
    Grave,
    Comma,
    Period,
    Slash,
    CapsLock,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    PrintScreen,
    ScrollLock,
    Pause,
    Insert,
    Home,
    PageUp,
    Delete,
    End,
    PageDown,
    Right,
    Left,
    Down,
    Up,
    NumLock,
    Asterisk,
    Plus,
    Menu,
}

/// Keypad state a table entry matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypadRule {
    /// Only without the keypad flag.
    Unset,
    /// Only with the keypad flag.
    Set,
    /// Regardless of the keypad flag.
    Either,
}

impl KeypadRule {
    fn matches(&self, keypad: bool) -> bool {
        match self {
            Self::Unset => !keypad,
            Self::Set => keypad,
            Self::Either => true,
        }
    }
}

use HostKey::*;
use KeypadRule::{Either, Set, Unset};

/// Usage code ↔ host key table.
#[rustfmt::skip]
const KEY_TABLE: &[(u8, HostKey, KeypadRule)] = &[
    (0x04, A, Either), (0x05, B, Either), (0x06, C, Either), (0x07, D, Either),
    (0x08, E, Either), (0x09, F, Either), (0x0A, G, Either), (0x0B, H, Either),
    (0x0C, I, Either), (0x0D, J, Either), (0x0E, K, Either), (0x0F, L, Either),
    (0x10, M, Either), (0x11, N, Either), (0x12, O, Either), (0x13, P, Either),
    (0x14, Q, Either), (0x15, R, Either), (0x16, S, Either), (0x17, T, Either),
    (0x18, U, Either), (0x19, V, Either), (0x1A, W, Either), (0x1B, X, Either),
    (0x1C, Y, Either), (0x1D, Z, Either),
    (0x1E, Digit1, Unset), (0x1F, Digit2, Unset), (0x20, Digit3, Unset),
    (0x21, Digit4, Unset), (0x22, Digit5, Unset), (0x23, Digit6, Unset),
    (0x24, Digit7, Unset), (0x25, Digit8, Unset), (0x26, Digit9, Unset),
    (0x27, Digit0, Unset),
    (0x28, Enter, Unset),
    (0x29, Escape, Either),
    (0x2A, Backspace, Either),
    (0x2B, Tab, Either),
    (0x2C, Space, Either),
    (0x2D, Minus, Unset),
    (0x2E, Equal, Either),
    (0x2F, BracketLeft, Either),
    (0x30, BracketRight, Either),
    (0x31, Backslash, Either),
    (0x33, Semicolon, Either),
    (0x34, Apostrophe, Either),
    (0x35, Grave, Either),
    (0x36, Comma, Either),
    (0x37, Period, Unset),
    (0x38, Slash, Unset),
    (0x39, CapsLock, Either),
    (0x3A, F1, Either), (0x3B, F2, Either), (0x3C, F3, Either), (0x3D, F4, Either),
    (0x3E, F5, Either), (0x3F, F6, Either), (0x40, F7, Either), (0x41, F8, Either),
    (0x42, F9, Either), (0x43, F10, Either), (0x44, F11, Either), (0x45, F12, Either),
    (0x46, PrintScreen, Either),
    (0x47, ScrollLock, Either),
    (0x48, Pause, Either),
    (0x49, Insert, Either),
    (0x4A, Home, Either),
    (0x4B, PageUp, Either),
    (0x4C, Delete, Either),
    (0x4D, End, Either),
    (0x4E, PageDown, Either),
    (0x4F, Right, Either),
    (0x50, Left, Either),
    (0x51, Down, Either),
    (0x52, Up, Either),
    (0x53, NumLock, Either),
    (0x54, Slash, Set),
    (0x55, Asterisk, Either),
    (0x56, Minus, Set),
    (0x57, Plus, Either),
    (0x58, Enter, Set),
    (0x59, Digit1, Set), (0x5A, Digit2, Set), (0x5B, Digit3, Set),
    (0x5C, Digit4, Set), (0x5D, Digit5, Set), (0x5E, Digit6, Set),
    (0x5F, Digit7, Set), (0x60, Digit8, Set), (0x61, Digit9, Set),
    (0x62, Digit0, Set),
    (0x63, Period, Set),
    (0x65, Menu, Either),
];

/// Display name and parse aliases per host key. The first alias is the
/// display name.
#[rustfmt::skip]
const KEY_NAMES: &[(HostKey, &[&str])] = &[
    (A, &["A"]), (B, &["B"]), (C, &["C"]), (D, &["D"]), (E, &["E"]),
    (F, &["F"]), (G, &["G"]), (H, &["H"]), (I, &["I"]), (J, &["J"]),
    (K, &["K"]), (L, &["L"]), (M, &["M"]), (N, &["N"]), (O, &["O"]),
    (P, &["P"]), (Q, &["Q"]), (R, &["R"]), (S, &["S"]), (T, &["T"]),
    (U, &["U"]), (V, &["V"]), (W, &["W"]), (X, &["X"]), (Y, &["Y"]),
    (Z, &["Z"]),
    (Digit0, &["0"]), (Digit1, &["1"]), (Digit2, &["2"]), (Digit3, &["3"]),
    (Digit4, &["4"]), (Digit5, &["5"]), (Digit6, &["6"]), (Digit7, &["7"]),
    (Digit8, &["8"]), (Digit9, &["9"]),
    (Enter, &["Enter", "Return"]),
    (Escape, &["Esc", "Escape"]),
    (Backspace, &["Backspace"]),
    (Tab, &["Tab"]),
    (Space, &["Space"]),
    (Minus, &["Minus", "-"]),
    (Equal, &["Equal", "="]),
    (BracketLeft, &["BracketLeft", "["]),
    (BracketRight, &["BracketRight", "]"]),
    (Backslash, &["Backslash", "\\"]),
    (Semicolon, &["Semicolon", ";"]),
    (Apostrophe, &["Apostrophe", "'"]),
    (Grave, &["Grave", "`"]),
    (Comma, &["Comma", ","]),
    (Period, &["Period", "."]),
    (Slash, &["Slash", "/"]),
    (CapsLock, &["CapsLock"]),
    (F1, &["F1"]), (F2, &["F2"]), (F3, &["F3"]), (F4, &["F4"]),
    (F5, &["F5"]), (F6, &["F6"]), (F7, &["F7"]), (F8, &["F8"]),
    (F9, &["F9"]), (F10, &["F10"]), (F11, &["F11"]), (F12, &["F12"]),
    (PrintScreen, &["Print", "PrintScreen"]),
    (ScrollLock, &["ScrollLock"]),
    (Pause, &["Pause"]),
    (Insert, &["Ins", "Insert"]),
    (Home, &["Home"]),
    (PageUp, &["PgUp", "PageUp"]),
    (Delete, &["Del", "Delete"]),
    (End, &["End"]),
    (PageDown, &["PgDown", "PageDown"]),
    (Right, &["Right"]),
    (Left, &["Left"]),
    (Down, &["Down"]),
    (Up, &["Up"]),
    (NumLock, &["NumLock"]),
    (Asterisk, &["Asterisk", "*"]),
    (Plus, &["Plus"]),
    (Menu, &["Menu"]),
];

impl HostKey {
    pub fn name(&self) -> &'static str {
        KEY_NAMES
            .iter()
            .find(|(key, _)| key == self)
            .and_then(|(_, names)| names.first().copied())
            .unwrap_or("?")
    }

    /// Case-insensitive lookup by name or alias.
    pub fn from_name(name: &str) -> Option<Self> {
        KEY_NAMES
            .iter()
            .find(|(_, names)| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
            .map(|(key, _)| *key)
    }
}

/// Usage code and rule for a host key in the given keypad state.
fn lookup_key(key: HostKey, keypad: bool) -> Option<(u8, KeypadRule)> {
    KEY_TABLE
        .iter()
        .find(|(_, k, rule)| *k == key && rule.matches(keypad))
        .map(|(code, _, rule)| (*code, *rule))
}

/// Host key and rule for a usage code.
fn lookup_code(code: u8) -> Option<(HostKey, KeypadRule)> {
    KEY_TABLE
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, key, rule)| (*key, *rule))
}

/// A modifier set plus one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombination {
    modifiers: u8,
    key: HostKey,
    keypad: bool,
}

impl KeyCombination {
    /// Build a combination, rejecting keys that have no usage code in the
    /// requested keypad state. The keypad flag is normalized so that keys
    /// which ignore it compare equal either way.
    pub fn new(modifiers: u8, key: HostKey, keypad: bool) -> Option<Self> {
        let (_, rule) = lookup_key(key, keypad)?;
        Some(Self {
            modifiers: modifiers & modifiers::ALL,
            key,
            keypad: rule == KeypadRule::Set,
        })
    }

    pub fn modifiers(&self) -> u8 {
        self.modifiers
    }

    pub fn key(&self) -> HostKey {
        self.key
    }

    pub fn keypad(&self) -> bool {
        self.keypad
    }

    /// Device `(modifier, key)` bytes.
    pub fn encode(&self, layout: KeyboardLayout) -> (u8, u8) {
        // `new` guarantees a table entry.
        let code = lookup_key(self.key, self.keypad)
            .map(|(code, _)| code)
            .unwrap_or(0);
        (self.modifiers, layout.swap(code))
    }

    /// Host combination for device bytes. Unknown key codes yield `None`.
    pub fn decode(modifier: u8, key: u8, layout: KeyboardLayout) -> Option<Self> {
        let (host, rule) = lookup_code(layout.swap(key))?;
        Some(Self {
            modifiers: modifier & modifiers::ALL,
            key: host,
            keypad: rule == KeypadRule::Set,
        })
    }

    /// Parse text like `ctrl+shift+kp5`, `alt+F4` or `win+e`.
    ///
    /// Modifiers come first and may repeat; the last token is the key. A
    /// `kp` prefix selects the keypad variant.
    pub fn parse(input: &str) -> Option<Self> {
        let tokens: Vec<&str> = input.split('+').map(str::trim).collect();
        let (key_token, modifier_tokens) = tokens.split_last()?;
        let mut mods = 0u8;
        for token in modifier_tokens {
            mods |= match token.to_lowercase().as_str() {
                "shift" => modifiers::SHIFT,
                "ctrl" | "control" => modifiers::CTRL,
                "alt" => modifiers::ALT,
                "win" | "super" | "meta" => modifiers::WIN,
                _ => return None,
            };
        }

        if let Some(key) = HostKey::from_name(key_token) {
            return Self::new(mods, key, false);
        }
        let lower = key_token.to_lowercase();
        let rest = lower.strip_prefix("kp")?;
        let key = match rest {
            "enter" => Enter,
            "plus" => Plus,
            "minus" => Minus,
            "slash" | "divide" => Slash,
            "asterisk" | "multiply" => Asterisk,
            "period" | "decimal" => Period,
            other => HostKey::from_name(other)?,
        };
        Self::new(mods, key, true)
    }
}

impl std::fmt::Display for KeyCombination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (bit, name) in [
            (modifiers::CTRL, "Ctrl"),
            (modifiers::SHIFT, "Shift"),
            (modifiers::ALT, "Alt"),
            (modifiers::WIN, "Win"),
        ] {
            if self.modifiers & bit != 0 {
                write!(f, "{name}+")?;
            }
        }
        if self.keypad {
            write!(f, "Kp")?;
        }
        write!(f, "{}", self.key.name())
    }
}
