//! Controller state and the line protocol decoder.
//!
//! One protocol line describes one complete controller snapshot:
//!
//! ```text
//! <buttons> [<hat> [<lx> [<ly> [<rx> [<ry>]]]]]
//! end
//! ```
//!
//! All fields are hexadecimal, the first one must carry the `0x` prefix.
//! Missing trailing fields are zero. `end` releases everything.
//!
//! The two lowest bits of `<buttons>` are not buttons: bit 0 marks the right stick
//! fields as present, bit 1 the left stick fields. An absent stick means
//! "unchanged", not "centered".

use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

/// Minimum number of tokens in a non-`end` line (buttons + hat).
pub const MIN_TOKENS: usize = 2;

/// Maximum number of tokens in a line (buttons, hat, lx, ly, rx, ry).
pub const MAX_TOKENS: usize = 6;

/// Token releasing all inputs.
pub const END_TOKEN: &str = "end";

const RIGHT_STICK_PRESENT: u32 = 0b01;
const LEFT_STICK_PRESENT: u32 = 0b10;

bitflags! {
    /// Button mask as understood by the controller link.
    ///
    /// Bit positions follow the link's input report layout. Positions reserved by
    /// the report (side buttons, charging grip, padding) have no flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ButtonFlags: u32 {
        const Y = 1 << 0;
        const X = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const R = 1 << 6;
        const ZR = 1 << 7;
        const MINUS = 1 << 8;
        const PLUS = 1 << 9;
        const R_CLICK = 1 << 10;
        const L_CLICK = 1 << 11;
        const HOME = 1 << 12;
        const CAPTURE = 1 << 13;
        const DOWN = 1 << 16;
        const UP = 1 << 17;
        const RIGHT = 1 << 18;
        const LEFT = 1 << 19;
        const L = 1 << 22;
        const ZL = 1 << 23;
    }
}

impl ButtonFlags {
    /// All directional flags a hat position can produce.
    pub const DIRECTIONS: Self = Self::UP.union(Self::DOWN).union(Self::LEFT).union(Self::RIGHT);
}

impl Default for ButtonFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Protocol mask bit -> button. Bits 0/1 are stick presence markers, bits above 15
/// are unused by the protocol.
const BUTTON_TABLE: [(u32, ButtonFlags); 14] = [
    (1 << 2, ButtonFlags::Y),
    (1 << 3, ButtonFlags::B),
    (1 << 4, ButtonFlags::A),
    (1 << 5, ButtonFlags::X),
    (1 << 6, ButtonFlags::L),
    (1 << 7, ButtonFlags::R),
    (1 << 8, ButtonFlags::ZL),
    (1 << 9, ButtonFlags::ZR),
    (1 << 10, ButtonFlags::MINUS),
    (1 << 11, ButtonFlags::PLUS),
    (1 << 12, ButtonFlags::L_CLICK),
    (1 << 13, ButtonFlags::R_CLICK),
    (1 << 14, ButtonFlags::HOME),
    (1 << 15, ButtonFlags::CAPTURE),
];

/// Hat position -> directional flags, clockwise from Up. Index 8 is neutral.
const HAT_TABLE: [ButtonFlags; 9] = [
    ButtonFlags::UP,
    ButtonFlags::UP.union(ButtonFlags::RIGHT),
    ButtonFlags::RIGHT,
    ButtonFlags::DOWN.union(ButtonFlags::RIGHT),
    ButtonFlags::DOWN,
    ButtonFlags::DOWN.union(ButtonFlags::LEFT),
    ButtonFlags::LEFT,
    ButtonFlags::UP.union(ButtonFlags::LEFT),
    ButtonFlags::empty(),
];

/// Errors raised while decoding a protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Line is not ASCII")]
    NotAscii,

    #[error("Line must start with \"end\" or a 0x-prefixed mask, got {0:?}")]
    InvalidHeader(String),

    #[error("Expected 2 to 6 tokens, got {0}")]
    TokenCount(usize),

    #[error("Token {0:?} is not a hexadecimal number")]
    InvalidToken(String),

    #[error("Hat value {0} is outside 0..=8")]
    HatOutOfRange(u32),

    #[error("Stick axis value {0:#x} is outside 0x00..=0xff")]
    AxisOutOfRange(u32),

    #[error("Button set {0:?} has no hat encoding")]
    UnencodableDirections(ButtonFlags),
}

/// Analog stick position on the link's 12-bit scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StickPosition {
    pub x: u16,
    pub y: u16,
}

impl StickPosition {
    pub const NEUTRAL: u16 = 0x800;
    pub const MAX: u16 = 0xFFF;

    /// Raw protocol byte of an axis at rest.
    pub const RAW_CENTER: u8 = 0x80;

    pub const fn neutral() -> Self {
        Self {
            x: Self::NEUTRAL,
            y: Self::NEUTRAL,
        }
    }

    /// Rest position as decoded from raw `0x80 0x80`.
    pub const fn centered() -> Self {
        let axis = widen_byte(Self::RAW_CENTER);
        Self {
            x: axis,
            y: Self::MAX - axis,
        }
    }

    /// Builds a position from raw protocol bytes.
    ///
    /// Both axes are widened from 8 to 12 bits; the y axis is inverted so that a raw
    /// `0` (stick pushed up) becomes `0xFFF`.
    pub fn from_raw(x: u32, y: u32) -> Result<Self, ProtocolError> {
        let x = widen(x)?;
        let y = Self::MAX - widen(y)?;
        Ok(Self { x, y })
    }

    /// Inverse of [`StickPosition::from_raw`].
    pub fn to_raw(self) -> (u8, u8) {
        let x = (self.x.min(Self::MAX) >> 4) as u8;
        let y = ((Self::MAX - self.y.min(Self::MAX)) >> 4) as u8;
        (x, y)
    }
}

fn widen(raw: u32) -> Result<u16, ProtocolError> {
    let byte = u8::try_from(raw).map_err(|_| ProtocolError::AxisOutOfRange(raw))?;
    Ok(widen_byte(byte))
}

const fn widen_byte(byte: u8) -> u16 {
    let value = byte as u16;
    (value << 4) | (value >> 4)
}

/// One decoded controller snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerState {
    pub buttons: ButtonFlags,
    pub left_stick: Option<StickPosition>,
    pub right_stick: Option<StickPosition>,
}

impl ControllerState {
    /// Nothing pressed, both sticks back at rest. This is what `end` decodes to.
    ///
    /// [`ControllerState::default`] differs: it leaves both sticks unchanged.
    pub fn released() -> Self {
        Self {
            buttons: ButtonFlags::empty(),
            left_stick: Some(StickPosition::centered()),
            right_stick: Some(StickPosition::centered()),
        }
    }

    pub fn decode(line: &[u8]) -> Result<Self, ProtocolError> {
        decode(line)
    }

    /// Renders the state as a protocol line (without terminator).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let directions = self.buttons & ButtonFlags::DIRECTIONS;
        let hat = HAT_TABLE
            .iter()
            .position(|flags| *flags == directions)
            .ok_or(ProtocolError::UnencodableDirections(directions))?;

        let mut mask = BUTTON_TABLE
            .iter()
            .filter(|(_, button)| self.buttons.contains(*button))
            .fold(0u32, |mask, (bit, _)| mask | bit);

        let (lx, ly) = match self.left_stick {
            Some(stick) => {
                mask |= LEFT_STICK_PRESENT;
                stick.to_raw()
            }
            None => (0, 0),
        };
        let (rx, ry) = match self.right_stick {
            Some(stick) => {
                mask |= RIGHT_STICK_PRESENT;
                stick.to_raw()
            }
            None => (0, 0),
        };

        Ok(format!(
            "{mask:#06x} {hat} {lx:02x} {ly:02x} {rx:02x} {ry:02x}"
        ))
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buttons={:?}", self.buttons)?;
        if let Some(stick) = self.left_stick {
            write!(f, " left=({:#05x},{:#05x})", stick.x, stick.y)?;
        }
        if let Some(stick) = self.right_stick {
            write!(f, " right=({:#05x},{:#05x})", stick.x, stick.y)?;
        }
        Ok(())
    }
}

/// Decodes one protocol line. Trailing CR/LF is ignored.
pub fn decode(line: &[u8]) -> Result<ControllerState, ProtocolError> {
    if !line.is_ascii() {
        return Err(ProtocolError::NotAscii);
    }
    let text = std::str::from_utf8(line).map_err(|_| ProtocolError::NotAscii)?;
    let text = text.trim_end_matches(&['\r', '\n'][..]);
    let tokens: Vec<&str> = text.split(' ').collect();

    let header = tokens.first().copied().unwrap_or_default();
    if header == END_TOKEN {
        return Ok(ControllerState::released());
    }
    if !header.starts_with("0x") {
        return Err(ProtocolError::InvalidHeader(header.to_string()));
    }
    if !(MIN_TOKENS..=MAX_TOKENS).contains(&tokens.len()) {
        return Err(ProtocolError::TokenCount(tokens.len()));
    }

    let mut fields = [0u32; MAX_TOKENS];
    for (index, (field, token)) in fields.iter_mut().zip(&tokens).enumerate() {
        *field = if index == 0 {
            parse_mask(token)?
        } else {
            parse_field(token)?
        };
    }
    let [mask, hat, lx, ly, rx, ry] = fields;

    let directions = usize::try_from(hat)
        .ok()
        .and_then(|index| HAT_TABLE.get(index))
        .copied()
        .ok_or(ProtocolError::HatOutOfRange(hat))?;

    let buttons = BUTTON_TABLE
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .fold(directions, |buttons, (_, button)| buttons | *button);

    // Axis bytes of an absent stick are not validated.
    let left_stick = if mask & LEFT_STICK_PRESENT != 0 {
        Some(StickPosition::from_raw(lx, ly)?)
    } else {
        None
    };
    let right_stick = if mask & RIGHT_STICK_PRESENT != 0 {
        Some(StickPosition::from_raw(rx, ry)?)
    } else {
        None
    };

    Ok(ControllerState {
        buttons,
        left_stick,
        right_stick,
    })
}

/// Hex digits of a token, without the optional `0x` prefix.
fn hex_digits(token: &str) -> Result<&str, ProtocolError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProtocolError::InvalidToken(token.to_string()));
    }
    Ok(digits)
}

/// Low 32 bits of a mask token of any width. Higher bits carry no button.
fn parse_mask(token: &str) -> Result<u32, ProtocolError> {
    let digits = hex_digits(token)?;
    let low = &digits[digits.len().saturating_sub(8)..];
    u32::from_str_radix(low, 16).map_err(|_| ProtocolError::InvalidToken(token.to_string()))
}

/// Value of a hat or axis token, saturating at `u32::MAX` so range checks reject it.
fn parse_field(token: &str) -> Result<u32, ProtocolError> {
    let digits = hex_digits(token)?;
    Ok(u32::from_str_radix(digits, 16).unwrap_or(u32::MAX))
}
