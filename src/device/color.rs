use serde::{Deserialize, Serialize};

/// Bit layout of one pixel on the device framebuffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 5/6/5 bits, little-endian `u16` (the Sense HAT framebuffer).
    #[default]
    Rgb565,
    /// 4 bits per channel: `byte0 = b << 4`, `byte1 = r << 4 | g`.
    Rgb444,
}

/// A quantized pixel, stored as the two bytes the device expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color {
    bytes: [u8; 2],
}

impl Color {
    /// All channels off.
    pub const BLACK: Color = Color { bytes: [0, 0] };

    /// Quantize an 8-bit RGB triple by truncation.
    pub fn encode(format: PixelFormat, r: u8, g: u8, b: u8) -> Self {
        let bytes = match format {
            PixelFormat::Rgb565 => {
                let v = ((u16::from(r) & 0xF8) << 8)
                    | ((u16::from(g) & 0xFC) << 3)
                    | (u16::from(b) >> 3);
                v.to_le_bytes()
            }
            PixelFormat::Rgb444 => [(b & 0x0F) << 4, ((r & 0x0F) << 4) | (g & 0x0F)],
        };
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self { bytes }
    }

    pub fn bytes(self) -> [u8; 2] {
        self.bytes
    }

    pub fn byte0(self) -> u8 {
        self.bytes[0]
    }

    pub fn byte1(self) -> u8 {
        self.bytes[1]
    }

    /// Parse `#RRGGBB` or `RRGGBB` (case-insensitive). Anything else is `None`.
    pub fn parse_hex(format: PixelFormat, s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('#').unwrap_or(s);
        if s.len() != 6 || !s.is_ascii() {
            return None;
        }

        fn hex_byte(pair: &str) -> Option<u8> {
            u8::from_str_radix(pair, 16).ok()
        }

        let r = hex_byte(&s[0..2])?;
        let g = hex_byte(&s[2..4])?;
        let b = hex_byte(&s[4..6])?;
        Some(Self::encode(format, r, g, b))
    }
}
