//! Fixed-layout command header
//!
//! Every request and response on the tuning socket starts with the same
//! 48-byte little-endian header:
//!
//! ```text
//! offset  size  field
//!      0     4  command id
//!      4     4  parameter word (order:16 reserved:8 group:4 type:3 direction:1)
//!      8     4  protocol version
//!     12     4  payload size
//!     16     8  value (untyped 8-byte union)
//!     24    20  appendix[5]
//!     44     4  alignment padding
//! ```

use crate::error::{Result, TuningError};

// ============================================================================
// Enumerations carried in the parameter word
// ============================================================================

/// Transfer direction, bit 31 of the parameter word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Get,
    Set,
}

impl Direction {
    fn from_bit(bit: u32) -> Self {
        if bit == 0 {
            Direction::Get
        } else {
            Direction::Set
        }
    }

    fn bit(self) -> u32 {
        match self {
            Direction::Get => 0,
            Direction::Set => 1,
        }
    }
}

/// Command type, bits 28-30 of the parameter word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    Single,
    Group,
    GroupAsap,
    All,
    File,
    /// Values 5-7 are not assigned; kept so decoding never fails on them
    Reserved(u8),
}

impl CommandType {
    fn from_bits(bits: u32) -> Self {
        match bits & 0x7 {
            0 => CommandType::Single,
            1 => CommandType::Group,
            2 => CommandType::GroupAsap,
            3 => CommandType::All,
            4 => CommandType::File,
            other => CommandType::Reserved(other as u8),
        }
    }

    fn bits(self) -> u32 {
        match self {
            CommandType::Single => 0,
            CommandType::Group => 1,
            CommandType::GroupAsap => 2,
            CommandType::All => 3,
            CommandType::File => 4,
            CommandType::Reserved(v) => u32::from(v & 0x7),
        }
    }
}

/// Decoded parameter word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamWord {
    pub order: u16,
    pub reserved: u8,
    pub group: u8,
    pub command_type: CommandType,
    pub direction: Direction,
}

impl ParamWord {
    pub fn new(direction: Direction, command_type: CommandType) -> Self {
        Self {
            order: 0,
            reserved: 0,
            group: 0,
            command_type,
            direction,
        }
    }

    pub fn from_u32(raw: u32) -> Self {
        Self {
            order: (raw & 0xFFFF) as u16,
            reserved: ((raw >> 16) & 0xFF) as u8,
            group: ((raw >> 24) & 0xF) as u8,
            command_type: CommandType::from_bits(raw >> 28),
            direction: Direction::from_bit(raw >> 31),
        }
    }

    pub fn to_u32(self) -> u32 {
        u32::from(self.order)
            | (u32::from(self.reserved) << 16)
            | ((u32::from(self.group) & 0xF) << 24)
            | (self.command_type.bits() << 28)
            | (self.direction.bit() << 31)
    }
}

impl Default for ParamWord {
    fn default() -> Self {
        Self::new(Direction::Get, CommandType::Single)
    }
}

// ============================================================================
// Value union
// ============================================================================

/// The 8-byte value slot. The wire gives it no tag; each command decides how
/// to interpret it, so it is kept as raw bytes with typed views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandValue(pub [u8; 8]);

impl CommandValue {
    pub fn from_u32(v: u32) -> Self {
        let mut raw = [0u8; 8];
        raw[..4].copy_from_slice(&v.to_le_bytes());
        Self(raw)
    }

    pub fn from_u64(v: u64) -> Self {
        Self(v.to_le_bytes())
    }

    pub fn from_f64(v: f64) -> Self {
        Self(v.to_le_bytes())
    }

    pub fn as_u8(&self) -> u8 {
        self.0[0]
    }

    pub fn as_u16(&self) -> u16 {
        u16::from_le_bytes([self.0[0], self.0[1]])
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn as_i32(&self) -> i32 {
        self.as_u32() as i32
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    pub fn as_f32(&self) -> f32 {
        f32::from_bits(self.as_u32())
    }

    pub fn as_f64(&self) -> f64 {
        f64::from_bits(self.as_u64())
    }
}

// ============================================================================
// Header
// ============================================================================

/// Number of appendix words
pub const APPENDIX_LEN: usize = 5;

/// Command header as exchanged on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandHeader {
    pub command_id: u32,
    pub param: ParamWord,
    pub version: u32,
    pub payload_size: u32,
    pub value: CommandValue,
    pub appendix: [u32; APPENDIX_LEN],
}

impl CommandHeader {
    /// Encoded size including trailing alignment padding
    pub const SIZE: usize = 48;

    pub fn new(command_id: u32, direction: Direction) -> Self {
        Self {
            command_id,
            param: ParamWord::new(direction, CommandType::Single),
            ..Default::default()
        }
    }

    pub fn direction(&self) -> Direction {
        self.param.direction
    }

    pub fn command_type(&self) -> CommandType {
        self.param.command_type
    }

    /// Decode a header from the first [`Self::SIZE`] bytes of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(TuningError::Format(format!(
                "header needs {} bytes, got {}",
                Self::SIZE,
                buf.len()
            )));
        }

        let word = |offset: usize| {
            u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
        };

        let mut value = [0u8; 8];
        value.copy_from_slice(&buf[16..24]);

        let mut appendix = [0u32; APPENDIX_LEN];
        for (i, slot) in appendix.iter_mut().enumerate() {
            *slot = word(24 + i * 4);
        }

        Ok(Self {
            command_id: word(0),
            param: ParamWord::from_u32(word(4)),
            version: word(8),
            payload_size: word(12),
            value: CommandValue(value),
            appendix,
        })
    }

    /// Encode into a fixed-size buffer
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        self.write_to(&mut buf);
        buf
    }

    /// Write into `buf`, which must hold at least [`Self::SIZE`] bytes
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.command_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.param.to_u32().to_le_bytes());
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.value.0);
        for (i, word) in self.appendix.iter().enumerate() {
            let offset = 24 + i * 4;
            buf[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
        }
        buf[44..48].fill(0);
    }

    /// Copy of this header suitable as a reply carrying `payload_len` bytes
    pub fn reply(&self, payload_len: usize) -> Self {
        Self {
            payload_size: payload_len as u32,
            ..*self
        }
    }
}
