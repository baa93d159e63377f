//! SCMI message header and status words

/// Status word returned in the first payload word of every response
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const NOT_SUPPORTED: i32 = -1;
    pub const INVALID_PARAMETERS: i32 = -2;
    pub const DENIED: i32 = -3;
    pub const NOT_FOUND: i32 = -4;
    pub const OUT_OF_RANGE: i32 = -5;
    pub const BUSY: i32 = -6;
    pub const COMM_ERROR: i32 = -7;
    pub const GENERIC_ERROR: i32 = -8;
    pub const HARDWARE_ERROR: i32 = -9;
    pub const PROTOCOL_ERROR: i32 = -10;
}

const MESSAGE_ID_MASK: u32 = 0xFF;
const MESSAGE_TYPE_SHIFT: u32 = 8;
const MESSAGE_TYPE_MASK: u32 = 0x3;
const PROTOCOL_ID_SHIFT: u32 = 10;
const PROTOCOL_ID_MASK: u32 = 0xFF;
const TOKEN_SHIFT: u32 = 18;
const TOKEN_MASK: u32 = 0x3FF;

/// Kind of message carried in bits 8..10 of the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Command = 0,
    DelayedResponse = 2,
    Notification = 3,
}

impl MessageType {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(MessageType::Command),
            2 => Some(MessageType::DelayedResponse),
            3 => Some(MessageType::Notification),
            _ => None,
        }
    }
}

/// Unpacked `message_header` word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_id: u8,
    pub message_type: MessageType,
    pub protocol_id: u8,
    /// 10-bit sequence token chosen by the agent
    pub token: u16,
}

impl MessageHeader {
    pub fn command(protocol_id: u8, message_id: u8, token: u16) -> Self {
        Self {
            message_id,
            message_type: MessageType::Command,
            protocol_id,
            token,
        }
    }

    pub fn notification(protocol_id: u8, message_id: u8) -> Self {
        Self {
            message_id,
            message_type: MessageType::Notification,
            protocol_id,
            token: 0,
        }
    }

    /// `(token << 18) | (protocol_id << 10) | (type << 8) | message_id`
    pub fn pack(&self) -> u32 {
        ((self.token as u32 & TOKEN_MASK) << TOKEN_SHIFT)
            | ((self.protocol_id as u32 & PROTOCOL_ID_MASK) << PROTOCOL_ID_SHIFT)
            | ((self.message_type as u32 & MESSAGE_TYPE_MASK) << MESSAGE_TYPE_SHIFT)
            | (self.message_id as u32 & MESSAGE_ID_MASK)
    }

    /// `None` for the reserved message type 1
    pub fn unpack(raw: u32) -> Option<Self> {
        Some(Self {
            message_id: (raw & MESSAGE_ID_MASK) as u8,
            message_type: MessageType::from_bits((raw >> MESSAGE_TYPE_SHIFT) & MESSAGE_TYPE_MASK)?,
            protocol_id: ((raw >> PROTOCOL_ID_SHIFT) & PROTOCOL_ID_MASK) as u8,
            token: ((raw >> TOKEN_SHIFT) & TOKEN_MASK) as u16,
        })
    }
}
