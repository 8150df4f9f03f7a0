//! Per-frame flag word.
//!
//! ```text
//! bits  0-7   frame type
//! bits  8-15  payload (message) type, for encoded payloads
//! bits 16-23  repeat count
//! bits 24-31  unused, preserved
//! ```

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameType {
    /// Left for the receiving side to interpret.
    #[default]
    Unspecified,
    /// Identity of the sender.
    Originator,
    /// Identity of the destination.
    Target,
    /// Payload in protobuf wire format.
    Protobuf,
    /// Payload is a native struct image.
    NanopbStruct,
}

impl FrameType {
    pub const fn as_raw(self) -> u8 {
        match self {
            FrameType::Unspecified => 0,
            FrameType::Originator => 1,
            FrameType::Target => 2,
            FrameType::Protobuf => 3,
            FrameType::NanopbStruct => 4,
        }
    }

    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(FrameType::Unspecified),
            1 => Some(FrameType::Originator),
            2 => Some(FrameType::Target),
            3 => Some(FrameType::Protobuf),
            4 => Some(FrameType::NanopbStruct),
            _ => None,
        }
    }

    /// Returns a human-readable name for the frame type.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Unspecified => "UNSPECIFIED",
            FrameType::Originator => "ORIGINATOR",
            FrameType::Target => "TARGET",
            FrameType::Protobuf => "PROTOBUF",
            FrameType::NanopbStruct => "NANOPB_STRUCT",
        }
    }
}

/// Message type contained in an encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PayloadType {
    #[default]
    Unspecified,
    /// A generic container message.
    Container,
    /// A realtime component message.
    RtMessage,
}

impl PayloadType {
    pub const fn as_raw(self) -> u8 {
        match self {
            PayloadType::Unspecified => 0,
            PayloadType::Container => 1,
            PayloadType::RtMessage => 2,
        }
    }

    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(PayloadType::Unspecified),
            1 => Some(PayloadType::Container),
            2 => Some(PayloadType::RtMessage),
            _ => None,
        }
    }

    /// Returns a human-readable name for the payload type.
    pub fn name(self) -> &'static str {
        match self {
            PayloadType::Unspecified => "UNSPECIFIED",
            PayloadType::Container => "CONTAINER",
            PayloadType::RtMessage => "RT_MESSAGE",
        }
    }
}

/// The `flags` word stored in every frame header.
///
/// Unknown type codes are kept as-is; accessors decode them on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameFlags(i32);

impl FrameFlags {
    const TYPE_SHIFT: u32 = 0;
    const PAYLOAD_SHIFT: u32 = 8;
    const COUNT_SHIFT: u32 = 16;
    const FIELD_MASK: u32 = 0xFF;

    /// All fields zero.
    pub const EMPTY: FrameFlags = FrameFlags(0);

    pub const fn new(frame_type: FrameType, payload_type: PayloadType, count: u8) -> Self {
        let bits = ((frame_type.as_raw() as u32) << Self::TYPE_SHIFT)
            | ((payload_type.as_raw() as u32) << Self::PAYLOAD_SHIFT)
            | ((count as u32) << Self::COUNT_SHIFT);
        FrameFlags(bits as i32)
    }

    /// Flags with only the frame type set.
    pub const fn of_type(frame_type: FrameType) -> Self {
        Self::new(frame_type, PayloadType::Unspecified, 0)
    }

    pub const fn from_bits(bits: i32) -> Self {
        FrameFlags(bits)
    }

    pub const fn bits(self) -> i32 {
        self.0
    }

    const fn field(self, shift: u32) -> u8 {
        ((self.0 as u32 >> shift) & Self::FIELD_MASK) as u8
    }

    const fn with_field(self, shift: u32, value: u8) -> Self {
        let cleared = self.0 as u32 & !(Self::FIELD_MASK << shift);
        FrameFlags((cleared | ((value as u32) << shift)) as i32)
    }

    /// Decoded frame type, `None` for codes this crate does not know.
    pub const fn frame_type(self) -> Option<FrameType> {
        FrameType::from_raw(self.frame_type_raw())
    }

    pub const fn frame_type_raw(self) -> u8 {
        self.field(Self::TYPE_SHIFT)
    }

    /// Decoded payload type, `None` for codes this crate does not know.
    pub const fn payload_type(self) -> Option<PayloadType> {
        PayloadType::from_raw(self.payload_type_raw())
    }

    pub const fn payload_type_raw(self) -> u8 {
        self.field(Self::PAYLOAD_SHIFT)
    }

    /// Repeat count for repeated submessages.
    pub const fn count(self) -> u8 {
        self.field(Self::COUNT_SHIFT)
    }

    pub const fn with_frame_type(self, frame_type: FrameType) -> Self {
        self.with_field(Self::TYPE_SHIFT, frame_type.as_raw())
    }

    pub const fn with_payload_type(self, payload_type: PayloadType) -> Self {
        self.with_field(Self::PAYLOAD_SHIFT, payload_type.as_raw())
    }

    pub const fn with_count(self, count: u8) -> Self {
        self.with_field(Self::COUNT_SHIFT, count)
    }
}

impl From<i32> for FrameFlags {
    fn from(bits: i32) -> Self {
        FrameFlags(bits)
    }
}

impl From<FrameFlags> for i32 {
    fn from(flags: FrameFlags) -> Self {
        flags.0
    }
}

impl From<FrameType> for FrameFlags {
    fn from(frame_type: FrameType) -> Self {
        FrameFlags::of_type(frame_type)
    }
}

impl std::fmt::Display for FrameFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.frame_type() {
            Some(t) => write!(f, "{}", t.name())?,
            None => write!(f, "TYPE({})", self.frame_type_raw())?,
        }
        match self.payload_type() {
            Some(PayloadType::Unspecified) => {}
            Some(p) => write!(f, "/{}", p.name())?,
            None => write!(f, "/PAYLOAD({})", self.payload_type_raw())?,
        }
        if self.count() > 0 {
            write!(f, " x{}", self.count())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions() {
        let flags = FrameFlags::new(FrameType::Protobuf, PayloadType::RtMessage, 5);
        assert_eq!(flags.bits(), 0x0005_0203);
        assert_eq!(flags.frame_type(), Some(FrameType::Protobuf));
        assert_eq!(flags.payload_type(), Some(PayloadType::RtMessage));
        assert_eq!(flags.count(), 5);
    }

    #[test]
    fn setters_touch_one_field() {
        let flags = FrameFlags::from_bits(0x7F00_0000).with_count(3);
        assert_eq!(flags.bits(), 0x7F03_0000);

        let flags = flags.with_frame_type(FrameType::Target);
        assert_eq!(flags.bits(), 0x7F03_0002);
        assert_eq!(flags.with_count(0).count(), 0);
        assert_eq!(flags.with_count(0).frame_type(), Some(FrameType::Target));
    }

    #[test]
    fn unknown_codes_survive() {
        let flags = FrameFlags::from_bits(0x0000_09FE);
        assert_eq!(flags.frame_type(), None);
        assert_eq!(flags.frame_type_raw(), 0xFE);
        assert_eq!(flags.payload_type(), None);
        assert_eq!(i32::from(flags), 0x09FE);
    }

    #[test]
    fn display() {
        assert_eq!(FrameFlags::EMPTY.to_string(), "UNSPECIFIED");
        assert_eq!(
            FrameFlags::new(FrameType::Protobuf, PayloadType::Container, 2).to_string(),
            "PROTOBUF/CONTAINER x2"
        );
        assert_eq!(FrameFlags::from_bits(0x63).to_string(), "TYPE(99)");
    }

    #[test]
    fn default_is_unspecified() {
        assert_eq!(FrameFlags::default(), FrameFlags::EMPTY);
        assert_eq!(
            FrameFlags::from(FrameType::Originator).frame_type(),
            Some(FrameType::Originator)
        );
    }
}
