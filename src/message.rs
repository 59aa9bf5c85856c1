//! The ORP [`Message`] data model: the typed value the codec encodes to and decodes from the
//! wire, plus the closed enumerations (`PacketType`, `DataType`, `Version`, `FileEvent`,
//! `Status`) that appear in its fields.

/// Sentinel timestamp meaning "unset".
pub const TIMESTAMP_UNSET: f64 = -1.0;
/// Maximum `path` length in bytes.
pub const MAX_PATH_LEN: usize = 79;
/// Maximum `unit` length in bytes.
pub const MAX_UNIT_LEN: usize = 23;
/// Maximum `data` length in bytes.
pub const MAX_DATA_LEN: usize = 50_000;

/// Protocol version negotiated on a sync packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Version {
    V1 = 0,
    V2 = 1,
}

impl Version {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::V1),
            1 => Some(Self::V2),
            _ => None,
        }
    }
}

/// The type of value carried by a request whose packet type requires `DATA_TYPE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    Trigger,
    Boolean,
    Numeric,
    String,
    Json,
    Undef,
}

impl DataType {
    pub fn to_letter(self) -> u8 {
        match self {
            Self::Trigger => b'T',
            Self::Boolean => b'B',
            Self::Numeric => b'N',
            Self::String => b'S',
            Self::Json => b'J',
            Self::Undef => b' ',
        }
    }

    pub fn from_letter(letter: u8) -> Option<Self> {
        match letter {
            b'T' => Some(Self::Trigger),
            b'B' => Some(Self::Boolean),
            b'N' => Some(Self::Numeric),
            b'S' => Some(Self::String),
            b'J' => Some(Self::Json),
            b' ' => Some(Self::Undef),
            _ => None,
        }
    }
}

/// File-control notification event code, carried base-36 encoded in byte 1 of a
/// `FILE_CONTROL` notification (reusing the "second byte" slot that other packet types use for
/// status/data-type/version).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileEvent {
    Info = 0,
    Ready = 1,
    Pending = 2,
    Start = 3,
    Suspend = 4,
    Resume = 5,
    Complete = 6,
    Abort = 7,
}

impl FileEvent {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Info),
            1 => Some(Self::Ready),
            2 => Some(Self::Pending),
            3 => Some(Self::Start),
            4 => Some(Self::Suspend),
            5 => Some(Self::Resume),
            6 => Some(Self::Complete),
            7 => Some(Self::Abort),
            _ => None,
        }
    }
}

/// Response status code. `Ok` is the only success; a non-zero status is delivered to the
/// caller unchanged rather than treated as a codec-level error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i8)]
pub enum Status {
    Ok = 0,
    NotFound = -1,
    /// Deprecated by the protocol, but still a valid wire value.
    NotPossible = -2,
    OutOfRange = -3,
    NoMemory = -4,
    NotPermitted = -5,
    Fault = -6,
    CommError = -7,
    Timeout = -8,
    Overflow = -9,
    Underflow = -10,
    WouldBlock = -11,
    Deadlock = -12,
    FormatError = -13,
    Duplicate = -14,
    BadParameter = -15,
    Closed = -16,
    Busy = -17,
    Unsupported = -18,
    IoError = -19,
    NotImplemented = -20,
    Unavailable = -21,
    Terminated = -22,
}

impl Status {
    const ORDER: [Status; 23] = [
        Status::Ok,
        Status::NotFound,
        Status::NotPossible,
        Status::OutOfRange,
        Status::NoMemory,
        Status::NotPermitted,
        Status::Fault,
        Status::CommError,
        Status::Timeout,
        Status::Overflow,
        Status::Underflow,
        Status::WouldBlock,
        Status::Deadlock,
        Status::FormatError,
        Status::Duplicate,
        Status::BadParameter,
        Status::Closed,
        Status::Busy,
        Status::Unsupported,
        Status::IoError,
        Status::NotImplemented,
        Status::Unavailable,
        Status::Terminated,
    ];

    /// The signed status code carried in `Message::status`: `0` for `Ok`, down to `-22` for
    /// `Terminated`. This is the value the GLOSSARY and §6 table document, not a wire byte.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Inverse of [`Self::code`]. The index into the 23-entry table is `-code`.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ORDER.get(usize::try_from(-code).ok()?).copied()
    }
}

/// The closed set of ORP packet types, request and response (or notification and response)
/// paired. The wire letter and required-field mask for each live in [`PacketTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    InputCreateRqst,
    InputCreateResp,
    OutputCreateRqst,
    OutputCreateResp,
    DeleteRqst,
    DeleteResp,
    HandlerAddRqst,
    HandlerAddResp,
    HandlerRemoveRqst,
    HandlerRemoveResp,
    PushRqst,
    PushResp,
    GetRqst,
    GetResp,
    ExampleSetRqst,
    ExampleSetResp,
    SensorCreateRqst,
    SensorCreateResp,
    SensorRemoveRqst,
    SensorRemoveResp,
    HandlerCallNtfy,
    HandlerCallResp,
    SensorCallNtfy,
    SensorCallResp,
    SyncSyn,
    SyncSynAck,
    SyncAck,
    FileDataRqst,
    FileDataResp,
    FileControlNtfy,
    FileControlResp,
    UnknownRequestResp,
}

bitflags::bitflags! {
    /// Which of the mutually-exclusive "byte 1" slots and which variable-length fields a
    /// packet type requires.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FieldReq: u16 {
        const STATUS    = 1 << 0;
        const DATA_TYPE = 1 << 1;
        const VERSION   = 1 << 2;
        const EVENT     = 1 << 3;
        const PATH      = 1 << 4;
        const TIME      = 1 << 5;
        const DATA      = 1 << 6;
    }
}

/// Static wire-format facts about one [`PacketType`]: its ASCII letter and which fields are
/// required.
#[derive(Clone, Copy, Debug)]
pub struct TypeInfo {
    pub packet_type: PacketType,
    pub letter: u8,
    pub required: FieldReq,
}

/// The complete, closed packet-type table (§6 of the protocol spec).
pub static PACKET_TABLE: &[TypeInfo] = &[
    TypeInfo { packet_type: PacketType::InputCreateRqst, letter: b'I', required: FieldReq::from_bits_truncate(FieldReq::DATA_TYPE.bits() | FieldReq::PATH.bits()) },
    TypeInfo { packet_type: PacketType::InputCreateResp, letter: b'i', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::OutputCreateRqst, letter: b'O', required: FieldReq::from_bits_truncate(FieldReq::DATA_TYPE.bits() | FieldReq::PATH.bits()) },
    TypeInfo { packet_type: PacketType::OutputCreateResp, letter: b'o', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::DeleteRqst, letter: b'D', required: FieldReq::PATH },
    TypeInfo { packet_type: PacketType::DeleteResp, letter: b'd', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::HandlerAddRqst, letter: b'H', required: FieldReq::PATH },
    TypeInfo { packet_type: PacketType::HandlerAddResp, letter: b'h', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::HandlerRemoveRqst, letter: b'K', required: FieldReq::PATH },
    TypeInfo { packet_type: PacketType::HandlerRemoveResp, letter: b'k', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::PushRqst, letter: b'P', required: FieldReq::from_bits_truncate(FieldReq::DATA_TYPE.bits() | FieldReq::PATH.bits()) },
    TypeInfo { packet_type: PacketType::PushResp, letter: b'p', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::GetRqst, letter: b'G', required: FieldReq::PATH },
    TypeInfo { packet_type: PacketType::GetResp, letter: b'g', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::ExampleSetRqst, letter: b'E', required: FieldReq::from_bits_truncate(FieldReq::DATA_TYPE.bits() | FieldReq::PATH.bits()) },
    TypeInfo { packet_type: PacketType::ExampleSetResp, letter: b'e', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::SensorCreateRqst, letter: b'S', required: FieldReq::from_bits_truncate(FieldReq::DATA_TYPE.bits() | FieldReq::PATH.bits()) },
    TypeInfo { packet_type: PacketType::SensorCreateResp, letter: b's', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::SensorRemoveRqst, letter: b'R', required: FieldReq::PATH },
    TypeInfo { packet_type: PacketType::SensorRemoveResp, letter: b'r', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::HandlerCallNtfy, letter: b'c', required: FieldReq::from_bits_truncate(FieldReq::TIME.bits() | FieldReq::PATH.bits()) },
    TypeInfo { packet_type: PacketType::HandlerCallResp, letter: b'C', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::SensorCallNtfy, letter: b'b', required: FieldReq::PATH },
    TypeInfo { packet_type: PacketType::SensorCallResp, letter: b'B', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::SyncSyn, letter: b'Y', required: FieldReq::VERSION },
    TypeInfo { packet_type: PacketType::SyncSynAck, letter: b'y', required: FieldReq::VERSION },
    TypeInfo { packet_type: PacketType::SyncAck, letter: b'z', required: FieldReq::VERSION },
    TypeInfo { packet_type: PacketType::FileDataRqst, letter: b'T', required: FieldReq::DATA },
    TypeInfo { packet_type: PacketType::FileDataResp, letter: b't', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::FileControlNtfy, letter: b'L', required: FieldReq::EVENT },
    TypeInfo { packet_type: PacketType::FileControlResp, letter: b'l', required: FieldReq::STATUS },
    TypeInfo { packet_type: PacketType::UnknownRequestResp, letter: b'?', required: FieldReq::empty() },
];

impl PacketType {
    pub fn info(self) -> &'static TypeInfo {
        PACKET_TABLE
            .iter()
            .find(|info| info.packet_type == self)
            .expect("PACKET_TABLE covers every PacketType variant")
    }

    pub fn letter(self) -> u8 {
        self.info().letter
    }

    pub fn required(self) -> FieldReq {
        self.info().required
    }

    pub fn from_letter(letter: u8) -> Option<Self> {
        PACKET_TABLE
            .iter()
            .find(|info| info.letter == letter)
            .map(|info| info.packet_type)
    }
}

/// An ORP protocol message: the value the codec encodes to / decodes from the wire.
///
/// Fields not required by `msg_type` are simply ignored by the encoder and left at their
/// sentinel/default value by the decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub msg_type: PacketType,
    pub data_type: DataType,
    pub status: i32,
    pub version: Version,
    pub event: FileEvent,
    pub sequence_num: u16,
    pub timestamp: f64,
    pub path: Option<String>,
    pub unit: Option<String>,
    pub data: Vec<u8>,
    pub sent_count: i32,
    pub received_count: i32,
    pub mtu: i32,
}

impl Message {
    /// A message of the given type with every other field at its sentinel/default value.
    pub fn new(msg_type: PacketType) -> Self {
        Self {
            msg_type,
            data_type: DataType::Undef,
            status: 0,
            version: Version::V1,
            event: FileEvent::Info,
            sequence_num: 0,
            timestamp: TIMESTAMP_UNSET,
            path: None,
            unit: None,
            data: Vec::new(),
            sent_count: -1,
            received_count: -1,
            mtu: -1,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    pub fn with_sequence_num(mut self, sequence_num: u16) -> Self {
        self.sequence_num = sequence_num;
        self
    }
}
