//! CoAP message codec (RFC 7252 §3) with the Block2 option of RFC 7959.
//!
//! ```text
//!  0                   1                   2                   3
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```

use thiserror::Error;

/// Protocol version carried in every header.
pub const VERSION: u8 = 1;

const PAYLOAD_MARKER: u8 = 0xFF;
const MAX_TOKEN_LEN: usize = 8;

/// Option numbers used by the gateway.
pub mod option {
    pub const ETAG: u16 = 4;
    pub const URI_PATH: u16 = 11;
    pub const CONTENT_FORMAT: u16 = 12;
    pub const URI_QUERY: u16 = 15;
    pub const BLOCK2: u16 = 23;
    pub const SIZE2: u16 = 28;
}

/// Content-Format registry value for `text/plain; charset=utf-8`.
pub const TEXT_PLAIN_FORMAT: u32 = 0;

/// Decoding failures. Every variant means the datagram is not a CoAP message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("datagram shorter than its header")]
    Truncated,

    #[error("unsupported CoAP version {0}")]
    UnsupportedVersion(u8),

    #[error("token length {0} exceeds 8 bytes")]
    InvalidTokenLength(u8),

    #[error("reserved option nibble")]
    ReservedOptionNibble,

    #[error("option number exceeds 65535")]
    OptionNumberOverflow,

    #[error("payload marker followed by empty payload")]
    EmptyPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }

    fn bits(self) -> u8 {
        match self {
            MessageType::Confirmable => 0,
            MessageType::NonConfirmable => 1,
            MessageType::Acknowledgement => 2,
            MessageType::Reset => 3,
        }
    }
}

/// Method or response code, `c.dd` with a 3-bit class and 5-bit detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(u8);

impl Code {
    pub const EMPTY: Code = Code::new(0, 0);
    pub const GET: Code = Code::new(0, 1);
    pub const POST: Code = Code::new(0, 2);
    pub const PUT: Code = Code::new(0, 3);
    pub const DELETE: Code = Code::new(0, 4);

    pub const CONTENT: Code = Code::new(2, 5);
    pub const BAD_REQUEST: Code = Code::new(4, 0);
    pub const BAD_OPTION: Code = Code::new(4, 2);
    pub const NOT_FOUND: Code = Code::new(4, 4);
    pub const REQUEST_ENTITY_INCOMPLETE: Code = Code::new(4, 8);
    pub const INTERNAL_SERVER_ERROR: Code = Code::new(5, 0);
    pub const BAD_GATEWAY: Code = Code::new(5, 2);
    pub const SERVICE_UNAVAILABLE: Code = Code::new(5, 3);

    pub const fn new(class: u8, detail: u8) -> Self {
        Code(((class & 0x07) << 5) | (detail & 0x1F))
    }

    pub fn class(&self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(&self) -> u8 {
        self.0 & 0x1F
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_request(&self) -> bool {
        self.class() == 0 && !self.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.class() == 2
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl From<u8> for Code {
    fn from(raw: u8) -> Self {
        Code(raw)
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

/// Block-wise transfer descriptor (`NUM | M | SZX`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOption {
    pub num: u32,
    pub more: bool,
    pub szx: u8,
}

impl BlockOption {
    /// Largest encodable size exponent (1024-byte blocks).
    pub const MAX_SZX: u8 = 6;

    /// Parse an option value. SZX 7 is reserved.
    pub fn from_value(value: u32) -> Option<Self> {
        let szx = (value & 0x07) as u8;
        if szx > Self::MAX_SZX {
            return None;
        }
        Some(Self {
            num: value >> 4,
            more: value & 0x08 != 0,
            szx,
        })
    }

    pub fn value(&self) -> u32 {
        (self.num << 4) | (u32::from(self.more) << 3) | u32::from(self.szx)
    }

    /// Block size in bytes.
    pub fn size(&self) -> usize {
        1 << (self.szx + 4)
    }

    /// Size exponent for a block size that is a power of two in 16..=1024.
    pub fn szx_for(size: usize) -> u8 {
        let size = size.clamp(16, 1024);
        (size.ilog2() - 4) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Vec<u8>,
    /// Kept sorted by [`Message::add_option`]; `encode` sorts regardless.
    pub options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(msg_type: MessageType, code: Code, message_id: u16) -> Self {
        Self {
            msg_type,
            code,
            message_id,
            token: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Empty RST rejecting the message with the given id.
    pub fn reset(message_id: u16) -> Self {
        Self::new(MessageType::Reset, Code::EMPTY, message_id)
    }

    /// Add an option after any existing options with the same number.
    pub fn add_option(&mut self, number: u16, value: impl Into<Vec<u8>>) {
        let at = self.options.partition_point(|o| o.number <= number);
        self.options.insert(
            at,
            CoapOption {
                number,
                value: value.into(),
            },
        );
    }

    pub fn add_uint_option(&mut self, number: u16, value: u32) {
        self.add_option(number, encode_uint(value));
    }

    pub fn option_values(&self, number: u16) -> impl Iterator<Item = &[u8]> {
        self.options
            .iter()
            .filter(move |o| o.number == number)
            .map(|o| o.value.as_slice())
    }

    pub fn uint_option(&self, number: u16) -> Option<u32> {
        self.option_values(number).next().and_then(decode_uint)
    }

    /// Uri-Path segments joined with `/`, without a leading slash.
    pub fn path(&self) -> String {
        self.option_values(option::URI_PATH)
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn set_path(&mut self, path: &str) {
        self.options.retain(|o| o.number != option::URI_PATH);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            self.add_option(option::URI_PATH, segment.as_bytes());
        }
    }

    /// Uri-Query options as raw `key=value` tokens.
    pub fn queries(&self) -> Vec<String> {
        self.option_values(option::URI_QUERY)
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect()
    }

    pub fn add_query(&mut self, query: &str) {
        self.add_option(option::URI_QUERY, query.as_bytes());
    }

    /// Block2 option, if present and well-formed.
    pub fn block2(&self) -> Option<BlockOption> {
        self.uint_option(option::BLOCK2).and_then(BlockOption::from_value)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        if buf.len() < 4 {
            return Err(MessageError::Truncated);
        }

        let version = buf[0] >> 6;
        if version != VERSION {
            return Err(MessageError::UnsupportedVersion(version));
        }
        let msg_type = MessageType::from_bits(buf[0] >> 4);
        let token_len = buf[0] & 0x0F;
        if token_len as usize > MAX_TOKEN_LEN {
            return Err(MessageError::InvalidTokenLength(token_len));
        }
        let code = Code(buf[1]);
        let message_id = u16::from_be_bytes([buf[2], buf[3]]);

        let mut pos = 4;
        let token = take(buf, &mut pos, token_len as usize)?.to_vec();

        let mut options = Vec::new();
        let mut payload = Vec::new();
        let mut number: u32 = 0;
        while pos < buf.len() {
            let byte = buf[pos];
            pos += 1;
            if byte == PAYLOAD_MARKER {
                if pos == buf.len() {
                    return Err(MessageError::EmptyPayload);
                }
                payload = buf[pos..].to_vec();
                break;
            }

            let delta = read_extended(buf, &mut pos, byte >> 4)?;
            let length = read_extended(buf, &mut pos, byte & 0x0F)?;
            number += delta as u32;
            if number > u32::from(u16::MAX) {
                return Err(MessageError::OptionNumberOverflow);
            }
            let value = take(buf, &mut pos, length)?.to_vec();
            options.push(CoapOption {
                number: number as u16,
                value,
            });
        }

        Ok(Self {
            msg_type,
            code,
            message_id,
            token,
            options,
            payload,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.token.len() + self.payload.len() + 16);
        let token_len = self.token.len().min(MAX_TOKEN_LEN);
        out.push((VERSION << 6) | (self.msg_type.bits() << 4) | token_len as u8);
        out.push(self.code.0);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token[..token_len]);

        // Delta encoding needs ascending numbers; the stable sort keeps
        // repeated options in insertion order.
        let mut options: Vec<&CoapOption> = self.options.iter().collect();
        options.sort_by_key(|o| o.number);

        let mut previous = 0u16;
        for opt in options {
            let (delta_nibble, delta_ext) = split_extended((opt.number - previous) as usize);
            let (len_nibble, len_ext) = split_extended(opt.value.len());
            out.push((delta_nibble << 4) | len_nibble);
            out.extend_from_slice(&delta_ext);
            out.extend_from_slice(&len_ext);
            out.extend_from_slice(&opt.value);
            previous = opt.number;
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        out
    }
}

/// Read the type and message id of a datagram that failed to decode, so a
/// malformed confirmable message can still be rejected with RST.
pub fn peek_header(buf: &[u8]) -> Option<(MessageType, u16)> {
    if buf.len() < 4 || buf[0] >> 6 != VERSION {
        return None;
    }
    Some((
        MessageType::from_bits(buf[0] >> 4),
        u16::from_be_bytes([buf[2], buf[3]]),
    ))
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], MessageError> {
    let end = pos.checked_add(len).ok_or(MessageError::Truncated)?;
    let slice = buf.get(*pos..end).ok_or(MessageError::Truncated)?;
    *pos = end;
    Ok(slice)
}

fn read_extended(buf: &[u8], pos: &mut usize, nibble: u8) -> Result<usize, MessageError> {
    match nibble {
        0..=12 => Ok(nibble as usize),
        13 => Ok(take(buf, pos, 1)?[0] as usize + 13),
        14 => {
            let ext = take(buf, pos, 2)?;
            Ok(u16::from_be_bytes([ext[0], ext[1]]) as usize + 269)
        }
        _ => Err(MessageError::ReservedOptionNibble),
    }
}

fn split_extended(value: usize) -> (u8, Vec<u8>) {
    if value < 13 {
        (value as u8, Vec::new())
    } else if value < 269 {
        (13, vec![(value - 13) as u8])
    } else {
        (14, ((value - 269) as u16).to_be_bytes().to_vec())
    }
}

/// Minimal big-endian encoding; zero is the empty string.
pub fn encode_uint(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

pub fn decode_uint(value: &[u8]) -> Option<u32> {
    if value.len() > 4 {
        return None;
    }
    Some(value.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
}
