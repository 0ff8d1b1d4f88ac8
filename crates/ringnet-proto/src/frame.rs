//! Frame types and the text codec.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use crate::{
    checksum,
    errors::{DecodeError, Result},
};

/// Largest datagram a node sends or accepts.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Reserved destination answered by the first node that sees the frame.
pub const BROADCAST_NICKNAME: &str = "ALL";

/// Payload marker for the forced-error test mode.
///
/// A receiver that finds this marker strips it and acknowledges the cleaned
/// payload even if the checksum does not match.
pub const FORCED_ERROR_MARKER: &str = "FORCED_ERROR";

const TOKEN_TAG: &str = "9000";
const DATA_TAG: &str = "7777";
const DISCOVER_TAG: &str = "DISCOVER";
const UPDATE_TAG: &str = "UPDATE";

/// Characters of offending input echoed back in [`DecodeError::UnknownTag`].
const TAG_ECHO_LIMIT: usize = 16;

/// Circulating token with sequencing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenFrame {
    /// Monotonic sequence number, used for duplicate suppression
    pub sequence: u64,
    /// Wall-clock seconds since the Unix epoch of the last circulation event
    pub timestamp: f64,
    /// Nickname of the node that generated the token
    pub origin: String,
}

/// Delivery state carried by a data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Destination verified the checksum
    Ack,
    /// Destination saw a checksum mismatch
    Nack,
    /// Not yet claimed by any destination.
    ///
    /// Written as `naoexiste` on the wire: a frame that returns to its origin
    /// still pending found no destination.
    Pending,
}

impl Control {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Pending => "naoexiste",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "ACK" => Ok(Self::Ack),
            "NACK" => Ok(Self::Nack),
            "naoexiste" | "PENDING" => Ok(Self::Pending),
            other => Err(DecodeError::InvalidControl(other.to_string())),
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User data travelling around the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Delivery state
    pub control: Control,
    /// Nickname of the sender
    pub origin: String,
    /// Nickname of the recipient (or the responder, on ACK/NACK frames)
    pub destination: String,
    /// CRC-32 of the intended payload
    pub crc: u32,
    /// Message text; may contain `;` and `:`
    pub payload: String,
}

impl DataFrame {
    /// New pending frame. `crc` is supplied by the caller because it covers
    /// the intended payload, which may differ from the bytes sent.
    pub fn pending(
        origin: impl Into<String>,
        destination: impl Into<String>,
        crc: u32,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            control: Control::Pending,
            origin: origin.into(),
            destination: destination.into(),
            crc,
            payload: payload.into(),
        }
    }

    /// Whether the payload still matches the checksum it was sent with.
    pub fn checksum_matches(&self) -> bool {
        checksum::verify(&self.payload, self.crc)
    }

    /// Whether the payload carries [`FORCED_ERROR_MARKER`].
    pub fn has_forced_error(&self) -> bool {
        self.payload.contains(FORCED_ERROR_MARKER)
    }
}

/// Node announcement used by discovery and membership updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Announced nickname
    pub nickname: String,
    /// Endpoint the nickname listens on
    pub endpoint: SocketAddr,
}

impl Announcement {
    /// Create an announcement.
    pub fn new(nickname: impl Into<String>, endpoint: SocketAddr) -> Self {
        Self { nickname: nickname.into(), endpoint }
    }
}

/// Discriminant of [`Frame`], for logging and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Legacy or sequenced token
    Token,
    /// User data or its acknowledgement
    Data,
    /// Node announcing itself
    Discovery,
    /// Membership snapshot entry
    MembershipUpdate,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Token => "token",
            Self::Data => "data",
            Self::Discovery => "discovery",
            Self::MembershipUpdate => "membership-update",
        };
        f.write_str(name)
    }
}

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Bare `9000` token without metadata
    LegacyToken,
    /// Sequenced token
    Token(TokenFrame),
    /// Data, ACK or NACK
    Data(DataFrame),
    /// Discovery announcement
    Discovery(Announcement),
    /// Membership update
    MembershipUpdate(Announcement),
}

impl Frame {
    /// Frame kind.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::LegacyToken | Self::Token(_) => FrameKind::Token,
            Self::Data(_) => FrameKind::Data,
            Self::Discovery(_) => FrameKind::Discovery,
            Self::MembershipUpdate(_) => FrameKind::MembershipUpdate,
        }
    }

    /// Encode to the single-line wire text.
    pub fn encode(&self) -> String {
        match self {
            Self::LegacyToken => TOKEN_TAG.to_string(),
            Self::Token(token) => {
                format!("{TOKEN_TAG}:{}:{}:{}", token.sequence, token.timestamp, token.origin)
            },
            Self::Data(data) => format!(
                "{DATA_TAG}:{};{};{};{};{}",
                data.control, data.origin, data.destination, data.crc, data.payload
            ),
            Self::Discovery(announcement) => encode_announcement(DISCOVER_TAG, announcement),
            Self::MembershipUpdate(announcement) => encode_announcement(UPDATE_TAG, announcement),
        }
    }

    /// Decode wire text.
    pub fn decode(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(DecodeError::Empty);
        }
        if text == TOKEN_TAG {
            return Ok(Self::LegacyToken);
        }

        let Some((tag, body)) = text.split_once(':') else {
            return Err(unknown_tag(text));
        };

        match tag {
            TOKEN_TAG => decode_token(body).map(Self::Token),
            DATA_TAG => decode_data(body).map(Self::Data),
            DISCOVER_TAG => decode_announcement("discovery", body).map(Self::Discovery),
            UPDATE_TAG => decode_announcement("update", body).map(Self::MembershipUpdate),
            _ => Err(unknown_tag(text)),
        }
    }

    /// Decode a raw datagram.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
        Self::decode(text)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Frame {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

/// Check that a nickname can be carried by every frame kind.
///
/// Nicknames must be non-empty and free of the `:` and `;` delimiters,
/// whitespace and control characters.
pub fn validate_nickname(nickname: &str) -> Result<()> {
    let valid = !nickname.is_empty()
        && !nickname
            .chars()
            .any(|c| c == ':' || c == ';' || c.is_whitespace() || c.is_control());

    if valid { Ok(()) } else { Err(DecodeError::InvalidNickname(nickname.to_string())) }
}

fn encode_announcement(tag: &str, announcement: &Announcement) -> String {
    format!(
        "{tag}:{}:{}:{}",
        announcement.nickname,
        announcement.endpoint.ip(),
        announcement.endpoint.port()
    )
}

fn unknown_tag(text: &str) -> DecodeError {
    DecodeError::UnknownTag(text.chars().take(TAG_ECHO_LIMIT).collect())
}

fn decode_token(body: &str) -> Result<TokenFrame> {
    const KIND: &str = "token";

    let mut fields = body.split(':');
    let sequence = fields.next().ok_or(DecodeError::MissingField { kind: KIND, field: "sequence" })?;
    let timestamp =
        fields.next().ok_or(DecodeError::MissingField { kind: KIND, field: "timestamp" })?;
    let origin = fields.next().ok_or(DecodeError::MissingField { kind: KIND, field: "origin" })?;
    if fields.next().is_some() {
        return Err(DecodeError::TrailingFields { kind: KIND });
    }

    let sequence = sequence.parse::<u64>().map_err(|_| DecodeError::InvalidNumber {
        field: "sequence",
        value: sequence.to_string(),
    })?;

    let timestamp = timestamp
        .parse::<f64>()
        .ok()
        .filter(|ts| ts.is_finite())
        .ok_or_else(|| DecodeError::InvalidNumber {
            field: "timestamp",
            value: timestamp.to_string(),
        })?;

    validate_nickname(origin)?;

    Ok(TokenFrame { sequence, timestamp, origin: origin.to_string() })
}

fn decode_data(body: &str) -> Result<DataFrame> {
    const KIND: &str = "data";

    // Payload is the remainder and may contain the delimiter itself
    let mut fields = body.splitn(5, ';');
    let control = fields.next().ok_or(DecodeError::MissingField { kind: KIND, field: "control" })?;
    let origin = fields.next().ok_or(DecodeError::MissingField { kind: KIND, field: "origin" })?;
    let destination =
        fields.next().ok_or(DecodeError::MissingField { kind: KIND, field: "destination" })?;
    let crc = fields.next().ok_or(DecodeError::MissingField { kind: KIND, field: "crc" })?;
    let payload = fields.next().ok_or(DecodeError::MissingField { kind: KIND, field: "payload" })?;

    let control = Control::parse(control)?;
    validate_nickname(origin)?;
    validate_nickname(destination)?;
    let crc = crc
        .parse::<u32>()
        .map_err(|_| DecodeError::InvalidNumber { field: "crc", value: crc.to_string() })?;

    Ok(DataFrame {
        control,
        origin: origin.to_string(),
        destination: destination.to_string(),
        crc,
        payload: payload.to_string(),
    })
}

fn decode_announcement(kind: &'static str, body: &str) -> Result<Announcement> {
    let (nickname, address) =
        body.split_once(':').ok_or(DecodeError::MissingField { kind, field: "address" })?;
    // Split the port off the right so IPv6 literals survive
    let (ip, port) =
        address.rsplit_once(':').ok_or(DecodeError::MissingField { kind, field: "port" })?;

    validate_nickname(nickname)?;
    let ip = ip.parse::<IpAddr>().map_err(|_| DecodeError::InvalidAddress(ip.to_string()))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| DecodeError::InvalidNumber { field: "port", value: port.to_string() })?;

    Ok(Announcement { nickname: nickname.to_string(), endpoint: SocketAddr::new(ip, port) })
}
