use bytes::{Buf, BufMut, Bytes, BytesMut};
use md5::{Digest, Md5};

/// Backend message header: 1 byte tag + 4 byte length (length includes itself)
pub const MESSAGE_HEADER_SIZE: usize = 5;

/// PostgreSQL protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 0x0003_0000;

/// Backend message tags
pub mod tags {
    pub const AUTHENTICATION: u8 = b'R';
    pub const PARAMETER_STATUS: u8 = b'S';
    pub const BACKEND_KEY_DATA: u8 = b'K';
    pub const READY_FOR_QUERY: u8 = b'Z';
    pub const ROW_DESCRIPTION: u8 = b'T';
    pub const DATA_ROW: u8 = b'D';
    pub const COMMAND_COMPLETE: u8 = b'C';
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    pub const ERROR_RESPONSE: u8 = b'E';
    pub const NOTICE_RESPONSE: u8 = b'N';
}

/// A single message received from the backend
#[derive(Debug, Clone)]
pub struct BackendMessage {
    pub tag: u8,
    pub payload: Bytes,
}

impl BackendMessage {
    /// Try to decode a message from bytes, returns None if not enough data
    pub fn decode(src: &mut BytesMut) -> Option<Self> {
        if src.len() < MESSAGE_HEADER_SIZE {
            return None;
        }

        let tag = src[0];
        // Length is big endian and counts itself but not the tag
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len < 4 {
            // Malformed; let the caller surface it as a protocol error
            return None;
        }

        let total_len = 1 + len;
        if src.len() < total_len {
            return None;
        }

        src.advance(MESSAGE_HEADER_SIZE);
        let payload = src.split_to(len - 4).freeze();

        Some(Self { tag, payload })
    }
}

// ============================================================================
// Frontend message encoding
// ============================================================================

/// StartupMessage: no tag byte, length + protocol version + key/value params
pub fn startup_message(user: &str, database: &str) -> Bytes {
    let mut body = BytesMut::new();
    body.put_i32(PROTOCOL_VERSION);
    put_cstr(&mut body, "user");
    put_cstr(&mut body, user);
    put_cstr(&mut body, "database");
    put_cstr(&mut body, database);
    put_cstr(&mut body, "application_name");
    put_cstr(&mut body, "argus");
    body.put_u8(0);

    let mut msg = BytesMut::with_capacity(4 + body.len());
    msg.put_i32(4 + body.len() as i32);
    msg.extend_from_slice(&body);
    msg.freeze()
}

/// PasswordMessage ('p'): cleartext password or md5 digest string
pub fn password_message(password: &str) -> Bytes {
    tagged_message(b'p', |body| put_cstr(body, password))
}

/// Query ('Q'): simple query protocol
pub fn query_message(sql: &str) -> Bytes {
    tagged_message(b'Q', |body| put_cstr(body, sql))
}

/// Terminate ('X'): polite connection shutdown
pub fn terminate_message() -> Bytes {
    tagged_message(b'X', |_| {})
}

fn tagged_message(tag: u8, write_body: impl FnOnce(&mut BytesMut)) -> Bytes {
    let mut body = BytesMut::new();
    write_body(&mut body);

    let mut msg = BytesMut::with_capacity(1 + 4 + body.len());
    msg.put_u8(tag);
    msg.put_i32(4 + body.len() as i32);
    msg.extend_from_slice(&body);
    msg.freeze()
}

fn put_cstr(dst: &mut BytesMut, s: &str) {
    dst.extend_from_slice(s.as_bytes());
    dst.put_u8(0);
}

// ============================================================================
// Authentication
// ============================================================================

/// Parsed Authentication ('R') request from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequest {
    Ok,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    Unsupported(i32),
}

impl AuthRequest {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 4 {
            return None;
        }
        let code = i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        match code {
            0 => Some(Self::Ok),
            3 => Some(Self::CleartextPassword),
            5 => {
                if payload.len() < 8 {
                    return None;
                }
                let salt = [payload[4], payload[5], payload[6], payload[7]];
                Some(Self::Md5Password { salt })
            }
            other => Some(Self::Unsupported(other)),
        }
    }
}

/// Compute the MD5 password response: "md5" + md5(md5(password + user) + salt)
pub fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(user.as_bytes());
    let inner = hex_digest(hasher);

    let mut hasher = Md5::new();
    hasher.update(inner.as_bytes());
    hasher.update(salt);
    format!("md5{}", hex_digest(hasher))
}

fn hex_digest(hasher: Md5) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ============================================================================
// Backend message parsing
// ============================================================================

/// Fields of an ErrorResponse / NoticeResponse
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    pub severity: String,
    pub code: String,
    pub message: String,
}

impl ErrorFields {
    pub fn parse(payload: &[u8]) -> Self {
        let mut fields = Self::default();
        let mut rest = payload;
        while let Some((&kind, tail)) = rest.split_first() {
            if kind == 0 {
                break;
            }
            let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
            let value = String::from_utf8_lossy(&tail[..end]).into_owned();
            match kind {
                b'S' => fields.severity = value,
                b'C' => fields.code = value,
                b'M' => fields.message = value,
                _ => {}
            }
            rest = &tail[(end + 1).min(tail.len())..];
        }
        fields
    }
}

/// Parse a DataRow ('D') payload into column values; None = SQL NULL
pub fn parse_data_row(payload: &[u8]) -> Option<Vec<Option<String>>> {
    if payload.len() < 2 {
        return None;
    }
    let ncols = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    let mut rest = &payload[2..];
    let mut values = Vec::with_capacity(ncols);

    for _ in 0..ncols {
        if rest.len() < 4 {
            return None;
        }
        let len = i32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        rest = &rest[4..];
        if len < 0 {
            values.push(None);
            continue;
        }
        let len = len as usize;
        if rest.len() < len {
            return None;
        }
        values.push(Some(String::from_utf8_lossy(&rest[..len]).into_owned()));
        rest = &rest[len..];
    }

    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_frame(tag: u8, body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(tag);
        buf.put_i32(4 + body.len() as i32);
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn test_decode_needs_full_header() {
        let mut buf = BytesMut::from(&b"Z\x00"[..]);
        assert!(BackendMessage::decode(&mut buf).is_none());
        assert_eq!(buf.len(), 2); // nothing consumed
    }

    #[test]
    fn test_decode_needs_full_payload() {
        let mut buf = backend_frame(tags::READY_FOR_QUERY, b"I");
        let _ = buf.split_off(buf.len() - 1);
        assert!(BackendMessage::decode(&mut buf).is_none());
    }

    #[test]
    fn test_decode_complete_message() {
        let mut buf = backend_frame(tags::READY_FOR_QUERY, b"I");
        buf.extend_from_slice(&backend_frame(tags::COMMAND_COMPLETE, b"SELECT 1\0"));

        let msg = BackendMessage::decode(&mut buf).unwrap();
        assert_eq!(msg.tag, tags::READY_FOR_QUERY);
        assert_eq!(&msg.payload[..], b"I");

        let msg = BackendMessage::decode(&mut buf).unwrap();
        assert_eq!(msg.tag, tags::COMMAND_COMPLETE);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_startup_message_layout() {
        let msg = startup_message("monitor", "postgres");
        let len = i32::from_be_bytes([msg[0], msg[1], msg[2], msg[3]]) as usize;
        assert_eq!(len, msg.len());
        let version = i32::from_be_bytes([msg[4], msg[5], msg[6], msg[7]]);
        assert_eq!(version, PROTOCOL_VERSION);
        // Parameter list is NUL-terminated key/value pairs, then a final NUL
        assert_eq!(msg[msg.len() - 1], 0);
        let body = &msg[8..];
        assert!(body.windows(8).any(|w| w == b"monitor\0"));
    }

    #[test]
    fn test_query_message_layout() {
        let msg = query_message("SELECT 1");
        assert_eq!(msg[0], b'Q');
        let len = i32::from_be_bytes([msg[1], msg[2], msg[3], msg[4]]) as usize;
        assert_eq!(len, msg.len() - 1);
        assert_eq!(&msg[5..], b"SELECT 1\0");
    }

    #[test]
    fn test_auth_request_parse() {
        assert_eq!(AuthRequest::parse(&[0, 0, 0, 0]), Some(AuthRequest::Ok));
        assert_eq!(
            AuthRequest::parse(&[0, 0, 0, 3]),
            Some(AuthRequest::CleartextPassword)
        );
        assert_eq!(
            AuthRequest::parse(&[0, 0, 0, 5, 1, 2, 3, 4]),
            Some(AuthRequest::Md5Password { salt: [1, 2, 3, 4] })
        );
        assert_eq!(
            AuthRequest::parse(&[0, 0, 0, 10]),
            Some(AuthRequest::Unsupported(10))
        );
        assert_eq!(AuthRequest::parse(&[0, 0]), None);
    }

    #[test]
    fn test_md5_password_known_vector() {
        let digest = md5_password("postgres", "secret", [1, 2, 3, 4]);
        assert_eq!(digest, "md5bb41a296aab6baccb36ff243a562abff");
    }

    #[test]
    fn test_parse_data_row() {
        // 2 columns: "t" and NULL
        let mut payload = BytesMut::new();
        payload.put_u16(2);
        payload.put_i32(1);
        payload.extend_from_slice(b"t");
        payload.put_i32(-1);

        let row = parse_data_row(&payload).unwrap();
        assert_eq!(row, vec![Some("t".to_string()), None]);
    }

    #[test]
    fn test_parse_data_row_truncated() {
        let mut payload = BytesMut::new();
        payload.put_u16(1);
        payload.put_i32(10);
        payload.extend_from_slice(b"abc"); // shorter than declared
        assert!(parse_data_row(&payload).is_none());
    }

    #[test]
    fn test_error_fields_parse() {
        let mut payload = BytesMut::new();
        payload.extend_from_slice(b"SFATAL\0C28P01\0Mpassword authentication failed\0\0");
        let fields = ErrorFields::parse(&payload);
        assert_eq!(fields.severity, "FATAL");
        assert_eq!(fields.code, "28P01");
        assert_eq!(fields.message, "password authentication failed");
    }
}
