//! STOMP 1.2 frame encoding and decoding.
//!
//! ```text
//! COMMAND EOL
//! *( header EOL )
//! EOL
//! *OCTET NUL
//! *( EOL )
//! ```
//!
//! EOL is LF or CR LF. A lone EOL between frames is a heart-beat.

use thiserror::Error;

/// Frame codec errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The command line is not a STOMP command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// A header line has no `:` separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// A header contains an undefined escape sequence.
    #[error("invalid escape sequence in header: {0:?}")]
    InvalidEscape(String),

    /// The `content-length` header is not a number.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// The body is shorter than `content-length` declares.
    #[error("frame truncated: expected {expected} body bytes, {available} available")]
    Truncated {
        /// Declared body length.
        expected: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// The frame is not terminated by a NUL octet.
    #[error("frame is not NUL-terminated")]
    MissingNul,

    /// Command or headers are not valid UTF-8.
    #[error("command or headers are not valid UTF-8")]
    InvalidUtf8,

    /// The frame exceeds the configured size limit.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    TooLarge {
        /// Frame size in bytes.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
}

/// STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // Client commands
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // Server commands
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// Parse a command line.
    pub fn parse(s: &str) -> Option<Self> {
        let command = match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        };
        Some(command)
    }

    /// CONNECT, STOMP and CONNECTED headers are never escaped.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; the first one wins.
    pub headers: Vec<(String, String)>,
    /// Frame body.
    pub body: Vec<u8>,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Build an ERROR frame with a short `message` header and a longer body.
    pub fn error(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Frame::new(Command::Error)
            .header("message", message)
            .header("content-type", "text/plain")
            .body(detail.into().into_bytes())
    }

    /// Serialize to wire bytes, NUL terminator included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');
        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(s.to_string())),
        }
    }
    Ok(out)
}

/// Cursor over one WebSocket message's bytes.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn skip_eols(&mut self) {
        while self.pos < self.buf.len() {
            match self.buf[self.pos] {
                b'\n' => self.pos += 1,
                b'\r' if self.buf.get(self.pos + 1) == Some(&b'\n') => self.pos += 2,
                _ => break,
            }
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Next line without its EOL. `None` if no LF remains.
    fn line(&mut self) -> Result<Option<&'a str>, FrameError> {
        let buf = self.buf;
        let rest = &buf[self.pos..];
        let Some(lf) = rest.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        self.pos += lf + 1;
        let raw = rest[..lf].strip_suffix(b"\r").unwrap_or(&rest[..lf]);
        std::str::from_utf8(raw)
            .map(Some)
            .map_err(|_| FrameError::InvalidUtf8)
    }
}

/// Decode every frame in `input`.
///
/// Heart-beat EOLs before, between and after frames are skipped. A frame
/// split across two inputs is rejected rather than buffered. A frame larger
/// than `max_frame_bytes` is rejected before its body is copied.
pub fn parse_frames(input: &[u8], max_frame_bytes: usize) -> Result<Vec<Frame>, FrameError> {
    let mut reader = Reader { buf: input, pos: 0 };
    let mut frames = Vec::new();

    loop {
        reader.skip_eols();
        if reader.at_end() {
            break;
        }
        frames.push(parse_one(&mut reader, max_frame_bytes)?);
    }

    Ok(frames)
}

fn parse_one(reader: &mut Reader<'_>, limit: usize) -> Result<Frame, FrameError> {
    let start = reader.pos;
    let too_large = |size: usize| FrameError::TooLarge { size, limit };

    let command_line = reader.line()?.ok_or(FrameError::MissingNul)?;
    let command = Command::parse(command_line)
        .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;

    let mut frame = Frame::new(command);
    loop {
        let line = reader.line()?.ok_or(FrameError::MissingNul)?;
        // At least the NUL is still to come.
        if reader.pos - start >= limit {
            return Err(too_large(reader.pos - start + 1));
        }
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            frame
                .headers
                .push((unescape_header(name)?, unescape_header(value)?));
        } else {
            frame.headers.push((name.to_string(), value.to_string()));
        }
    }

    let head_len = reader.pos - start;
    // Body bytes that still fit, leaving room for the NUL.
    let budget = limit.saturating_sub(head_len + 1);
    let rest = &reader.buf[reader.pos..];
    let body_len = match frame.get("content-length") {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
            if len > budget {
                return Err(too_large(head_len.saturating_add(len).saturating_add(1)));
            }
            if rest.len() <= len {
                return Err(FrameError::Truncated {
                    expected: len,
                    available: rest.len(),
                });
            }
            if rest[len] != 0 {
                return Err(FrameError::MissingNul);
            }
            len
        }
        None => {
            let window = &rest[..rest.len().min(budget + 1)];
            match window.iter().position(|&b| b == 0) {
                Some(nul) => nul,
                None if rest.len() > budget => return Err(too_large(head_len + rest.len())),
                None => return Err(FrameError::MissingNul),
            }
        }
    };

    frame.body = rest[..body_len].to_vec();
    reader.pos += body_len + 1;
    Ok(frame)
}
