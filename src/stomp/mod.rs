//! STOMP 1.2 wire protocol.
//!
//! Browser drawing clients speak STOMP over the WebSocket: they SUBSCRIBE to
//! a broadcast topic and SEND draw events to an application destination.

mod frame;

pub use frame::{parse_frames, Command, Frame, FrameError};

/// Versions this server accepts, best first.
const SUPPORTED_VERSIONS: [&str; 3] = ["1.2", "1.1", "1.0"];

/// Pick the version to use from a CONNECT frame's `accept-version` header.
///
/// A missing header means a STOMP 1.0 client. Returns `None` when the
/// client and server share no version.
pub fn negotiate_version(accept_version: Option<&str>) -> Option<&'static str> {
    let Some(list) = accept_version else {
        return Some("1.0");
    };
    let offered: Vec<&str> = list.split(',').map(str::trim).collect();
    SUPPORTED_VERSIONS
        .into_iter()
        .find(|v| offered.contains(v))
}
