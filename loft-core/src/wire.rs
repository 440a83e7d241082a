//! Framing: one message per line, JSON payload, newline-delimited.

use thiserror::Error;

use crate::protocol::Message;

/// Encode a message into a single self-contained frame, newline included.
pub fn encode_frame(msg: &Message) -> Result<String, FrameError> {
    let mut line = serde_json::to_string(msg).map_err(FrameError::Encode)?;
    line.push('\n');
    Ok(line)
}

/// Decode one frame. Leading/trailing whitespace (including the newline
/// delimiter) is ignored; the payload must be exactly one message record.
pub fn decode_frame(line: &str) -> Result<Message, FrameError> {
    serde_json::from_str(line.trim()).map_err(FrameError::Malformed)
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame encode error: {0}")]
    Encode(serde_json::Error),
    #[error("malformed frame: {0}")]
    Malformed(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    #[test]
    fn roundtrip_single_frame() {
        let msg = Message::new(Keypair::generate().peer_id(), "hello there");
        let frame = encode_frame(&msg).unwrap();
        assert!(frame.ends_with('\n'));
        assert_eq!(frame.matches('\n').count(), 1);
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(matches!(
            decode_frame("{not json"),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            decode_frame("{\"from\":\"xyz\"}"),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn frames_split_on_newlines() {
        let a = Message::new(Keypair::generate().peer_id(), "one");
        let b = Message::new(Keypair::generate().peer_id(), "two");
        let buf = format!("{}{}", encode_frame(&a).unwrap(), encode_frame(&b).unwrap());
        let decoded: Vec<Message> = buf.lines().map(|l| decode_frame(l).unwrap()).collect();
        assert_eq!(decoded, vec![a, b]);
    }
}
