//! Build queue wire format.
//!
//! A worker sends its ABI tag as a JSON string and receives either a
//! `[package, version]` pair or `null` when there is nothing to build.

use bytes::Bytes;

use crate::{BuildJob, Result};

/// Reply sent back to a worker. `None` is the no-work marker.
pub type WorkReply = Option<BuildJob>;

pub fn encode_request(abi_tag: &str) -> Result<Bytes> {
    Ok(serde_json::to_vec(abi_tag)?.into())
}

/// Decode a work request. Anything other than a JSON string is malformed.
pub fn decode_request(payload: &[u8]) -> Result<String> {
    Ok(serde_json::from_slice(payload)?)
}

pub fn encode_reply(reply: &WorkReply) -> Result<Bytes> {
    Ok(serde_json::to_vec(reply)?.into())
}

pub fn decode_reply(payload: &[u8]) -> Result<WorkReply> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_reply_wire_shape() {
        let job = Some(BuildJob::new("pkgA", "2"));
        assert_eq!(&encode_reply(&job).unwrap()[..], br#"["pkgA","2"]"#);
        assert_eq!(&encode_reply(&None).unwrap()[..], b"null");
        assert_eq!(decode_reply(b"null").unwrap(), None);
        assert_eq!(decode_reply(br#"["pkgA","2"]"#).unwrap(), job);
    }

    #[test]
    fn test_request_wire_shape() {
        assert_eq!(&encode_request("cp35m").unwrap()[..], br#""cp35m""#);
        assert_eq!(decode_request(br#""cp35m""#).unwrap(), "cp35m");
    }

    #[test]
    fn test_malformed_request() {
        assert!(matches!(decode_request(b"42"), Err(Error::Malformed(_))));
        assert!(matches!(decode_request(b"[\"cp35m\"]"), Err(Error::Malformed(_))));
        assert!(matches!(decode_request(b"\xff"), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_malformed_reply() {
        assert!(decode_reply(br#"["only-one"]"#).is_err());
    }
}
