//! Worker-side client for the build queue.

use wheelwright_core::protocol::{self, WorkReply};
use wheelwright_reactor::RequestSocket;

use crate::SchedulerResult;

/// Asks the architect for work, one request at a time.
#[derive(Debug)]
pub struct BuildQueueClient {
    socket: RequestSocket,
}

impl BuildQueueClient {
    pub async fn connect(addr: &str) -> SchedulerResult<Self> {
        Ok(Self {
            socket: RequestSocket::connect(addr).await?,
        })
    }

    /// Request the next build for `abi_tag`. `None` means nothing is queued
    /// right now; ask again later.
    pub async fn request(&mut self, abi_tag: &str) -> SchedulerResult<WorkReply> {
        let reply = self
            .socket
            .request(protocol::encode_request(abi_tag)?)
            .await?;
        Ok(protocol::decode_reply(&reply)?)
    }
}
