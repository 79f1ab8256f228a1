//! Generated protobuf types for the weft wire protocol.

include!(concat!(env!("OUT_DIR"), "/weft.network.rs"));

impl PeerMessage {
    pub fn push_request(req: PushRequest) -> Self {
        Self { message: Some(peer_message::Message::PushRequest(req)) }
    }

    pub fn push_response(res: PushResponse) -> Self {
        Self { message: Some(peer_message::Message::PushResponse(res)) }
    }

    pub fn pull_request(req: PullRequest) -> Self {
        Self { message: Some(peer_message::Message::PullRequest(req)) }
    }

    pub fn pull_response(res: PullResponse) -> Self {
        Self { message: Some(peer_message::Message::PullResponse(res)) }
    }

    pub fn head_announce(announce: HeadAnnounce) -> Self {
        Self { message: Some(peer_message::Message::HeadAnnounce(announce)) }
    }
}

impl PushResponse {
    /// A bare status with no invite attached.
    pub fn with_status(status: u32) -> Self {
        Self { status, ..Default::default() }
    }

    /// A rejection carrying a failure message.
    pub fn rejection(status: u32, error: impl Into<String>) -> Self {
        Self { status, error: error.into(), ..Default::default() }
    }
}
