//! Linked server peers.

use crate::caps::CapSet;
use corvid_proto::Message;
use tokio::sync::mpsc;

/// A directly linked server.
#[derive(Debug)]
pub struct Peer {
    pub name: String,
    pub sid: String,
    /// Capabilities from the peer's CAPAB burst.
    pub caps: CapSet,
    pub sender: mpsc::UnboundedSender<Message>,
}

impl Peer {
    /// Queue a frame toward this peer. A closed writer means the link is
    /// going away; the split handler cleans up.
    pub fn send(&self, msg: Message) {
        let _ = self.sender.send(msg);
    }
}
