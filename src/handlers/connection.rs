//! Connection-lifetime commands for registered clients.
//!
//! Registration itself (NICK/USER) is driven by the network loop; these
//! are the steady-state commands.

use super::{ClientHandler, Context};
use crate::error::{HandlerError, HandlerResult};
use async_trait::async_trait;
use corvid_proto::{Message, MessageRef};

/// Handler for PING: answer with a server-prefixed PONG.
pub struct PingHandler;

#[async_trait]
impl ClientHandler for PingHandler {
    async fn handle(&self, ctx: &Context<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        let Some(token) = msg.arg(0).filter(|t| !t.is_empty()) else {
            return Err(HandlerError::NeedMoreParams);
        };
        ctx.send(
            Message::new(
                "PONG",
                vec![ctx.matrix.info.name.clone(), token.to_string()],
            )
            .with_prefix(ctx.matrix.server_prefix()),
        )
        .await;
        Ok(())
    }
}

/// Handler for QUIT: surfaces as an error so the connection loop tears
/// the session down after the in-flight writes drain.
pub struct QuitHandler;

#[async_trait]
impl ClientHandler for QuitHandler {
    async fn handle(&self, _ctx: &Context<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        Err(HandlerError::Quit(msg.arg(0).map(str::to_string)))
    }
}
