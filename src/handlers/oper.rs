//! Operator authentication and server-notice masks.

use super::{ClientHandler, Context};
use crate::error::{HandlerError, HandlerResult};
use crate::snomask::SnoMask;
use crate::state::OperPrivs;
use async_trait::async_trait;
use corvid_proto::{MessageRef, Numeric};

/// Verify a password against an oper block: bcrypt when the stored value
/// is a `$2…` hash, byte equality otherwise (dev configs).
fn password_matches(supplied: &str, stored: &str) -> bool {
    if stored.starts_with("$2") {
        bcrypt::verify(supplied, stored).unwrap_or(false)
    } else {
        supplied == stored
    }
}

/// Handler for `OPER <name> <password>`.
pub struct OperHandler;

#[async_trait]
impl ClientHandler for OperHandler {
    async fn handle(&self, ctx: &Context<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        let Some(name) = msg.arg(0).filter(|a| !a.is_empty()) else {
            return Err(HandlerError::NeedMoreParams);
        };
        let Some(password) = msg.arg(1) else {
            return Err(HandlerError::NeedMoreParams);
        };

        let block = ctx
            .matrix
            .config
            .opers
            .iter()
            .find(|block| block.name == name);

        let Some(block) = block.filter(|b| password_matches(password, &b.password)) else {
            let nick = ctx.nick().await;
            tracing::warn!(oper = %name, nick = %nick, "Failed OPER attempt");
            ctx.matrix
                .sendto_realops(
                    SnoMask::GENERAL,
                    &format!("Failed OPER attempt by {nick} ({name})"),
                )
                .await;
            ctx.numeric(
                Numeric::ERR_PASSWDMISMATCH,
                vec!["Password incorrect".to_string()],
            )
            .await;
            return Ok(());
        };

        let hostmask = {
            let Some(user) = ctx.matrix.users.get(ctx.uid) else {
                return Ok(());
            };
            let mut user = user.write().await;
            user.oper = Some(OperPrivs {
                name: block.name.clone(),
                resv: block.resv,
                remote_ban: block.remote_ban,
            });
            user.snomask = SnoMask::oper_default();
            user.hostmask()
        };

        tracing::info!(oper = %block.name, client = %hostmask, "OPER succeeded");
        ctx.matrix
            .sendto_realops(SnoMask::GENERAL, &format!("{hostmask} is now an operator"))
            .await;
        ctx.numeric(
            Numeric::RPL_YOUREOPER,
            vec!["You are now an IRC operator".to_string()],
        )
        .await;
        ctx.numeric(
            Numeric::RPL_SNOMASK,
            vec![
                SnoMask::oper_default().to_string(),
                "Server notice mask".to_string(),
            ],
        )
        .await;
        Ok(())
    }
}

/// Handler for `SNOMASK [+|-letters]` — adjust server-notice subscriptions.
pub struct SnomaskHandler;

#[async_trait]
impl ClientHandler for SnomaskHandler {
    async fn handle(&self, ctx: &Context<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        let Some(user) = ctx.matrix.users.get(ctx.uid).map(|u| u.value().clone()) else {
            return Ok(());
        };

        let mask = {
            let mut user = user.write().await;
            if !user.is_oper() {
                drop(user);
                ctx.numeric(
                    Numeric::ERR_NOPRIVILEGES,
                    vec!["Permission Denied - You're not an IRC operator".to_string()],
                )
                .await;
                return Ok(());
            }
            if let Some(changes) = msg.arg(0) {
                user.snomask = user.snomask.apply(changes);
            }
            user.snomask
        };

        ctx.numeric(
            Numeric::RPL_SNOMASK,
            vec![mask.to_string(), "Server notice mask".to_string()],
        )
        .await;
        Ok(())
    }
}
