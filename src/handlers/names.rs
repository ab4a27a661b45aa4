//! NAMES command handler.
//!
//! `NAMES <channel>` lists one channel under its visibility rules.
//! `NAMES` with no argument is the expensive global form: every visible
//! channel, then one sweep over clients whose channels are all hidden,
//! gated by a pace limiter for non-opers.

use super::{ClientHandler, Context};
use crate::error::HandlerResult;
use crate::state::{wall_clock, Channel};
use async_trait::async_trait;
use corvid_proto::{check_channel_name, irc_fold, MessageRef, Numeric};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Conservative payload budget for one RPL_NAMREPLY line.
const NAMES_LINE_BUDGET: usize = 400;

/// Pack nick tokens into lines under the reply-length budget.
fn pack_lines(names: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for name in names {
        if !current.is_empty() && current.len() + 1 + name.len() > NAMES_LINE_BUDGET {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(name);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub struct NamesHandler;

impl NamesHandler {
    /// Emit RPL_NAMREPLY lines for one channel, honoring secrecy and
    /// invisibility; optionally close with RPL_ENDOFNAMES.
    async fn channel_member_names(
        ctx: &Context<'_>,
        chan: &Arc<RwLock<Channel>>,
        show_end: bool,
    ) {
        let chan = chan.read().await;
        let is_member = chan.is_member(ctx.uid);

        if is_member || !chan.secret {
            let mut names = Vec::new();
            for (uid, modes) in &chan.members {
                let Some(user) = ctx.matrix.users.get(uid) else {
                    continue;
                };
                let user = user.read().await;
                if !is_member && user.invisible {
                    continue;
                }
                match modes.prefix_char() {
                    Some(prefix) => names.push(format!("{prefix}{}", user.nick)),
                    None => names.push(user.nick.clone()),
                }
            }
            for line in pack_lines(&names) {
                ctx.numeric(
                    Numeric::RPL_NAMREPLY,
                    vec![
                        chan.names_symbol().to_string(),
                        chan.name.clone(),
                        line,
                    ],
                )
                .await;
            }
        }

        if show_end {
            ctx.numeric(
                Numeric::RPL_ENDOFNAMES,
                vec![chan.name.clone(), "End of /NAMES list".to_string()],
            )
            .await;
        }
    }

    /// The global sweep: all visible channels, then clients missed above
    /// because every channel they sit on is hidden (or they sit nowhere).
    async fn names_global(ctx: &Context<'_>) {
        let channels: Vec<_> = ctx
            .matrix
            .channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for chan in &channels {
            Self::channel_member_names(ctx, chan, false).await;
        }

        let source_channels: HashSet<String> = match ctx.matrix.users.get(ctx.uid) {
            Some(user) => user.read().await.channels.clone(),
            None => HashSet::new(),
        };

        let mut leftovers = Vec::new();
        for entry in ctx.matrix.users.iter() {
            let user = entry.value().read().await;
            if user.invisible {
                continue;
            }

            let mut dont_show = false;
            for chan_name in &user.channels {
                let Some(chan) = ctx.matrix.channels.get(chan_name) else {
                    continue;
                };
                let chan = chan.read().await;
                // Already listed (public, or shared with the requester),
                // or hidden outright (secret).
                if chan.is_public() || chan.secret || source_channels.contains(chan_name) {
                    dont_show = true;
                    break;
                }
            }
            if !dont_show {
                leftovers.push(user.nick.clone());
            }
        }

        for line in pack_lines(&leftovers) {
            ctx.numeric(
                Numeric::RPL_NAMREPLY,
                vec!["*".to_string(), "*".to_string(), line],
            )
            .await;
        }
    }
}

#[async_trait]
impl ClientHandler for NamesHandler {
    async fn handle(&self, ctx: &Context<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        // NAMES [channel]
        if let Some(raw) = msg.arg(0).filter(|a| !a.is_empty()) {
            let name = raw.split(',').next().unwrap_or(raw);

            if !check_channel_name(name) {
                ctx.numeric(
                    Numeric::ERR_BADCHANNAME,
                    vec![name.to_string(), "Illegal channel name".to_string()],
                )
                .await;
                return Ok(());
            }

            match ctx.matrix.channels.get(&irc_fold(name)).map(|c| c.value().clone()) {
                Some(chan) => Self::channel_member_names(ctx, &chan, true).await,
                None => {
                    ctx.numeric(
                        Numeric::RPL_ENDOFNAMES,
                        vec![name.to_string(), "End of /NAMES list".to_string()],
                    )
                    .await;
                }
            }
            return Ok(());
        }

        // Global form, paced for non-opers.
        let is_oper = match ctx.matrix.users.get(ctx.uid) {
            Some(user) => user.read().await.is_oper(),
            None => false,
        };
        if !is_oper && !ctx.matrix.names_pace_ok(wall_clock()) {
            ctx.numeric(
                Numeric::RPL_LOAD2HI,
                vec![
                    "NAMES".to_string(),
                    "Server load is temporarily too heavy. Please wait a while and try again."
                        .to_string(),
                ],
            )
            .await;
            ctx.numeric(
                Numeric::RPL_ENDOFNAMES,
                vec!["*".to_string(), "End of /NAMES list".to_string()],
            )
            .await;
            return Ok(());
        }

        Self::names_global(ctx).await;
        ctx.numeric(
            Numeric::RPL_ENDOFNAMES,
            vec!["*".to_string(), "End of /NAMES list".to_string()],
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_respects_budget() {
        let names: Vec<String> = (0..100).map(|i| format!("nick{i:03}")).collect();
        let lines = pack_lines(&names);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= NAMES_LINE_BUDGET));
        let total: usize = lines.iter().map(|l| l.split(' ').count()).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn packing_empty_is_empty() {
        assert!(pack_lines(&[]).is_empty());
    }
}
