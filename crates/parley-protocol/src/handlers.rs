//! Reusable message handlers

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::router::{HandlerContext, MessageHandler};

/// Replies with a fixed body
#[derive(Clone, Debug)]
pub struct StaticReply {
    body: String,
}

impl StaticReply {
    /// Reply with `body`
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

#[async_trait]
impl MessageHandler for StaticReply {
    async fn handle(&self, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        reply(ctx, &self.body).await
    }
}

/// Replies with a body computed from the incoming text.
///
/// Returning `None` sends nothing.
pub struct ReplyWith<F> {
    compose: F,
}

impl<F> ReplyWith<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    /// Reply with whatever `compose` returns
    pub fn new(compose: F) -> Self {
        Self { compose }
    }
}

#[async_trait]
impl<F> MessageHandler for ReplyWith<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    async fn handle(&self, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        match (self.compose)(ctx.text) {
            Some(body) => reply(ctx, &body).await,
            None => Ok(()),
        }
    }
}

/// Strips `prefix` and echoes the rest back
pub fn echo(prefix: &'static str) -> ReplyWith<impl Fn(&str) -> Option<String> + Send + Sync> {
    ReplyWith::new(move |text: &str| {
        let rest = text.strip_prefix(prefix)?.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    })
}

async fn reply(ctx: &HandlerContext<'_>, body: &str) -> anyhow::Result<()> {
    let outcome = ctx.reply(body).await;
    match outcome.error() {
        None => {
            debug!("Replied to {}", ctx.message.sender);
            Ok(())
        }
        Some(error) => {
            warn!("Reply to {} not delivered: {}", ctx.message.sender, error);
            anyhow::bail!("reply not delivered: {}", error)
        }
    }
}
