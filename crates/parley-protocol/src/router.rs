//! Inbound message routing
//!
//! Each live batch is walked in arrival order. A message is offered to the
//! registered handlers in registration order; under
//! [`DispatchPolicy::FirstMatch`] only the first whose matcher accepts the
//! body runs, under [`DispatchPolicy::AllMatches`] every one does. Each
//! handler is awaited before the next handler or message is considered.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use parley_core::{InboundBatch, InboundMessage, SendOutcome};

use crate::config::DispatchPolicy;
use crate::dispatcher::MessageDispatcher;
use crate::session_manager::SessionHandle;

/// Predicate over a message body
#[derive(Clone)]
pub enum Matcher {
    /// Body equals the text
    Exact(String),
    /// Body starts with the text
    Prefix(String),
    /// Body contains the text
    Contains(String),
    /// Every message, including ones without text
    Any,
    /// Custom predicate
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Matcher {
    /// Exact match
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    /// Prefix match
    pub fn prefix(text: impl Into<String>) -> Self {
        Self::Prefix(text.into())
    }

    /// Substring match
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    /// Custom predicate
    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Whether `body` matches
    pub fn matches(&self, body: &str) -> bool {
        match self {
            Self::Exact(text) => body == text,
            Self::Prefix(text) => body.starts_with(text.as_str()),
            Self::Contains(text) => body.contains(text.as_str()),
            Self::Any => true,
            Self::Predicate(f) => f(body),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(text) => write!(f, "Exact({:?})", text),
            Self::Prefix(text) => write!(f, "Prefix({:?})", text),
            Self::Contains(text) => write!(f, "Contains({:?})", text),
            Self::Any => write!(f, "Any"),
            Self::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// What a handler sees
pub struct HandlerContext<'a> {
    /// Session the message arrived on
    pub session: &'a SessionHandle,
    /// Dispatcher for replies
    pub dispatcher: &'a MessageDispatcher,
    /// The message
    pub message: &'a InboundMessage,
    /// Extracted body text
    pub text: &'a str,
}

impl HandlerContext<'_> {
    /// Reply to the sender
    pub async fn reply(&self, body: &str) -> SendOutcome {
        self.dispatcher.send(self.session, &self.message.sender, body).await
    }
}

/// Action invoked for a matching message
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message
    async fn handle(&self, ctx: &HandlerContext<'_>) -> anyhow::Result<()>;
}

struct Route {
    name: String,
    matcher: Matcher,
    handler: Arc<dyn MessageHandler>,
}

/// Summary of one routing pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Messages examined
    pub seen: usize,
    /// Messages skipped because we sent them
    pub skipped_own: usize,
    /// Handler invocations
    pub invocations: usize,
    /// Handler invocations that returned an error
    pub failures: usize,
}

/// Routes inbound batches to registered handlers
pub struct InboundRouter {
    dispatcher: Arc<MessageDispatcher>,
    policy: DispatchPolicy,
    routes: RwLock<Vec<Arc<Route>>>,
}

impl InboundRouter {
    /// Create a router that replies through `dispatcher`
    pub fn new(dispatcher: Arc<MessageDispatcher>, policy: DispatchPolicy) -> Self {
        Self {
            dispatcher,
            policy,
            routes: RwLock::new(Vec::new()),
        }
    }

    /// Match policy
    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Register a handler; routes are evaluated in registration order
    pub fn register(
        &self,
        name: impl Into<String>,
        matcher: Matcher,
        handler: impl MessageHandler + 'static,
    ) {
        let name = name.into();
        debug!("Registered handler {} for {:?}", name, matcher);
        self.routes.write().push(Arc::new(Route {
            name,
            matcher,
            handler: Arc::new(handler),
        }));
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Whether no handler is registered
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Route one batch
    #[instrument(
        skip(self, session, batch),
        fields(kind = ?batch.kind, size = batch.messages.len())
    )]
    pub async fn route(&self, session: &SessionHandle, batch: &InboundBatch) -> RouteReport {
        let mut report = RouteReport::default();

        if !batch.is_live() {
            debug!("Skipping backlog batch of {} messages", batch.messages.len());
            return report;
        }

        // Snapshot so registration never blocks on a running handler
        let routes: Vec<Arc<Route>> = self.routes.read().clone();

        for message in &batch.messages {
            report.seen += 1;

            if message.from_me {
                report.skipped_own += 1;
                continue;
            }

            let text = message.body_text();
            let ctx = HandlerContext {
                session,
                dispatcher: &self.dispatcher,
                message,
                text,
            };

            for route in routes.iter().filter(|r| r.matcher.matches(text)) {
                report.invocations += 1;
                debug!("Message from {} matched {}", message.sender, route.name);

                if let Err(e) = route.handler.handle(&ctx).await {
                    report.failures += 1;
                    warn!(
                        "Handler {} failed for message from {}: {:#}",
                        route.name, message.sender, e
                    );
                }

                if self.policy == DispatchPolicy::FirstMatch {
                    break;
                }
            }
        }

        report
    }
}
