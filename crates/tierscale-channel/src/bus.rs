//! Named-endpoint message bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, trace};

use tierscale_core::{Envelope, OutboundMessage};

use crate::error::{ChannelError, ChannelResult};

type Endpoints = HashMap<String, mpsc::UnboundedSender<Envelope>>;

/// Shared registry of endpoints. Cheap to clone.
#[derive(Clone, Default)]
pub struct MessageBus {
    endpoints: Arc<RwLock<Endpoints>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint and return its mailbox.
    pub async fn register(&self, name: &str) -> ChannelResult<Mailbox> {
        let mut endpoints = self.endpoints.write().await;
        if endpoints.contains_key(name) {
            return Err(ChannelError::AlreadyRegistered(name.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        endpoints.insert(name.to_string(), tx);
        debug!(endpoint = %name, "endpoint registered");
        Ok(Mailbox {
            name: name.to_string(),
            rx,
        })
    }

    /// Remove an endpoint. Later sends to it fail with `UnknownEndpoint`.
    pub async fn unregister(&self, name: &str) {
        if self.endpoints.write().await.remove(name).is_some() {
            debug!(endpoint = %name, "endpoint unregistered");
        }
    }

    /// A sender that stamps outgoing envelopes with `from`.
    pub fn sender(&self, from: &str) -> BusSender {
        BusSender {
            from: from.to_string(),
            bus: self.clone(),
        }
    }

    /// Registered endpoint names, sorted.
    pub async fn endpoints(&self) -> Vec<String> {
        let mut names: Vec<String> = self.endpoints.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn deliver(&self, envelope: Envelope) -> ChannelResult<()> {
        let endpoints = self.endpoints.read().await;
        let tx = endpoints
            .get(&envelope.to)
            .ok_or_else(|| ChannelError::UnknownEndpoint(envelope.to.clone()))?;
        let to = envelope.to.clone();
        tx.send(envelope).map_err(|_| ChannelError::Closed(to))
    }
}

/// Sending half bound to one endpoint name.
#[derive(Clone)]
pub struct BusSender {
    from: String,
    bus: MessageBus,
}

impl BusSender {
    pub fn name(&self) -> &str {
        &self.from
    }

    pub async fn send(&self, message: OutboundMessage) -> ChannelResult<()> {
        trace!(from = %self.from, to = %message.to, body = %message.body, "sending");
        self.bus
            .deliver(Envelope {
                from: self.from.clone(),
                to: message.to,
                instance_id: message.instance_id,
                cycle: message.cycle,
                body: message.body,
            })
            .await
    }
}

/// Outcome of a receive that can be interrupted by shutdown.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Message(Envelope),
    TimedOut,
    Shutdown,
}

/// Receiving half of an endpoint.
pub struct Mailbox {
    name: String,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Mailbox {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait up to `timeout` for the next message.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> ChannelResult<Envelope> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(envelope)) => Ok(envelope),
            Ok(None) => Err(ChannelError::Closed(self.name.clone())),
            Err(_) => Err(ChannelError::ReceiveTimeout(timeout)),
        }
    }

    /// Take a message that has already arrived, without waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for a message, giving up early on shutdown.
    ///
    /// A closed mailbox is reported as `Shutdown`: with every sender gone
    /// there is nothing left to wait for.
    pub async fn recv_or_shutdown(
        &mut self,
        timeout: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Delivery {
        if *shutdown.borrow() {
            return Delivery::Shutdown;
        }
        tokio::select! {
            result = self.recv_timeout(timeout) => match result {
                Ok(envelope) => Delivery::Message(envelope),
                Err(ChannelError::ReceiveTimeout(_)) => Delivery::TimedOut,
                Err(_) => Delivery::Shutdown,
            },
            _ = shutdown.changed() => Delivery::Shutdown,
        }
    }
}
