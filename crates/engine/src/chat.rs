//! Negotiation channel between vendors and shopkeepers.

use std::sync::Arc;

use common::{ShopkeeperId, ThreadId, VendorId};
use domain::{Message, NegotiationThread, Party};
use market_store::{MarketStore, StoreError};

use crate::config::{EngineConfig, bounded};
use crate::error::{EngineError, Result};
use crate::feed::MessageFeed;

/// Thread and message operations for the negotiation flow.
///
/// Estimation and invoice messages are appended by the order engine,
/// since they must share a unit of work with order mutation; this
/// service owns the plain chat surface.
#[derive(Clone)]
pub struct NegotiationService {
    store: Arc<dyn MarketStore>,
    feed: MessageFeed,
    config: EngineConfig,
}

impl NegotiationService {
    /// Creates a new negotiation service.
    pub fn new(store: Arc<dyn MarketStore>, feed: MessageFeed, config: EngineConfig) -> Self {
        Self {
            store,
            feed,
            config,
        }
    }

    /// The feed carrying every appended message.
    pub fn feed(&self) -> &MessageFeed {
        &self.feed
    }

    /// Returns the thread for the pair, creating it on first contact.
    #[tracing::instrument(skip(self))]
    pub async fn open_thread(
        &self,
        vendor_id: VendorId,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<NegotiationThread> {
        bounded(self.config.op_timeout, async {
            if let Some(existing) = self.store.thread_for_pair(vendor_id, shopkeeper_id).await? {
                return Ok(existing);
            }

            let thread = NegotiationThread::new(vendor_id, shopkeeper_id);
            let mut tx = self.store.begin().await?;
            match tx.insert_thread(&thread).await {
                Ok(()) => {
                    tx.commit().await?;
                    metrics::counter!("threads_opened_total").increment(1);
                    Ok(thread)
                }
                Err(conflict @ StoreError::Conflict { .. }) => {
                    // Lost the race for first contact; the winner's
                    // thread is the thread.
                    drop(tx);
                    match self.store.thread_for_pair(vendor_id, shopkeeper_id).await? {
                        Some(existing) => Ok(existing),
                        None => Err(conflict.into()),
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Looks up a thread by id.
    pub async fn thread(&self, thread_id: ThreadId) -> Result<NegotiationThread> {
        bounded(self.config.op_timeout, async {
            self.store
                .thread(thread_id)
                .await?
                .ok_or(EngineError::ThreadNotFound(thread_id))
        })
        .await
    }

    /// Appends a plain text message to a thread.
    #[tracing::instrument(skip(self, body))]
    pub async fn send_text(
        &self,
        thread_id: ThreadId,
        sender: Party,
        body: impl Into<String>,
    ) -> Result<Message> {
        let body = body.into();
        bounded(self.config.op_timeout, async {
            let mut tx = self.store.begin().await?;
            let thread = tx
                .thread(thread_id)
                .await?
                .ok_or(EngineError::ThreadNotFound(thread_id))?;
            if !thread.includes(sender) {
                return Err(EngineError::NotAParticipant { thread_id, sender });
            }

            let message = Message::text(thread_id, sender, body)?;
            tx.insert_message(&message).await?;
            tx.commit().await?;

            self.feed.publish(&message);
            metrics::counter!("messages_sent_total").increment(1);
            Ok(message)
        })
        .await
    }

    /// All messages of a thread in append order.
    pub async fn messages(&self, thread_id: ThreadId) -> Result<Vec<Message>> {
        bounded(self.config.op_timeout, async {
            if self.store.thread(thread_id).await?.is_none() {
                return Err(EngineError::ThreadNotFound(thread_id));
            }
            Ok(self.store.messages(thread_id).await?)
        })
        .await
    }

    /// Threads a vendor participates in.
    pub async fn threads_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<NegotiationThread>> {
        bounded(self.config.op_timeout, async {
            Ok(self.store.threads_for_vendor(vendor_id).await?)
        })
        .await
    }

    /// Threads a shopkeeper participates in.
    pub async fn threads_for_shopkeeper(
        &self,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<Vec<NegotiationThread>> {
        bounded(self.config.op_timeout, async {
            Ok(self.store.threads_for_shopkeeper(shopkeeper_id).await?)
        })
        .await
    }
}
