//! Mongo persistence for orders and payment mirrors.
//!
//! Settlement is the one multi-document write in the system and runs inside
//! a session transaction: the payment mirror and the order must change
//! together or not at all.

use crate::models::{Order, OrderPaymentStatus, OrderStatus, Payment, PaymentStatus};
use anyhow::{bail, Result};
use mongodb::bson::{doc, to_bson, DateTime, Document};
use mongodb::options::{FindOptions, IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use uuid::Uuid;

/// Terminal state a webhook event maps onto the payment/order pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettlementOutcome {
    Succeeded,
    Failed,
}

/// Result of applying a settlement event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettlementResult {
    Applied,
    /// The pair already left the settleable states (settled earlier or
    /// refunded); a redelivered event is acknowledged without writes.
    AlreadySettled,
    /// No payment mirror references this intent; nothing to reconcile.
    UnknownIntent,
}

#[derive(Clone)]
pub struct MarketplaceRepository {
    /// Sessions for multi-document transactions are opened on the client.
    client: Client,
    orders: Collection<Order>,
    payments: Collection<Payment>,
}

impl MarketplaceRepository {
    pub fn new(client: &Client, db: &Database) -> Self {
        Self {
            client: client.clone(),
            orders: db.collection("orders"),
            payments: db.collection("payments"),
        }
    }

    /// Initialize database indexes.
    pub async fn init_indexes(&self) -> Result<()> {
        // At most one payment mirror per order.
        let unique_order_index = IndexModel::builder()
            .keys(doc! { "order_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_order_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        // Webhook reconciliation looks payments up by processor intent id.
        let intent_index = IndexModel::builder()
            .keys(doc! { "intent_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_intent_idx".to_string())
                    .build(),
            )
            .build();

        self.payments
            .create_indexes([unique_order_index, intent_index], None)
            .await?;

        let buyer_index = IndexModel::builder()
            .keys(doc! { "buyer_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("order_buyer_idx".to_string())
                    .build(),
            )
            .build();

        let status_index = IndexModel::builder()
            .keys(doc! { "status": 1 })
            .options(
                IndexOptions::builder()
                    .name("order_status_idx".to_string())
                    .build(),
            )
            .build();

        self.orders
            .create_indexes([buyer_index, status_index], None)
            .await?;

        tracing::info!("Marketplace indexes initialized");
        Ok(())
    }

    pub async fn create_order(&self, order: Order) -> Result<()> {
        self.orders.insert_one(order, None).await?;
        Ok(())
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let filter = doc! { "_id": id.to_string() };
        let order = self.orders.find_one(filter, None).await?;
        Ok(order)
    }

    pub async fn update_fulfillment_status(&self, id: Uuid, status: OrderStatus) -> Result<()> {
        let filter = doc! { "_id": id.to_string() };
        let update = doc! { "$set": { "status": to_bson(&status)? } };
        self.orders.update_one(filter, update, None).await?;
        Ok(())
    }

    /// List a buyer's orders, newest first, with total count.
    pub async fn list_orders_for_buyer(
        &self,
        buyer_id: &str,
        limit: i64,
        offset: u64,
    ) -> Result<(Vec<Order>, i64)> {
        let filter = doc! { "buyer_id": buyer_id };
        self.find_orders(filter, limit, offset).await
    }

    /// List orders across all buyers with an optional fulfillment-status
    /// filter. Staff-only read path.
    pub async fn list_orders(
        &self,
        status_filter: Option<OrderStatus>,
        limit: i64,
        offset: u64,
    ) -> Result<(Vec<Order>, i64)> {
        let mut filter = Document::new();
        if let Some(status) = status_filter {
            filter.insert("status", to_bson(&status)?);
        }
        self.find_orders(filter, limit, offset).await
    }

    async fn find_orders(
        &self,
        filter: Document,
        limit: i64,
        offset: u64,
    ) -> Result<(Vec<Order>, i64)> {
        use futures::TryStreamExt;

        let total_count = self.orders.count_documents(filter.clone(), None).await? as i64;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(offset)
            .limit(limit)
            .build();

        let cursor = self.orders.find(filter, Some(options)).await?;
        let orders: Vec<Order> = cursor.try_collect().await?;

        Ok((orders, total_count))
    }

    pub async fn find_payment_by_order(&self, order_id: Uuid) -> Result<Option<Payment>> {
        let filter = doc! { "order_id": order_id.to_string() };
        let payment = self.payments.find_one(filter, None).await?;
        Ok(payment)
    }

    /// Record a freshly created intent on the order and its payment
    /// mirror in one transaction.
    ///
    /// The order write is guarded on `payment_status != paid`: if a
    /// webhook settles the order between the handler's paid-check and
    /// this write, nothing changes and false is returned. The mirror is
    /// keyed by `order_id` under its unique index, so a retried intent
    /// creation refreshes the existing row instead of inserting a second
    /// one, and a fresh intent resets an earlier failure to pending.
    pub async fn record_intent(&self, payment: &Payment) -> Result<bool> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let order_updated = self
            .orders
            .update_one_with_session(
                doc! {
                    "_id": payment.order_id.to_string(),
                    "payment_status": { "$ne": to_bson(&OrderPaymentStatus::Paid)? },
                },
                doc! {
                    "$set": {
                        "payment_intent_id": &payment.intent_id,
                        "payment_status": to_bson(&OrderPaymentStatus::Pending)?,
                    }
                },
                None,
                &mut session,
            )
            .await?;

        if order_updated.matched_count == 0 {
            session.abort_transaction().await.ok();
            return Ok(false);
        }

        let update = doc! {
            "$set": {
                "user_id": &payment.user_id,
                "amount": payment.amount,
                "currency": &payment.currency,
                "status": to_bson(&payment.status)?,
                "intent_id": &payment.intent_id,
                "method": &payment.method,
                "updated_at": payment.updated_at,
            },
            "$setOnInsert": {
                "_id": payment.id.to_string(),
                "created_at": payment.created_at,
            }
        };
        let options = UpdateOptions::builder().upsert(true).build();
        self.payments
            .update_one_with_session(
                doc! { "order_id": payment.order_id.to_string() },
                update,
                options,
                &mut session,
            )
            .await?;

        session.commit_transaction().await?;
        Ok(true)
    }

    /// Apply a verified settlement event to the payment/order pair.
    ///
    /// Both writes happen inside one transaction; any failure aborts and
    /// leaves neither visible. The updates are `$set`s keyed by intent id
    /// and guarded to the still-settleable states (pending or failed), so
    /// a redelivered event converges without touching a refunded pair.
    pub async fn settle_intent(
        &self,
        intent_id: &str,
        outcome: SettlementOutcome,
    ) -> Result<SettlementResult> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let payment = self
            .payments
            .find_one_with_session(doc! { "intent_id": intent_id }, None, &mut session)
            .await?;

        let Some(payment) = payment else {
            session.abort_transaction().await.ok();
            return Ok(SettlementResult::UnknownIntent);
        };

        let result = self
            .apply_settlement(&payment, outcome, &mut session)
            .await;

        match result {
            Ok(true) => {
                session.commit_transaction().await?;
                Ok(SettlementResult::Applied)
            }
            Ok(false) => {
                session.abort_transaction().await.ok();
                Ok(SettlementResult::AlreadySettled)
            }
            Err(e) => {
                session.abort_transaction().await.ok();
                Err(e)
            }
        }
    }

    async fn apply_settlement(
        &self,
        payment: &Payment,
        outcome: SettlementOutcome,
        session: &mut mongodb::ClientSession,
    ) -> Result<bool> {
        let now = DateTime::now();
        let (payment_status, order_payment_status) = match outcome {
            SettlementOutcome::Succeeded => (PaymentStatus::Succeeded, OrderPaymentStatus::Paid),
            SettlementOutcome::Failed => (PaymentStatus::Failed, OrderPaymentStatus::Failed),
        };

        let settleable = to_bson(&[PaymentStatus::Pending, PaymentStatus::Failed])?;
        let payment_updated = self
            .payments
            .update_one_with_session(
                doc! {
                    "_id": payment.id.to_string(),
                    "status": { "$in": settleable },
                },
                doc! {
                    "$set": {
                        "status": to_bson(&payment_status)?,
                        "updated_at": now,
                    }
                },
                None,
                session,
            )
            .await?;

        // Pair already succeeded or was refunded; a late redelivery must
        // not drag it back.
        if payment_updated.matched_count == 0 {
            return Ok(false);
        }

        let mut order_set = doc! { "payment_status": to_bson(&order_payment_status)? };
        if outcome == SettlementOutcome::Succeeded {
            order_set.insert("paid_at", now);
        }

        let order_settleable =
            to_bson(&[OrderPaymentStatus::Pending, OrderPaymentStatus::Failed])?;
        let updated = self
            .orders
            .update_one_with_session(
                doc! {
                    "_id": payment.order_id.to_string(),
                    "payment_status": { "$in": order_settleable },
                },
                doc! { "$set": order_set },
                None,
                session,
            )
            .await?;

        // Order gone (e.g. deleted concurrently by an admin): abort so the
        // payment write rolls back too.
        if updated.matched_count == 0 {
            bail!(
                "order {} missing or not settleable while settling intent {}",
                payment.order_id,
                payment.intent_id
            );
        }

        Ok(true)
    }

    /// Admin refund flow: flip a settled payment/order pair to refunded.
    ///
    /// Returns false when the pair is not in the paid state. Status filters
    /// on both updates make a concurrent or repeated refund a no-op.
    pub async fn refund_order(&self, order_id: Uuid) -> Result<bool> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let now = DateTime::now();

        let payment_updated = self
            .payments
            .update_one_with_session(
                doc! {
                    "order_id": order_id.to_string(),
                    "status": to_bson(&PaymentStatus::Succeeded)?,
                },
                doc! {
                    "$set": {
                        "status": to_bson(&PaymentStatus::Refunded)?,
                        "updated_at": now,
                    }
                },
                None,
                &mut session,
            )
            .await?;

        if payment_updated.matched_count == 0 {
            session.abort_transaction().await.ok();
            return Ok(false);
        }

        let order_updated = self
            .orders
            .update_one_with_session(
                doc! {
                    "_id": order_id.to_string(),
                    "payment_status": to_bson(&OrderPaymentStatus::Paid)?,
                },
                doc! {
                    "$set": { "payment_status": to_bson(&OrderPaymentStatus::Refunded)? }
                },
                None,
                &mut session,
            )
            .await?;

        if order_updated.matched_count == 0 {
            session.abort_transaction().await.ok();
            return Ok(false);
        }

        session.commit_transaction().await?;
        Ok(true)
    }
}
