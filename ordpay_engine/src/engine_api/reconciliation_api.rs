use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db::traits::{
        ConfirmPayment,
        ConfirmPaymentOutcome,
        PaymentAttempt,
        PaymentGatewayDatabase,
        PromotionClaim,
        RecordRefund,
        RefundOutcome,
        StorageError,
        WebhookRecordResult,
    },
    db_types::{
        Incident,
        IncidentKind,
        Money,
        NewIncident,
        NewPaymentTransaction,
        NewWebhookEvent,
        Order,
        OrderState,
        PaymentReference,
        PaymentStatus,
        RateLimitKey,
        TransactionKind,
        TransactionStatus,
    },
    engine_api::{
        errors::ReconciliationError,
        rate_limiter::{RateLimitDecision, RateLimiter},
        reconciliation_objects::{
            ReconciliationConfig,
            ReconciliationOutcome,
            VerificationResult,
            VerificationStatus,
            WebhookAck,
        },
    },
    events::{EventProducers, IncidentEvent, OrderPaidEvent},
    helpers::retry_with_backoff,
    pricing::reprice_persisted,
    provider::{ChargeDetails, ChargeStatus, PaymentProvider, ProviderError, ProviderEvent, RefundDetails},
};

/// How often a refund is re-validated when the order changes underneath it before giving up with a conflict.
const MAX_REFUND_ATTEMPTS: usize = 3;

/// `ReconciliationApi` matches what the payment provider reports against the orders we priced.
///
/// Reports arrive either as signed webhooks ([`Self::handle_webhook`]) or as the result of asking the provider
/// directly ([`Self::verify_payment`]). Both paths end in the same place: the amount the provider collected is compared
/// with the total recomputed from the stored order lines, and only an exact match moves the order to `paid`. The
/// transition is a compare-and-swap, so a webhook and a verification racing on the same order confirm it once.
pub struct ReconciliationApi<B, P> {
    db: B,
    provider: P,
    producers: EventProducers,
    rate_limiter: RateLimiter<B>,
    config: ReconciliationConfig,
}

impl<B, P> Debug for ReconciliationApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B: Clone, P> ReconciliationApi<B, P> {
    pub fn new(db: B, provider: P, producers: EventProducers, config: ReconciliationConfig) -> Self {
        let rate_limiter = RateLimiter::new(db.clone());
        Self { db, provider, producers, rate_limiter, config }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<B, P> ReconciliationApi<B, P>
where
    B: PaymentGatewayDatabase,
    P: PaymentProvider,
{
    /// Processes a webhook delivery.
    ///
    /// Unauthenticated and unreadable payloads are recorded as incidents and acknowledged as [`WebhookAck::Ignored`],
    /// so the sender learns nothing from the response. An error is only returned when processing could not complete
    /// and nothing was committed, in which case the provider should deliver the event again.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, ReconciliationError> {
        let authentic = signature.map(|s| self.provider.verify_signature(payload, s)).unwrap_or(false);
        if !authentic {
            let problem = if signature.is_some() { "an invalid" } else { "no" };
            warn!(
                target: "security_incident",
                "💰️ Rejected a {}-byte {} webhook with {problem} signature",
                payload.len(),
                self.provider.name()
            );
            let incident = NewIncident::new(
                IncidentKind::InvalidSignature,
                format!("{} webhook of {} bytes with {problem} signature", self.provider.name(), payload.len()),
            );
            if let Err(e) = self.raise_incident(incident).await {
                error!("💰️ Could not record the invalid signature incident. {e}");
            }
            return Ok(WebhookAck::Ignored);
        }

        let parsed = match self.provider.parse_event(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(target: "security_incident", "💰️ Could not decode an authenticated webhook. {e}");
                if let Err(e) = self.raise_incident(NewIncident::new(IncidentKind::MalformedPayload, e.to_string())).await
                {
                    error!("💰️ Could not record the malformed payload incident. {e}");
                }
                return Ok(WebhookAck::Ignored);
            },
        };

        let event_id = parsed.event_id.as_str();
        let ledger_entry = NewWebhookEvent {
            event_id: parsed.event_id.clone(),
            provider: self.provider.name().to_string(),
            event_type: parsed.event_type.clone(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            signature: signature.map(String::from),
        };
        match self.db.record_webhook_event(ledger_entry).await? {
            WebhookRecordResult::AlreadyProcessed => {
                debug!("💰️ Webhook {event_id} has already been processed");
                return Ok(WebhookAck::Duplicate);
            },
            WebhookRecordResult::Unprocessed => info!("💰️ Resuming an earlier, unfinished delivery of {event_id}"),
            WebhookRecordResult::New => trace!("💰️ Webhook {event_id} recorded"),
        }

        let outcome = match parsed.event {
            ProviderEvent::ChargeSucceeded(charge) => self.apply_charge(charge, Some(event_id)).await?,
            ProviderEvent::ChargeFailed(charge) => self.record_failed_charge(charge, Some(event_id)).await?,
            ProviderEvent::RefundProcessed(refund) => self.apply_refund(refund, event_id).await?,
            ProviderEvent::Unsupported => self.finish(Some(event_id), ReconciliationOutcome::Unsupported).await?,
        };
        info!("💰️ Webhook {event_id} processed: {}", outcome.as_str());
        Ok(WebhookAck::Processed(outcome))
    }

    /// [`Self::verify_payment`], behind the `verify_payment` rate limit for `requester`.
    pub async fn verify_payment_for(
        &self,
        requester: &RateLimitKey,
        reference: &PaymentReference,
    ) -> Result<VerificationResult, ReconciliationError> {
        let decision = self.rate_limiter.check_and_increment(requester, self.config.verify_limit).await?;
        if let RateLimitDecision::Denied { retry_after, .. } = decision {
            return Err(ReconciliationError::RateLimited { retry_after });
        }
        self.verify_payment(reference).await
    }

    /// Asks the provider for the state of the charge against `reference` and applies the answer.
    ///
    /// Each provider call is bounded by the configured timeout, and transient failures are retried with backoff.
    /// If the provider still cannot be reached, a retryable error is returned and nothing changes.
    pub async fn verify_payment(
        &self,
        reference: &PaymentReference,
    ) -> Result<VerificationResult, ReconciliationError> {
        let order = self
            .db
            .fetch_order_by_payment_reference(reference)
            .await?
            .ok_or_else(|| ReconciliationError::OrderNotFound(reference.to_string()))?;
        if is_paid(&order) {
            return Ok(VerificationResult::new(VerificationStatus::Paid, order));
        }

        let provider = &self.provider;
        let timeout = self.config.provider_timeout;
        let status = retry_with_backoff(self.config.retry, ProviderError::is_transient, move || async move {
            match tokio::time::timeout(timeout, provider.verify_transaction(reference)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            }
        })
        .await
        .map_err(|e| {
            warn!("💰️ Payment {reference} could not be verified. {e}");
            e
        })?;

        match status {
            ChargeStatus::Pending => {
                let status = match order.payment_status {
                    PaymentStatus::Failed => VerificationStatus::Failed,
                    _ => VerificationStatus::Pending,
                };
                debug!("💰️ Payment {reference} is still pending at the provider");
                Ok(VerificationResult::new(status, order))
            },
            ChargeStatus::Failed(charge) => {
                check_reference(&charge, reference)?;
                let outcome = self.record_failed_charge(charge, None).await?;
                Ok(verification_for(outcome, order))
            },
            ChargeStatus::Succeeded(charge) => {
                check_reference(&charge, reference)?;
                let outcome = self.apply_charge(charge, None).await?;
                Ok(verification_for(outcome, order))
            },
        }
    }

    async fn apply_charge(
        &self,
        charge: ChargeDetails,
        event_id: Option<&str>,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let Some(mut order) = self.db.fetch_order_by_payment_reference(&charge.reference).await? else {
            return self.unknown_reference(charge.reference.as_str(), &charge.provider_reference, event_id).await;
        };
        let mut retried = false;
        loop {
            if !order.is_awaiting_payment() {
                return self.charge_on_settled_order(order, &charge, event_id).await;
            }
            let items = self.db.fetch_order_items(order.id).await?;
            let expected = match reprice_persisted(&order, &items) {
                Ok(total) => total,
                Err(e) => {
                    error!("💰️ Payment for order {} cannot be applied. {e}", order.order_number);
                    let outcome = ReconciliationOutcome::IntegrityViolation(order.clone());
                    let incident = NewIncident::new(IncidentKind::PriceIntegrityViolation, e.to_string());
                    return self.flag_payment(&order, &charge, event_id, incident, outcome).await;
                },
            };
            if charge.amount != expected || !charge.currency.eq_ignore_ascii_case(&order.currency) {
                let details = format!(
                    "expected {expected} {}, the provider collected {} {}",
                    order.currency, charge.amount, charge.currency
                );
                warn!(target: "security_incident", "💰️ Amount mismatch on order {}: {details}", order.order_number);
                let outcome =
                    ReconciliationOutcome::AmountMismatch { order: order.clone(), expected, received: charge.amount };
                let incident = NewIncident::new(IncidentKind::AmountMismatch, details);
                return self.flag_payment(&order, &charge, event_id, incident, outcome).await;
            }

            let confirmation = self.confirmation_for(&order, &charge, event_id).await?;
            let db = &self.db;
            let result =
                retry_with_backoff(self.config.retry, StorageError::is_transient, move || {
                    db.confirm_payment(confirmation.clone())
                })
                .await?;
            match result {
                ConfirmPaymentOutcome::Confirmed { order, transaction } => {
                    info!(
                        "💰️ Order {} paid: {} {} (provider ref {})",
                        order.order_number, transaction.amount, transaction.currency, transaction.provider_reference
                    );
                    self.producers.publish_order_paid(OrderPaidEvent::new(order.clone(), transaction)).await;
                    return Ok(ReconciliationOutcome::Confirmed(order));
                },
                ConfirmPaymentOutcome::PromotionCapExceeded(promotion_id) => {
                    warn!(
                        "💰️ Promotion #{promotion_id} is exhausted. The payment for order {} is held for review",
                        order.order_number
                    );
                    let incident = NewIncident::new(
                        IncidentKind::PromotionCapExceeded,
                        format!("promotion #{promotion_id} reached its usage cap before the payment was confirmed"),
                    );
                    let outcome = ReconciliationOutcome::PromotionCapExceeded(order.clone());
                    return self.flag_payment(&order, &charge, event_id, incident, outcome).await;
                },
                ConfirmPaymentOutcome::StateConflict(current) => {
                    let Some(current) = current.filter(|_| !retried) else {
                        return Err(ReconciliationError::Conflict(order.order_number.to_string()));
                    };
                    debug!("💰️ Order {} changed to {} under us. Re-reading", current.order_number, current.state());
                    retried = true;
                    order = current;
                },
            }
        }
    }

    /// A successful charge for an order that is no longer awaiting payment.
    async fn charge_on_settled_order(
        &self,
        order: Order,
        charge: &ChargeDetails,
        event_id: Option<&str>,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        if is_paid(&order) {
            let existing = self.db.fetch_transaction(&charge.provider_reference).await?;
            let same_charge =
                existing.map(|tx| tx.order_id == order.id && tx.status == TransactionStatus::Success).unwrap_or(false);
            if same_charge {
                debug!("💰️ Order {} is already paid by charge {}", order.order_number, charge.provider_reference);
                return self.finish(event_id, ReconciliationOutcome::AlreadyPaid(order)).await;
            }
        }
        let details = format!(
            "charge {} of {} {} arrived while the order is {}",
            charge.provider_reference,
            charge.amount,
            charge.currency,
            order.state()
        );
        warn!(target: "security_incident", "💰️ Payment on closed order {}: {details}", order.order_number);
        let incident = NewIncident::new(IncidentKind::PaymentOnClosedOrder, details);
        let outcome = ReconciliationOutcome::PaymentOnClosedOrder(order.clone());
        self.flag_payment(&order, charge, event_id, incident, outcome).await
    }

    async fn record_failed_charge(
        &self,
        charge: ChargeDetails,
        event_id: Option<&str>,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let Some(order) = self.db.fetch_order_by_payment_reference(&charge.reference).await? else {
            return self.unknown_reference(charge.reference.as_str(), &charge.provider_reference, event_id).await;
        };
        let outcome = ReconciliationOutcome::PaymentFailed(order.clone());
        let attempt = PaymentAttempt {
            transaction: charge_transaction(order.id, &charge, TransactionStatus::Failed),
            incident: None,
            webhook: event_id.map(|id| (id.to_string(), outcome.as_str().to_string())),
        };
        self.db.record_payment_attempt(attempt).await?;
        info!(
            "💰️ Charge {} for order {} failed. The order stays open for another attempt",
            charge.provider_reference, order.order_number
        );
        Ok(outcome)
    }

    async fn apply_refund(
        &self,
        refund: RefundDetails,
        event_id: &str,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let Some(mut order) = self.db.fetch_order_by_payment_reference(&refund.reference).await? else {
            return self.unknown_reference(refund.reference.as_str(), &refund.provider_reference, Some(event_id)).await;
        };
        let mut attempts = 0;
        loop {
            attempts += 1;
            let transactions = self.db.fetch_transactions_for_order(order.id).await?;
            if transactions.iter().any(|t| t.provider_reference == refund.provider_reference) {
                return self.finish(Some(event_id), ReconciliationOutcome::RefundDuplicate).await;
            }
            let refunded_before = Money::checked_sum(
                transactions
                    .iter()
                    .filter(|t| t.kind == TransactionKind::Refund && t.status == TransactionStatus::Refunded)
                    .map(|t| t.amount),
            );
            let refunded = refunded_before.and_then(|r| r.checked_add(refund.amount));
            let to = if refunded == Some(order.total_amount) {
                OrderState::REFUNDED
            } else {
                OrderState::PARTIALLY_REFUNDED
            };
            let acceptable = refund.amount.is_positive() &&
                refunded.is_some_and(|r| r <= order.total_amount) &&
                refund.currency.eq_ignore_ascii_case(&order.currency) &&
                order.state().can_transition_to(&to);
            if !acceptable {
                let previously =
                    refunded_before.map_or_else(|| "an unrepresentable amount".to_string(), |m| m.to_string());
                let details = format!(
                    "refund {} of {} {} (previously refunded {previously}) cannot apply to a {} {} order in state {}",
                    refund.provider_reference,
                    refund.amount,
                    refund.currency,
                    order.total_amount,
                    order.currency,
                    order.state()
                );
                warn!(target: "security_incident", "💰️ Refund mismatch on order {}: {details}", order.order_number);
                let incident = NewIncident::new(IncidentKind::RefundMismatch, details)
                    .for_order(order.id)
                    .with_reference(refund.reference.as_str());
                self.raise_incident(incident).await?;
                return self.finish(Some(event_id), ReconciliationOutcome::RefundRejected(order)).await;
            }
            let record = RecordRefund {
                order_id: order.id,
                from: order.state(),
                to,
                expected_version: order.version,
                transaction: NewPaymentTransaction {
                    order_id: order.id,
                    provider_reference: refund.provider_reference.clone(),
                    kind: TransactionKind::Refund,
                    amount: refund.amount,
                    currency: refund.currency.clone(),
                    status: TransactionStatus::Refunded,
                    channel: None,
                    provider_response: Some(refund.raw.clone()),
                    settled_at: Some(Utc::now()),
                },
                webhook: Some((event_id.to_string(), "refunded".to_string())),
            };
            match self.db.apply_refund(record).await? {
                RefundOutcome::Applied(order) => {
                    info!(
                        "💰️ Refund of {} applied to order {}. Now {}",
                        refund.amount,
                        order.order_number,
                        order.state()
                    );
                    return Ok(ReconciliationOutcome::Refunded(order));
                },
                RefundOutcome::AlreadyRecorded => {
                    return self.finish(Some(event_id), ReconciliationOutcome::RefundDuplicate).await;
                },
                RefundOutcome::StateConflict(current) => {
                    let Some(current) = current.filter(|_| attempts < MAX_REFUND_ATTEMPTS) else {
                        return Err(ReconciliationError::Conflict(order.order_number.to_string()));
                    };
                    debug!(
                        "💰️ Order {} changed while refund {} was being applied. Re-checking against version {}",
                        current.order_number, refund.provider_reference, current.version
                    );
                    order = current;
                },
            }
        }
    }

    async fn unknown_reference(
        &self,
        reference: &str,
        provider_reference: &str,
        event_id: Option<&str>,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        warn!(
            target: "security_incident",
            "💰️ Provider reported {provider_reference} against payment reference {reference}, which matches no order"
        );
        let incident = NewIncident::new(
            IncidentKind::OrderNotFound,
            format!("provider transaction {provider_reference} has no matching order"),
        )
        .with_reference(reference);
        self.raise_incident(incident).await?;
        self.finish(event_id, ReconciliationOutcome::OrderNotFound).await
    }

    async fn confirmation_for(
        &self,
        order: &Order,
        charge: &ChargeDetails,
        event_id: Option<&str>,
    ) -> Result<ConfirmPayment, ReconciliationError> {
        let promotion = match order.promotion_id {
            Some(promotion_id) => {
                let per_customer_limit =
                    self.db.fetch_promotion(promotion_id).await?.and_then(|p| p.per_customer_limit);
                let customer_ref =
                    order.customer().map(|c| c.usage_key()).unwrap_or_else(|| format!("order:{}", order.id));
                Some(PromotionClaim {
                    promotion_id,
                    customer_ref,
                    discount_amount: order.promotion_discount,
                    per_customer_limit,
                })
            },
            None => None,
        };
        Ok(ConfirmPayment {
            order_id: order.id,
            transaction: charge_transaction(order.id, charge, TransactionStatus::Success),
            promotion,
            webhook: event_id.map(|id| (id.to_string(), "confirmed".to_string())),
        })
    }

    /// Records the charge for manual review, together with the incident that explains why. The order is untouched.
    async fn flag_payment(
        &self,
        order: &Order,
        charge: &ChargeDetails,
        event_id: Option<&str>,
        incident: NewIncident,
        outcome: ReconciliationOutcome,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let attempt = PaymentAttempt {
            transaction: charge_transaction(order.id, charge, TransactionStatus::Flagged),
            incident: Some(incident.for_order(order.id).with_reference(charge.reference.as_str())),
            webhook: event_id.map(|id| (id.to_string(), outcome.as_str().to_string())),
        };
        let (_, incident) = self.db.record_payment_attempt(attempt).await?;
        match incident {
            Some(incident) => self.producers.publish_incident(IncidentEvent::new(incident)),
            None => debug!("💰️ Charge {} was already flagged", charge.provider_reference),
        }
        Ok(outcome)
    }

    async fn raise_incident(&self, incident: NewIncident) -> Result<Incident, StorageError> {
        let incident = self.db.record_incident(incident).await?;
        self.producers.publish_incident(IncidentEvent::new(incident.clone()));
        Ok(incident)
    }

    async fn finish(
        &self,
        event_id: Option<&str>,
        outcome: ReconciliationOutcome,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        if let Some(id) = event_id {
            self.db.mark_webhook_processed(id, outcome.as_str()).await?;
        }
        Ok(outcome)
    }
}

fn is_paid(order: &Order) -> bool {
    matches!(order.payment_status, PaymentStatus::Paid | PaymentStatus::PartiallyRefunded | PaymentStatus::Refunded)
}

fn check_reference(charge: &ChargeDetails, reference: &PaymentReference) -> Result<(), ProviderError> {
    if charge.reference == *reference {
        Ok(())
    } else {
        Err(ProviderError::MalformedPayload(format!(
            "asked about {reference}, the provider answered about {}",
            charge.reference
        )))
    }
}

fn charge_transaction(order_id: i64, charge: &ChargeDetails, status: TransactionStatus) -> NewPaymentTransaction {
    let settled_at = match status {
        TransactionStatus::Success => Some(charge.paid_at.unwrap_or_else(Utc::now)),
        _ => None,
    };
    NewPaymentTransaction {
        order_id,
        provider_reference: charge.provider_reference.clone(),
        kind: TransactionKind::Charge,
        amount: charge.amount,
        currency: charge.currency.clone(),
        status,
        channel: charge.channel.clone(),
        provider_response: Some(charge.raw.clone()),
        settled_at,
    }
}

fn verification_for(outcome: ReconciliationOutcome, order: Order) -> VerificationResult {
    use ReconciliationOutcome::*;
    use VerificationStatus as S;
    match outcome {
        Confirmed(o) | AlreadyPaid(o) | Refunded(o) | RefundRejected(o) => VerificationResult::new(S::Paid, o),
        PaymentFailed(o) => VerificationResult::new(S::Failed, o),
        AmountMismatch { order: o, .. } | PaymentOnClosedOrder(o) | PromotionCapExceeded(o) | IntegrityViolation(o) => {
            VerificationResult::new(S::Flagged, o)
        },
        OrderNotFound | RefundDuplicate | Unsupported => VerificationResult::new(S::Flagged, order),
    }
}
