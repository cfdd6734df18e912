use super::checkout_sync::CheckoutSync;
use super::observers::ObserverRegistry;
use crate::domain::checkout::{
    CheckoutOutcome, CheckoutSession, CheckoutStatus, PaymentRequest, PaymentResult,
    PaymentStatus,
};
use crate::domain::observer::{CheckoutEvent, EventContext, ObserverResponse};
use crate::domain::ports::{
    CHECKOUT_NOTICE_CONTEXT, NoticeOptions, NoticeSinkRef, PaymentProcessorRef,
    SnapshotStoreRef, ValidationStoreRef,
};
use crate::error::{Result, SyncError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Drives a checkout submission through validation, payment processing and
/// the after-processing observers.
///
/// Only one cycle runs at a time. Recoverable failures never surface as
/// errors: they become notices, inline validation errors and a return to
/// [`CheckoutStatus::Idle`].
pub struct CheckoutProcessor {
    store: SnapshotStoreRef,
    observers: Arc<ObserverRegistry>,
    payment: PaymentProcessorRef,
    validation: ValidationStoreRef,
    notices: NoticeSinkRef,
    checkout_sync: CheckoutSync,
    generic_error_message: String,
    session: Mutex<CheckoutSession>,
    status_tx: watch::Sender<CheckoutStatus>,
}

impl CheckoutProcessor {
    pub fn new(
        store: SnapshotStoreRef,
        observers: Arc<ObserverRegistry>,
        payment: PaymentProcessorRef,
        validation: ValidationStoreRef,
        notices: NoticeSinkRef,
        checkout_sync: CheckoutSync,
        generic_error_message: impl Into<String>,
    ) -> Self {
        let (status_tx, _) = watch::channel(CheckoutStatus::Idle);
        Self {
            store,
            observers,
            payment,
            validation,
            notices,
            checkout_sync,
            generic_error_message: generic_error_message.into(),
            session: Mutex::new(CheckoutSession::default()),
            status_tx,
        }
    }

    pub fn session(&self) -> CheckoutSession {
        self.session.lock().clone()
    }

    pub fn status(&self) -> CheckoutStatus {
        self.session.lock().status
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CheckoutStatus> {
        self.status_tx.subscribe()
    }

    /// Runs one full submission cycle.
    ///
    /// Fails only with [`SyncError::SubmissionInProgress`] when another cycle
    /// is still running.
    pub async fn submit(&self) -> Result<CheckoutOutcome> {
        {
            let mut session = self.session.lock();
            if session.status.is_busy() {
                return Err(SyncError::SubmissionInProgress);
            }
            session.reset();
            if let Some(order_id) = self.checkout_sync.order_id() {
                session.order_id = Some(order_id);
            }
            session.status = CheckoutStatus::Validating;
        }
        self.publish(CheckoutStatus::Validating);
        let _cycle = CycleGuard(self);

        // A late checkout response must not clobber the state of this cycle.
        self.checkout_sync.abort_in_flight();
        self.notices.clear_error_notices(CHECKOUT_NOTICE_CONTEXT);

        let responses = self
            .observers
            .emit(CheckoutEvent::Validation, &self.event_context())
            .await;
        if !responses.iter().all(ObserverResponse::is_success) {
            self.reject_validation(&responses);
            return Ok(CheckoutOutcome::Failed { retryable: true });
        }

        self.set_status(CheckoutStatus::Processing);
        let result = self.process_payment().await;
        {
            let mut session = self.session.lock();
            session.has_error = result.status.is_error();
            session.redirect_url = result.redirect_url.clone();
            session.payment_result = Some(result);
        }

        self.set_status(CheckoutStatus::AfterProcessing);
        let context = self.event_context();
        let has_error = self.session.lock().has_error;
        if has_error {
            let responses = self
                .observers
                .emit(CheckoutEvent::AfterProcessingWithError, &context)
                .await;
            Ok(self.finish_with_failure(&responses))
        } else {
            let responses = self
                .observers
                .emit(CheckoutEvent::AfterProcessingWithSuccess, &context)
                .await;
            Ok(self.finish_with_success(&responses))
        }
    }

    fn reject_validation(&self, responses: &[ObserverResponse]) {
        for response in responses.iter().filter(|response| !response.is_success()) {
            if let Some(message) = response.message() {
                self.notices.create_error_notice(
                    message,
                    NoticeOptions::context(CHECKOUT_NOTICE_CONTEXT),
                );
            }
            if let Some(errors) = response.validation_errors() {
                self.validation.set_validation_errors(errors.clone());
            }
        }
        self.session.lock().has_error = true;
        info!("Checkout validation rejected");
        self.set_status(CheckoutStatus::Idle);
    }

    async fn process_payment(&self) -> PaymentResult {
        let request = {
            let session = self.session.lock();
            PaymentRequest {
                order_id: session.order_id,
                payment_method: self.store.checkout_draft().payment_method,
                customer: self.store.customer(),
            }
        };
        match self.payment.process(&request).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "Payment processing failed");
                PaymentResult {
                    status: PaymentStatus::Error,
                    redirect_url: None,
                    message: Some(err.to_string()),
                    details: BTreeMap::new(),
                }
            }
        }
    }

    /// The last success is the candidate result, but any fail or error
    /// response turns the whole event into a failure.
    fn finish_with_success(&self, responses: &[ObserverResponse]) -> CheckoutOutcome {
        let mut candidate = None;
        for response in responses {
            match response {
                ObserverResponse::Success { redirect_url } => candidate = Some(redirect_url),
                _ => return self.finish_with_failure(responses),
            }
        }

        let redirect_url = {
            let mut session = self.session.lock();
            if let Some(Some(url)) = candidate {
                session.redirect_url = Some(url.clone());
            }
            session.redirect_url.clone()
        };
        self.set_status(CheckoutStatus::Complete);
        CheckoutOutcome::Completed { redirect_url }
    }

    fn finish_with_failure(&self, responses: &[ObserverResponse]) -> CheckoutOutcome {
        let failures: Vec<&ObserverResponse> = responses
            .iter()
            .filter(|response| !response.is_success())
            .collect();

        let payment_message = self
            .session
            .lock()
            .payment_result
            .as_ref()
            .and_then(|result| result.message.clone())
            .filter(|message| !message.trim().is_empty());
        let message = failures
            .iter()
            .find_map(|response| response.message().map(str::to_string))
            .or(payment_message)
            .unwrap_or_else(|| self.generic_error_message.clone());
        self.notices
            .create_error_notice(&message, NoticeOptions::context(CHECKOUT_NOTICE_CONTEXT));

        for errors in failures.iter().filter_map(|response| response.validation_errors()) {
            self.validation.set_validation_errors(errors.clone());
        }

        let retryable = failures.first().is_none_or(|response| response.is_retryable());
        self.session.lock().has_error = true;
        if retryable {
            self.set_status(CheckoutStatus::Idle);
        } else {
            self.set_status(CheckoutStatus::Complete);
        }
        CheckoutOutcome::Failed { retryable }
    }

    fn event_context(&self) -> EventContext {
        let session = self.session.lock();
        EventContext {
            order_id: session.order_id,
            customer: self.store.customer(),
            payment_method: self.store.checkout_draft().payment_method,
            payment_result: session.payment_result.clone(),
        }
    }

    fn set_status(&self, status: CheckoutStatus) {
        self.session.lock().status = status;
        self.publish(status);
    }

    fn publish(&self, status: CheckoutStatus) {
        info!(?status, "Checkout status changed");
        self.status_tx.send_replace(status);
    }
}

/// Returns a cycle that was dropped mid-flight to [`CheckoutStatus::Idle`].
///
/// Cycles that reached a final status are left alone.
struct CycleGuard<'a>(&'a CheckoutProcessor);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        let interrupted = {
            let mut session = self.0.session.lock();
            let busy = session.status.is_busy();
            if busy {
                session.status = CheckoutStatus::Idle;
            }
            busy
        };
        if interrupted {
            warn!("Checkout submission dropped before finishing");
            self.0.publish(CheckoutStatus::Idle);
        }
    }
}
