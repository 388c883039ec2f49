//! Order placement.
//!
//! [`submit_checkout`] drives the [`CheckoutMachine`] through one submission:
//! validate, build the payment request from the cart, invoke the method's
//! payment function, then clear the cart on success or leave it untouched on
//! failure. The machine is written through to storage after every
//! transition, and any error after the submit moves it to `Failed` so the
//! controls come back.
//!
//! The machine alone cannot stop two concurrent requests that both read it
//! while idle. Callers serialize submissions per visitor with
//! [`SubmissionLocks`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use guoyan_core::cart::CartEvent;
use guoyan_core::checkout::{
    CheckoutBlock, CheckoutEvent, CheckoutMachine, CheckoutState, InvalidTransition,
    ORDER_FAILED_MESSAGE, validate_checkout,
};
use guoyan_core::order::Order;
use guoyan_core::payment::{
    InvalidPaymentResponse, PaymentOutcome, PaymentRequest, PaymentRequestError,
};
use guoyan_core::{AddressId, ExchangeRates, PaymentMethod};
use moka::future::Cache;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower_sessions::Session;
use tower_sessions::session::Id;
use tracing::instrument;

use super::cart::{CartError, CartStorage, CartStore};
use crate::backend::{BackendError, PaymentFunctions};
use crate::models::session_keys;

/// Errors that leave the checkout in an unknown state.
///
/// Payment failures are not errors here; they come back as
/// [`CheckoutOutcome::Failed`].
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// Why a payment function call did not produce an outcome.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Request(#[from] PaymentRequestError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    InvalidResponse(#[from] InvalidPaymentResponse),
}

/// Where the checkout machine is persisted.
pub trait CheckoutStorage: Send + Sync {
    fn load_machine(&self) -> impl Future<Output = Result<CheckoutMachine, CheckoutError>> + Send;

    fn save_machine(
        &self,
        machine: &CheckoutMachine,
    ) -> impl Future<Output = Result<(), CheckoutError>> + Send;
}

impl CheckoutStorage for Session {
    async fn load_machine(&self) -> Result<CheckoutMachine, CheckoutError> {
        let Some(value) = self.get_value(session_keys::CHECKOUT).await? else {
            return Ok(CheckoutMachine::new());
        };

        Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable checkout state");
            CheckoutMachine::new()
        }))
    }

    async fn save_machine(&self, machine: &CheckoutMachine) -> Result<(), CheckoutError> {
        self.insert(session_keys::CHECKOUT, machine).await?;
        // Write through now; the session layer only saves after the response.
        self.save().await?;
        Ok(())
    }
}

/// Idle locks are dropped after this long.
const LOCK_IDLE: Duration = Duration::from_secs(600);

/// One lock per session, held for the length of a submission.
#[derive(Clone)]
pub struct SubmissionLocks {
    locks: Cache<Id, Arc<Mutex<()>>>,
}

impl SubmissionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Cache::builder().time_to_idle(LOCK_IDLE).build(),
        }
    }

    /// Claim the lock for `session`, or `None` while another request holds it.
    pub async fn try_claim(&self, session: Id) -> Option<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .get_with(session, async { Arc::new(Mutex::new(())) })
            .await;
        lock.try_lock_owned().ok()
    }
}

impl Default for SubmissionLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// One press of a payment button.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutRequest<'a> {
    pub method: PaymentMethod,
    /// The signed-in customer's access token.
    pub access_token: Option<&'a str>,
    pub address: Option<AddressId>,
    /// Rates the checkout page displayed.
    pub rates: ExchangeRates,
    pub minimum_units: u32,
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The order was placed and the cart cleared.
    Placed {
        outcome: PaymentOutcome,
        event: CartEvent,
    },
    /// A precondition failed; nothing was sent.
    Blocked(CheckoutBlock),
    /// The payment function failed; the cart is unchanged.
    Failed { message: String },
    /// Another submission from this visitor is still in flight.
    Busy,
}

/// Place an order for the visitor's cart.
///
/// # Errors
///
/// Returns `CheckoutError` only when the storage fails. Validation and
/// payment failures are reported through [`CheckoutOutcome`].
#[instrument(skip(gateway, storage, request), fields(method = %request.method))]
pub async fn submit_checkout<G, S>(
    gateway: &G,
    storage: &S,
    request: CheckoutRequest<'_>,
) -> Result<CheckoutOutcome, CheckoutError>
where
    G: PaymentFunctions,
    S: CartStorage + CheckoutStorage,
{
    let mut machine = storage.load_machine().await?;
    if machine.recover_if_stale(Utc::now()) {
        tracing::warn!("Recovered abandoned checkout submission");
    }
    if machine.is_busy() {
        tracing::info!("Checkout already in flight");
        return Ok(CheckoutOutcome::Busy);
    }
    if matches!(
        machine.state(),
        CheckoutState::Succeeded { .. } | CheckoutState::AwaitingExternalConfirmation { .. }
    ) {
        machine.handle(CheckoutEvent::Reset)?;
    }

    machine.handle(CheckoutEvent::Submit(request.method))?;
    storage.save_machine(&machine).await?;

    let result = place_order(gateway, storage, &mut machine, request).await;
    if result.is_err() && machine.is_busy() {
        release(storage, &mut machine).await;
    }
    result
}

async fn place_order<G, S>(
    gateway: &G,
    storage: &S,
    machine: &mut CheckoutMachine,
    request: CheckoutRequest<'_>,
) -> Result<CheckoutOutcome, CheckoutError>
where
    G: PaymentFunctions,
    S: CartStorage + CheckoutStorage,
{
    let carts = CartStore::new(storage);
    let cart = carts.load().await?;

    let validated = validate_checkout(
        request.access_token.is_some(),
        request.address,
        cart.unit_count(),
        request.minimum_units,
    );
    let (access_token, address) = match (request.access_token, validated) {
        (Some(token), Ok(address)) => (token, address),
        (_, Err(block)) => return block_submission(storage, machine, block).await,
        (None, Ok(_)) => {
            return block_submission(storage, machine, CheckoutBlock::SignInRequired).await;
        }
    };

    machine.handle(CheckoutEvent::Validated)?;
    storage.save_machine(machine).await?;

    let payment = PaymentRequest::for_cart(request.method, address, &cart, &request.rates);
    let placed = match payment {
        Ok(payment) => invoke(gateway, &payment, access_token).await,
        Err(e) => Err(e.into()),
    };

    match placed {
        Ok(outcome) => {
            machine.handle(CheckoutEvent::Accepted(outcome.clone()))?;
            if matches!(
                machine.state(),
                CheckoutState::AwaitingExternalConfirmation { .. }
            ) {
                machine.handle(CheckoutEvent::HandedOff)?;
            }
            storage.save_machine(machine).await?;

            let event = carts.clear().await?;
            tracing::info!(units = cart.unit_count(), "Order placed");
            Ok(CheckoutOutcome::Placed { outcome, event })
        }
        Err(e) => {
            tracing::error!(error = %e, "Payment function failed");
            machine.handle(CheckoutEvent::Rejected)?;
            storage.save_machine(machine).await?;

            Ok(CheckoutOutcome::Failed {
                message: machine
                    .failure_message()
                    .unwrap_or_else(|| ORDER_FAILED_MESSAGE.to_string()),
            })
        }
    }
}

/// Move a machine left busy by an error to `Failed`.
async fn release<S: CheckoutStorage>(storage: &S, machine: &mut CheckoutMachine) {
    if let Err(e) = machine.handle(CheckoutEvent::Rejected) {
        tracing::error!(error = %e, "Could not release checkout");
        return;
    }
    if let Err(e) = storage.save_machine(machine).await {
        tracing::error!(error = %e, "Could not persist released checkout");
    }
}

async fn block_submission<S: CheckoutStorage>(
    storage: &S,
    machine: &mut CheckoutMachine,
    block: CheckoutBlock,
) -> Result<CheckoutOutcome, CheckoutError> {
    tracing::debug!(%block, "Checkout blocked");
    machine.handle(CheckoutEvent::Blocked(block))?;
    storage.save_machine(machine).await?;
    Ok(CheckoutOutcome::Blocked(block))
}

async fn invoke<G: PaymentFunctions>(
    gateway: &G,
    request: &PaymentRequest,
    access_token: &str,
) -> Result<PaymentOutcome, PaymentError> {
    let response = gateway.invoke_payment(request, access_token).await?;
    Ok(response.into_outcome(request.method())?)
}

/// Send a pending order back to its payment provider.
///
/// The request is rebuilt from the stored order (items, address, amount,
/// rate), never from the live cart.
///
/// # Errors
///
/// Returns `PaymentError` if the order cannot be resumed or the function
/// call fails.
#[instrument(skip(gateway, order, access_token), fields(order_id = %order.id))]
pub async fn resume_payment<G: PaymentFunctions>(
    gateway: &G,
    order: &Order,
    access_token: &str,
) -> Result<PaymentOutcome, PaymentError> {
    let request = PaymentRequest::for_order(order)?;
    invoke(gateway, &request, access_token).await
}
