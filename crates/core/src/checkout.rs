//! Checkout validation and the checkout state machine.
//!
//! A submission moves through explicit states instead of a set of loading
//! flags:
//!
//! ```text
//! Idle ──Submit──▶ Validating ──Validated──▶ Submitting ──Accepted──▶ AwaitingExternalConfirmation ──HandedOff──▶ Succeeded
//!   ▲                  │                         │  └──────Accepted (out of band)──────────────────────────────────▶ Succeeded
//!   │           Blocked, Rejected             Rejected
//!   │                  ▼                         ▼
//!   └────Reset──── Failed ◀──────────────────────┘
//! ```
//!
//! While the machine is [`busy`](CheckoutMachine::is_busy) the payment
//! controls are disabled, which is what prevents a double submission.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payment::PaymentOutcome;
use crate::types::{AddressId, PaymentMethod};

/// Minimum number of units per order.
pub const DEFAULT_MIN_UNITS: u32 = 2;

/// A busy machine older than this is assumed abandoned (the request that
/// owned it never finished) and may be reset.
pub const STALE_AFTER_SECS: i64 = 120;

/// Generic message shown for every backend failure.
pub const ORDER_FAILED_MESSAGE: &str = "下单失败";

/// Why checkout cannot proceed. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum CheckoutBlock {
    #[error("请先登录 / Please sign in")]
    SignInRequired,
    #[error("请选择收货地址 / Please select a shipping address")]
    AddressRequired,
    #[error("最少购买{minimum}件 / Minimum {minimum} items")]
    BelowMinimum { minimum: u32 },
}

/// Check the preconditions for placing an order, identity first, then
/// address, then quantity. Returns the address to ship to.
///
/// # Errors
///
/// Returns the first [`CheckoutBlock`] that applies.
pub const fn validate_checkout(
    signed_in: bool,
    address: Option<AddressId>,
    unit_count: u32,
    minimum: u32,
) -> Result<AddressId, CheckoutBlock> {
    if !signed_in {
        return Err(CheckoutBlock::SignInRequired);
    }
    let Some(address) = address else {
        return Err(CheckoutBlock::AddressRequired);
    };
    if unit_count < minimum {
        return Err(CheckoutBlock::BelowMinimum { minimum });
    }
    Ok(address)
}

/// Why the last submission failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum CheckoutFailure {
    Blocked { block: CheckoutBlock },
    /// The payment function failed or returned something unusable.
    Backend,
}

impl CheckoutFailure {
    /// Message shown to the customer.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Blocked { block } => block.to_string(),
            Self::Backend => ORDER_FAILED_MESSAGE.to_string(),
        }
    }
}

/// Where a checkout submission stands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    #[default]
    Idle,
    Validating { method: PaymentMethod },
    Submitting { method: PaymentMethod },
    /// The provider has the order; the customer completes payment there.
    AwaitingExternalConfirmation { outcome: PaymentOutcome },
    Succeeded { method: PaymentMethod },
    Failed { failure: CheckoutFailure },
}

impl CheckoutState {
    const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating { .. } => "validating",
            Self::Submitting { .. } => "submitting",
            Self::AwaitingExternalConfirmation { .. } => "awaiting_external_confirmation",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutEvent {
    /// The customer pressed a payment button.
    Submit(PaymentMethod),
    /// Preconditions hold.
    Validated,
    /// Preconditions failed.
    Blocked(CheckoutBlock),
    /// The payment function succeeded.
    Accepted(PaymentOutcome),
    /// The payment function failed, or the submission could not finish.
    Rejected,
    /// The customer was sent on to the provider.
    HandedOff,
    /// Back to idle after a terminal state.
    Reset,
}

impl CheckoutEvent {
    const fn name(&self) -> &'static str {
        match self {
            Self::Submit(_) => "submit",
            Self::Validated => "validated",
            Self::Blocked(_) => "blocked",
            Self::Accepted(_) => "accepted",
            Self::Rejected => "rejected",
            Self::HandedOff => "handed_off",
            Self::Reset => "reset",
        }
    }
}

/// An event that has no transition from the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no transition from {state} on {event}")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub event: &'static str,
}

/// The checkout state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMachine {
    state: CheckoutState,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl CheckoutMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> &CheckoutState {
        &self.state
    }

    /// True while a submission is in flight.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(
            self.state,
            CheckoutState::Validating { .. } | CheckoutState::Submitting { .. }
        )
    }

    /// Method currently being submitted, for the button spinner.
    #[must_use]
    pub const fn loading_method(&self) -> Option<PaymentMethod> {
        match self.state {
            CheckoutState::Validating { method } | CheckoutState::Submitting { method } => {
                Some(method)
            }
            _ => None,
        }
    }

    /// Message for the last failure, if the machine is in `Failed`.
    #[must_use]
    pub fn failure_message(&self) -> Option<String> {
        match &self.state {
            CheckoutState::Failed { failure } => Some(failure.message()),
            _ => None,
        }
    }

    /// Apply an event at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the state unchanged when the
    /// event is not defined for the current state.
    pub fn handle(&mut self, event: CheckoutEvent) -> Result<&CheckoutState, InvalidTransition> {
        self.handle_at(event, Utc::now())
    }

    /// Apply an event, stamping the transition with `now`.
    ///
    /// # Errors
    ///
    /// See [`handle`](Self::handle).
    pub fn handle_at(
        &mut self,
        event: CheckoutEvent,
        now: DateTime<Utc>,
    ) -> Result<&CheckoutState, InvalidTransition> {
        use CheckoutEvent as E;
        use CheckoutState as S;

        let next = match (&self.state, event) {
            (S::Idle | S::Failed { .. }, E::Submit(method)) => S::Validating { method },
            (S::Validating { method }, E::Validated) => S::Submitting { method: *method },
            (S::Validating { .. }, E::Blocked(block)) => S::Failed {
                failure: CheckoutFailure::Blocked { block },
            },
            (S::Submitting { method }, E::Accepted(outcome)) => match outcome {
                PaymentOutcome::OrderCreated => S::Succeeded { method: *method },
                outcome => S::AwaitingExternalConfirmation { outcome },
            },
            (S::Validating { .. } | S::Submitting { .. }, E::Rejected) => S::Failed {
                failure: CheckoutFailure::Backend,
            },
            (S::AwaitingExternalConfirmation { outcome }, E::HandedOff) => S::Succeeded {
                method: match outcome {
                    PaymentOutcome::WechatQr { .. } => PaymentMethod::Wechat,
                    PaymentOutcome::AlipayRedirect { .. } | PaymentOutcome::OrderCreated => {
                        PaymentMethod::Alipay
                    }
                },
            },
            (
                S::Succeeded { .. } | S::Failed { .. } | S::AwaitingExternalConfirmation { .. },
                E::Reset,
            ) => S::Idle,
            (state, event) => {
                return Err(InvalidTransition {
                    state: state.name(),
                    event: event.name(),
                });
            }
        };

        self.state = next;
        self.updated_at = Some(now);
        Ok(&self.state)
    }

    /// Drop a busy state whose owning request never completed.
    ///
    /// Returns true if the machine was reset.
    pub fn recover_if_stale(&mut self, now: DateTime<Utc>) -> bool {
        let stale = self.updated_at.is_none_or(|at| {
            now.signed_duration_since(at) > Duration::seconds(STALE_AFTER_SECS)
        });
        if self.is_busy() && stale {
            self.state = CheckoutState::Idle;
            self.updated_at = Some(now);
            return true;
        }
        false
    }
}
