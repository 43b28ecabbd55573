//! Ambient per-delivery context.
//!
//! The context is carried by a tokio task-local, so it crosses every await
//! inside the scoped future without manual threading, nested scopes shadow
//! the outer one, and concurrent scoped tasks each observe their own copy.
//! It is deliberately NOT a module global: nothing outside a scope can
//! observe or mutate another delivery's context.

use std::future::Future;

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryContext {
    pub delivery_id: String,
    pub account_id: Option<String>,
    pub chat_id: Option<String>,
    pub operation: Option<String>,
}

impl DeliveryContext {
    /// A fresh context with a new delivery ID and no correlation fields.
    pub fn new() -> Self {
        Self {
            delivery_id: Uuid::new_v4().to_string(),
            account_id: None,
            chat_id: None,
            operation: None,
        }
    }
}

impl Default for DeliveryContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay for [`with_partial`]: unset fields inherit from the current
/// context.
#[derive(Debug, Clone, Default)]
pub struct PartialDeliveryContext {
    pub delivery_id: Option<String>,
    pub account_id: Option<String>,
    pub chat_id: Option<String>,
    pub operation: Option<String>,
}

tokio::task_local! {
    static DELIVERY_CTX: DeliveryContext;
}

/// Bind `ctx` for the duration of `fut`, including across its suspensions.
pub async fn run_with<F: Future>(ctx: DeliveryContext, fut: F) -> F::Output {
    DELIVERY_CTX.scope(ctx, fut).await
}

/// The context bound to the current task, if any.
pub fn current() -> Option<DeliveryContext> {
    DELIVERY_CTX.try_with(|c| c.clone()).ok()
}

/// Inherit the current context, overlay `partial`, and run `fut` under the
/// result.  A new delivery ID is assigned iff the overlay does not supply
/// one — each `with_partial` call is a new logical delivery.
pub async fn with_partial<F: Future>(partial: PartialDeliveryContext, fut: F) -> F::Output {
    let base = current().unwrap_or_default();
    let ctx = DeliveryContext {
        delivery_id: partial
            .delivery_id
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        account_id: partial.account_id.or(base.account_id),
        chat_id: partial.chat_id.or(base.chat_id),
        operation: partial.operation.or(base.operation),
    };
    run_with(ctx, fut).await
}
