//! Payment endpoints under `/pagos`.

use std::sync::Arc;

use axum::extract::State;
use booking_store::{BookingStore, Payment, Purchase};
use common::{PaymentId, PaymentMethod, PurchaseId};
use serde::{Deserialize, Serialize};
use settlement::{BookedReservation, CardData, PaymentReceipt, ProcessPayment, TestCard};

use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    pub id_compra: PurchaseId,
    pub metodo_pago: PaymentMethod,
    #[serde(default)]
    pub card_data: Option<CardData>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub pago: Payment,
    pub compra: Purchase,
    pub reservas: Vec<BookedReservation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
}

impl From<PaymentReceipt> for PaymentResponse {
    fn from(receipt: PaymentReceipt) -> Self {
        Self {
            pago: receipt.payment,
            compra: receipt.purchase,
            reservas: receipt.reservations,
            authorization_code: receipt.authorization_code,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TestCardsResponse {
    pub tarjetas: &'static [TestCard],
}

/// POST /pagos/procesar
pub async fn process<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    JsonBody(req): JsonBody<ProcessPaymentRequest>,
) -> Result<ApiResponse<PaymentResponse>, ApiError> {
    let cmd = ProcessPayment {
        purchase_id: req.id_compra,
        method: req.metodo_pago,
        card: req.card_data,
    };
    let receipt = state.payments.process(&actor, cmd).await?;
    let message = match receipt.payment.method {
        PaymentMethod::Card => "Payment approved",
        PaymentMethod::PayLater => "Payment registered, pending confirmation",
    };
    Ok(ApiResponse::ok(PaymentResponse::from(receipt)).message(message))
}

/// PUT /pagos/{id}/confirmar
pub async fn confirm<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(actor): AdminUser,
    PathParam(id): PathParam<PaymentId>,
) -> Result<ApiResponse<PaymentResponse>, ApiError> {
    let receipt = state.payments.confirm_deferred(&actor, id).await?;
    Ok(ApiResponse::ok(PaymentResponse::from(receipt)).message("Payment confirmed"))
}

/// GET /pagos/tarjetas-prueba
pub async fn test_cards<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResponse<TestCardsResponse> {
    ApiResponse::ok(TestCardsResponse {
        tarjetas: state.payments.test_cards(),
    })
}
