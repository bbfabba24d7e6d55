//! Cart endpoints under `/carrito`.

use std::sync::Arc;

use axum::extract::State;
use booking_store::{BookingStore, CartItem, Purchase, Reservation};
use common::{CartItemId, TripDateId};
use domain::{AddCartItem, CartView};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub id_fecha_viaje: TripDateId,
    pub cantidad_personas: u32,
    #[serde(default)]
    pub observaciones: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub carrito: CartView,
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub item: CartItem,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub id: CartItemId,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub compra: Purchase,
    pub reservas: Vec<Reservation>,
}

/// GET /carrito
pub async fn view<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
) -> Result<ApiResponse<CartResponse>, ApiError> {
    let carrito = state.cart.items(&actor).await?;
    Ok(ApiResponse::ok(CartResponse { carrito }))
}

/// POST /carrito/items
pub async fn add_item<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    JsonBody(req): JsonBody<AddItemRequest>,
) -> Result<ApiResponse<ItemResponse>, ApiError> {
    let cmd = AddCartItem {
        trip_date_id: req.id_fecha_viaje,
        party_size: req.cantidad_personas,
        notes: req.observaciones,
    };
    let item = state.cart.add_item(&actor, cmd).await?;
    Ok(ApiResponse::created(ItemResponse { item }).message("Item added to cart"))
}

/// DELETE /carrito/items/{id}
pub async fn remove_item<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    PathParam(id): PathParam<CartItemId>,
) -> Result<ApiResponse<RemovedResponse>, ApiError> {
    state.cart.remove_item(&actor, id).await?;
    Ok(ApiResponse::ok(RemovedResponse { id }).message("Item removed from cart"))
}

/// POST /carrito/checkout
pub async fn checkout<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
) -> Result<ApiResponse<CheckoutResponse>, ApiError> {
    let checkout = state.cart.checkout(&actor).await?;
    Ok(ApiResponse::created(CheckoutResponse {
        compra: checkout.purchase,
        reservas: checkout.reservations,
    })
    .message("Checkout complete"))
}
