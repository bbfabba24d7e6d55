//! Trip and trip date endpoints.

use std::sync::Arc;

use axum::extract::State;
use booking_store::{BookingStore, Trip, TripDate};
use chrono::NaiveDate;
use common::{Money, TripDateId, TripDateStatus, TripId};
use domain::{NewTrip, ScheduleTripDate, TripDateChanges, TripDateView};
use serde::{Deserialize, Serialize};

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam, nullable};
use crate::response::ApiResponse;
use crate::state::AppState;

/// Prices are in cents.
#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub nombre: String,
    pub precio_base: Money,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriceRequest {
    pub precio_base: Money,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleDateRequest {
    pub id_viaje: TripId,
    pub fecha_inicio: NaiveDate,
    pub fecha_fin: NaiveDate,
    pub cupo_maximo: u32,
    #[serde(default)]
    pub precio: Option<Money>,
    #[serde(default)]
    pub observaciones: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDateRequest {
    #[serde(default)]
    pub cupo_maximo: Option<u32>,
    #[serde(default, deserialize_with = "nullable")]
    pub precio: Option<Option<Money>>,
    #[serde(default)]
    pub estado: Option<TripDateStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub observaciones: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct TripResponse {
    pub viaje: Trip,
}

#[derive(Debug, Serialize)]
pub struct DateResponse {
    pub fecha: TripDate,
}

#[derive(Debug, Serialize)]
pub struct DateViewResponse {
    pub fecha: TripDateView,
}

#[derive(Debug, Serialize)]
pub struct DatesResponse {
    pub fechas: Vec<TripDateView>,
}

/// POST /viajes
pub async fn create_trip<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(actor): AdminUser,
    JsonBody(req): JsonBody<CreateTripRequest>,
) -> Result<ApiResponse<TripResponse>, ApiError> {
    let cmd = NewTrip {
        name: req.nombre,
        base_price: req.precio_base,
    };
    let viaje = state.catalog.create_trip(&actor, cmd).await?;
    Ok(ApiResponse::created(TripResponse { viaje }).message("Trip created"))
}

/// PUT /viajes/{id}/precio
pub async fn update_trip_price<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(actor): AdminUser,
    PathParam(id): PathParam<TripId>,
    JsonBody(req): JsonBody<UpdatePriceRequest>,
) -> Result<ApiResponse<TripResponse>, ApiError> {
    let viaje = state
        .catalog
        .update_trip_price(&actor, id, req.precio_base)
        .await?;
    Ok(ApiResponse::ok(TripResponse { viaje }).message("Trip price updated"))
}

/// GET /viajes/{id}/fechas
pub async fn list_dates<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    PathParam(id): PathParam<TripId>,
) -> Result<ApiResponse<DatesResponse>, ApiError> {
    let fechas = state.catalog.list_dates(id).await?;
    Ok(ApiResponse::ok(DatesResponse { fechas }))
}

/// POST /fechas-viaje
pub async fn schedule_date<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(actor): AdminUser,
    JsonBody(req): JsonBody<ScheduleDateRequest>,
) -> Result<ApiResponse<DateResponse>, ApiError> {
    let cmd = ScheduleTripDate {
        trip_id: req.id_viaje,
        starts_on: req.fecha_inicio,
        ends_on: req.fecha_fin,
        capacity: req.cupo_maximo,
        price: req.precio,
        notes: req.observaciones,
    };
    let fecha = state.catalog.schedule_date(&actor, cmd).await?;
    Ok(ApiResponse::created(DateResponse { fecha }).message("Trip date scheduled"))
}

/// GET /fechas-viaje/{id}
pub async fn get_date<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    PathParam(id): PathParam<TripDateId>,
) -> Result<ApiResponse<DateViewResponse>, ApiError> {
    let fecha = state.catalog.get_date(id).await?;
    Ok(ApiResponse::ok(DateViewResponse { fecha }))
}

/// PUT /fechas-viaje/{id}
pub async fn update_date<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(actor): AdminUser,
    PathParam(id): PathParam<TripDateId>,
    JsonBody(req): JsonBody<UpdateDateRequest>,
) -> Result<ApiResponse<DateResponse>, ApiError> {
    let changes = TripDateChanges {
        capacity: req.cupo_maximo,
        price: req.precio,
        status: req.estado,
        notes: req.observaciones,
    };
    let fecha = state.catalog.update_date(&actor, id, changes).await?;
    Ok(ApiResponse::ok(DateResponse { fecha }).message("Trip date updated"))
}
