//! Reservation endpoints under `/reservas`.

use std::sync::Arc;

use axum::extract::State;
use booking_store::{BookingStore, Purchase, Reservation};
use chrono::NaiveDate;
use common::{PageRequest, ReservationId, ReservationStatus, TripDateId};
use domain::{
    CreateReservation, ReservationDetails, ReservationFilter, UpdateReservationStatus,
};
use serde::{Deserialize, Serialize};

use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::response::{ApiResponse, Pagination};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub id_fecha_viaje: TripDateId,
    pub cantidad_personas: u32,
    #[serde(default)]
    pub observaciones_reserva: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub estado_reserva: ReservationStatus,
    #[serde(default)]
    pub observaciones_reserva: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub estado: Option<ReservationStatus>,
    pub fecha_desde: Option<NaiveDate>,
    pub fecha_hasta: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListQuery {
    fn split(self) -> (ReservationFilter, PageRequest) {
        let page = PageRequest::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(PageRequest::DEFAULT_PER_PAGE),
        );
        let filter = ReservationFilter {
            status: self.estado,
            created_from: self.fecha_desde,
            created_to: self.fecha_hasta,
        };
        (filter, page)
    }
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub reserva: Reservation,
    pub compra: Purchase,
}

impl From<ReservationDetails> for ReservationResponse {
    fn from(details: ReservationDetails) -> Self {
        Self {
            reserva: details.reservation,
            compra: details.purchase,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReservationListResponse {
    pub reservas: Vec<Reservation>,
    pub pagination: Pagination,
}

/// POST /reservas
pub async fn create<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    JsonBody(req): JsonBody<CreateReservationRequest>,
) -> Result<ApiResponse<ReservationResponse>, ApiError> {
    let cmd = CreateReservation {
        trip_date_id: req.id_fecha_viaje,
        party_size: req.cantidad_personas,
        notes: req.observaciones_reserva,
    };
    let details = state.reservations.create(&actor, cmd).await?;
    Ok(ApiResponse::created(ReservationResponse::from(details)).message("Reservation created"))
}

/// GET /reservas/mis-reservas
pub async fn mine<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    QueryParams(query): QueryParams<ListQuery>,
) -> Result<ApiResponse<ReservationListResponse>, ApiError> {
    let (filter, page) = query.split();
    let page = state.reservations.list_for_user(&actor, filter, page).await?;
    let pagination = Pagination::from(&page);
    Ok(ApiResponse::ok(ReservationListResponse {
        reservas: page.items,
        pagination,
    }))
}

/// GET /reservas
pub async fn list<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(actor): AdminUser,
    QueryParams(query): QueryParams<ListQuery>,
) -> Result<ApiResponse<ReservationListResponse>, ApiError> {
    let (filter, page) = query.split();
    let page = state.reservations.list_all(&actor, filter, page).await?;
    let pagination = Pagination::from(&page);
    Ok(ApiResponse::ok(ReservationListResponse {
        reservas: page.items,
        pagination,
    }))
}

/// GET /reservas/{id}
pub async fn get<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    PathParam(id): PathParam<ReservationId>,
) -> Result<ApiResponse<ReservationResponse>, ApiError> {
    let details = state.reservations.get(&actor, id).await?;
    Ok(ApiResponse::ok(ReservationResponse::from(details)))
}

/// PUT /reservas/{id}/estado
pub async fn update_status<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(actor): AdminUser,
    PathParam(id): PathParam<ReservationId>,
    JsonBody(req): JsonBody<UpdateStatusRequest>,
) -> Result<ApiResponse<ReservationResponse>, ApiError> {
    let cmd = UpdateReservationStatus {
        status: req.estado_reserva,
        notes: req.observaciones_reserva,
    };
    let details = state.reservations.update_status(&actor, id, cmd).await?;
    Ok(ApiResponse::ok(ReservationResponse::from(details)).message("Reservation status updated"))
}

/// PUT /reservas/{id}/cancelar
pub async fn cancel<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    PathParam(id): PathParam<ReservationId>,
) -> Result<ApiResponse<ReservationResponse>, ApiError> {
    let details = state.reservations.cancel(&actor, id).await?;
    Ok(ApiResponse::ok(ReservationResponse::from(details)).message("Reservation cancelled"))
}
