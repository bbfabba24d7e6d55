//! Seat counter maintenance under `/admin/cupos`.

use std::sync::Arc;

use axum::extract::State;
use booking_store::{BookingStore, ResetSummary};
use common::TripDateId;
use reconciliation::{DiagnosticReport, ReconcileSummary, ResetConfirmation};
use serde::{Deserialize, Serialize};

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub confirmacion: String,
    #[serde(default)]
    pub confirmacion_repetida: String,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticResponse {
    pub diagnostico: DiagnosticReport,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub resumen: ReconcileSummary,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub resumen: ResetSummary,
}

/// GET /admin/cupos/{id}/diagnostico
pub async fn diagnose<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(_): AdminUser,
    PathParam(id): PathParam<TripDateId>,
) -> Result<ApiResponse<DiagnosticResponse>, ApiError> {
    let diagnostico = state.reconciler.diagnose(id).await?;
    Ok(ApiResponse::ok(DiagnosticResponse { diagnostico }))
}

/// POST /admin/cupos/sincronizar
pub async fn sync<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(actor): AdminUser,
) -> Result<ApiResponse<SyncResponse>, ApiError> {
    let resumen = state.reconciler.reconcile_all().await?;
    tracing::info!(
        user_id = %actor.user_id,
        changed = resumen.changed.len(),
        "seat counters synchronized"
    );
    let message = format!(
        "Examined {} dates, corrected {}",
        resumen.examined,
        resumen.changed.len()
    );
    Ok(ApiResponse::ok(SyncResponse { resumen }).message(message))
}

/// POST /admin/cupos/reset
pub async fn reset<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AdminUser(actor): AdminUser,
    JsonBody(req): JsonBody<ResetRequest>,
) -> Result<ApiResponse<ResetResponse>, ApiError> {
    let confirmation = ResetConfirmation::new(&req.confirmacion, &req.confirmacion_repetida)?;
    tracing::warn!(user_id = %actor.user_id, "full booking reset requested");
    let resumen = state.reconciler.reset_all(confirmation).await?;
    Ok(ApiResponse::ok(ResetResponse { resumen }).message("All booking data reset"))
}
