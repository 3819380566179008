use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};

use crate::adapters::db::{SqliteBinCache, count_snapshots, get_latest_snapshot, schema_version};
use crate::app::services::{BinCommandHandler, BinQueryHandler, BinRegistry, ServiceError};
use crate::domain::bin_record::BinRecord;
use crate::domain::staleness::CameraStatus;

#[derive(Clone)]
pub struct ApiState {
    pub bins: Arc<BinRegistry>,
    pub cache: SqliteBinCache,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinResponse {
    #[serde(flatten)]
    pub bin: BinRecord,
    pub camera_offline: bool,
    pub camera_status: CameraStatus,
    pub camera_status_label: &'static str,
}

impl BinResponse {
    fn from_bin(bin: BinRecord, now: &chrono::DateTime<chrono::FixedOffset>) -> Self {
        let status = CameraStatus::for_bin(&bin, now);
        Self {
            bin,
            camera_offline: status == CameraStatus::Offline,
            camera_status: status,
            camera_status_label: status.label(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub offline: Option<bool>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheDiagnosticsResponse {
    pub schema_version: u32,
    pub snapshots_count: i64,
    pub latest_saved_at: Option<String>,
    pub latest_bin_count: Option<i64>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_bins_endpoint)
        .service(bin_summary_endpoint)
        .service(refresh_bins_endpoint)
        .service(get_bin_endpoint)
        .service(save_bin_endpoint)
        .service(cache_diagnostics_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/bins")]
async fn list_bins_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let now = state.bins.now();

    match state.bins.list_bins() {
        Ok(bins) => {
            let mapped: Vec<BinResponse> = bins
                .into_iter()
                .map(|bin| BinResponse::from_bin(bin, &now))
                .filter(|response| {
                    query
                        .offline
                        .is_none_or(|offline| response.camera_offline == offline)
                })
                .collect();

            HttpResponse::Ok().json(mapped)
        }
        Err(error) => service_error_response(error),
    }
}

#[get("/bins/summary")]
async fn bin_summary_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.bins.summary() {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(error) => service_error_response(error),
    }
}

#[post("/bins/refresh")]
async fn refresh_bins_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let bins = Arc::clone(&state.bins);

    match web::block(move || bins.refresh()).await {
        Ok(Ok(summary)) => HttpResponse::Ok().json(summary),
        Ok(Err(error)) => service_error_response(error),
        Err(error) => blocking_error_response(error),
    }
}

#[get("/bins/{id}")]
async fn get_bin_endpoint(state: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    let now = state.bins.now();

    match state.bins.get_bin(&id) {
        Ok(Some(bin)) => HttpResponse::Ok().json(BinResponse::from_bin(bin, &now)),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("bin {id} not found")
        })),
        Err(error) => service_error_response(error),
    }
}

#[post("/bins")]
async fn save_bin_endpoint(
    state: web::Data<ApiState>,
    body: web::Json<BinRecord>,
) -> impl Responder {
    let bins = Arc::clone(&state.bins);
    let bin = body.into_inner();

    match web::block(move || {
        let saved = bins.save_bin(bin)?;
        Ok::<_, ServiceError>((saved, bins.now()))
    })
    .await
    {
        Ok(Ok((saved, now))) => HttpResponse::Ok().json(BinResponse::from_bin(saved, &now)),
        Ok(Err(error)) => service_error_response(error),
        Err(error) => blocking_error_response(error),
    }
}

#[get("/diagnostics/cache")]
async fn cache_diagnostics_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let diagnostics = state.cache.with_connection(|connection| {
        let latest = get_latest_snapshot(connection)?;
        Ok(CacheDiagnosticsResponse {
            schema_version: schema_version(connection)?,
            snapshots_count: count_snapshots(connection)?,
            latest_saved_at: latest.as_ref().map(|snapshot| snapshot.saved_at.clone()),
            latest_bin_count: latest.map(|snapshot| snapshot.bin_count),
        })
    });

    match diagnostics {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(error) => service_error_response(ServiceError::Cache(error)),
    }
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::LockPoisoned => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "bin registry lock poisoned"
        })),
        ServiceError::Source(error) => HttpResponse::BadGateway().json(serde_json::json!({
            "error": format!("bins backend failed: {error}")
        })),
        ServiceError::Cache(error) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("bin cache failed: {error}")
        })),
        ServiceError::NotApplied { id } => HttpResponse::Conflict().json(serde_json::json!({
            "error": format!("bin {id} conflicts with an existing bin")
        })),
    }
}

fn blocking_error_response(error: actix_web::error::BlockingError) -> HttpResponse {
    tracing::error!(error = %error, "blocking bin operation was cancelled");
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "bin operation was cancelled"
    }))
}
