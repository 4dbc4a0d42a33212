//! Registration, renewal and query handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use muster_types::{InstanceId, InstanceStatus, ServiceInstance, ServiceName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// The instance to register
    pub instance: ServiceInstance,

    /// Requested lease duration; the server default applies when absent
    #[serde(default)]
    pub lease_duration_seconds: Option<u64>,
}

/// Register an instance under a service
pub async fn register_instance(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<StatusCode> {
    let service = ServiceName::new(service);
    state.registry.register(
        &service,
        request.instance,
        request.lease_duration_seconds,
        Utc::now(),
    )?;
    Ok(StatusCode::NO_CONTENT)
}

/// Renewal response
#[derive(Debug, Serialize)]
pub struct RenewResponse {
    pub renewed: bool,
}

/// Renew an instance's lease
pub async fn renew_lease(
    State(state): State<AppState>,
    Path((service, instance_id)): Path<(String, String)>,
) -> ApiResult<Json<RenewResponse>> {
    let service = ServiceName::new(service);
    let instance_id = InstanceId::new(instance_id);
    state.registry.renew(&service, &instance_id, Utc::now())?;
    Ok(Json(RenewResponse { renewed: true }))
}

/// Cancellation response
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Deregister an instance. Cancelling an unknown instance is not an
/// error; the response says whether a lease was removed.
pub async fn cancel_lease(
    State(state): State<AppState>,
    Path((service, instance_id)): Path<(String, String)>,
) -> Json<CancelResponse> {
    let service = ServiceName::new(service);
    let instance_id = InstanceId::new(instance_id);
    let cancelled = state.registry.cancel(&service, &instance_id, Utc::now());
    Json(CancelResponse { cancelled })
}

/// Status override request body
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: InstanceStatus,
}

/// Status override response
#[derive(Debug, Serialize)]
pub struct StatusUpdateResponse {
    pub status: InstanceStatus,
}

/// Override the reported status of an instance
pub async fn update_instance_status(
    State(state): State<AppState>,
    Path((service, instance_id)): Path<(String, String)>,
    Json(request): Json<StatusUpdateRequest>,
) -> ApiResult<Json<StatusUpdateResponse>> {
    let service = ServiceName::new(service);
    let instance_id = InstanceId::new(instance_id);
    state
        .registry
        .update_status(&service, &instance_id, request.status, Utc::now())?;
    Ok(Json(StatusUpdateResponse {
        status: request.status,
    }))
}

/// Instances of one service
#[derive(Debug, Serialize)]
pub struct ServiceInstancesResponse {
    pub service: ServiceName,
    pub instances: Vec<ServiceInstance>,
}

/// Query the instances of one service.
///
/// Served from the query cache; a service nobody registered yields an
/// empty list, not an error.
pub async fn get_service_instances(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Json<ServiceInstancesResponse> {
    let service = ServiceName::new(service);
    let instances = state.registry.instances(&service).to_vec();
    Json(ServiceInstancesResponse { service, instances })
}

/// Full registry view
#[derive(Debug, Serialize)]
pub struct AllInstancesResponse {
    pub services: HashMap<ServiceName, Vec<ServiceInstance>>,
    pub cache_version: u64,
    pub cache_built_at: DateTime<Utc>,
}

/// Query all registered instances grouped by service
pub async fn get_all_instances(State(state): State<AppState>) -> Json<AllInstancesResponse> {
    let snapshot = state.registry.snapshot();
    let services = snapshot
        .services()
        .iter()
        .map(|(name, instances)| (name.clone(), instances.to_vec()))
        .collect();
    Json(AllInstancesResponse {
        services,
        cache_version: snapshot.version,
        cache_built_at: snapshot.built_at,
    })
}
