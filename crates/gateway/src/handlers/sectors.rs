//! Sector catalogue and price sheet handlers

use axum::{extract::Path, Json};
use serde::Serialize;

use sectorsite_common::{
    errors::{AppError, Result},
    sectors::{self, SectorConfig, SubscriptionPlan},
    subscription::{plan_details, PlanDetails},
};

#[derive(Serialize)]
pub struct SectorListResponse {
    pub sectors: &'static [SectorConfig],
}

#[derive(Serialize)]
pub struct PlanListResponse {
    pub plans: Vec<PlanDetails>,
}

pub async fn list_sectors() -> Json<SectorListResponse> {
    Json(SectorListResponse {
        sectors: sectors::sector_list(),
    })
}

pub async fn get_sector(Path(id): Path<String>) -> Result<Json<&'static SectorConfig>> {
    sectors::sector_config(&id)
        .map(Json)
        .ok_or(AppError::SectorUnknown { sector: id })
}

pub async fn list_plans() -> Json<PlanListResponse> {
    Json(PlanListResponse {
        plans: SubscriptionPlan::ALL.into_iter().map(plan_details).collect(),
    })
}
