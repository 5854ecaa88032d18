//! Sales reporting.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;

use crate::db::ReportRepository;
use crate::db::reports::SalesReport;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Days covered when no start date is given.
const DEFAULT_PERIOD_DAYS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
pub struct SalesQuery {
    #[serde(alias = "desde")]
    pub from: Option<NaiveDate>,
    #[serde(alias = "hasta")]
    pub to: Option<NaiveDate>,
    pub top: Option<i64>,
}

impl SalesQuery {
    /// Inclusive date range, ending today by default.
    fn range(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let to = self.to.unwrap_or(today);
        let from = self.from.unwrap_or_else(|| {
            to.checked_sub_days(Days::new(DEFAULT_PERIOD_DAYS - 1))
                .unwrap_or(to)
        });
        if from > to {
            return Err(AppError::BadRequest(
                "start date is after end date".to_string(),
            ));
        }
        Ok((from, to))
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ventas", get(sales))
}

pub async fn sales(
    State(state): State<AppState>,
    Query(query): Query<SalesQuery>,
) -> Result<Json<SalesReport>> {
    let (from, to) = query.range(Utc::now().date_naive())?;
    let top = query.top.unwrap_or(10).clamp(1, 50);
    Ok(Json(
        ReportRepository::new(state.pool())
            .sales(from, to, top)
            .await?,
    ))
}
