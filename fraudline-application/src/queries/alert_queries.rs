use fraudline_domain::{AlertDeliveryRecord, FraudAlertEvent};

use crate::pipeline::store_call;
use crate::queries::MAX_LIST_LIMIT;
use crate::{AppError, AppState};

pub async fn recent_alerts(state: &AppState, limit: Option<usize>) -> Result<Vec<FraudAlertEvent>, AppError> {
    let limit = limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT);
    store_call(state, "recent_alerts", state.alerts.recent_alerts(limit)).await
}

pub async fn recent_alert_deliveries(state: &AppState, limit: Option<usize>) -> Vec<AlertDeliveryRecord> {
    let limit = limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT);
    state.alert_sink.recent_deliveries(limit).await
}
