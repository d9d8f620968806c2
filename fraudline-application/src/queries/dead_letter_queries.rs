use fraudline_domain::{DeadLetterEntry, Topic};

use crate::queries::MAX_LIST_LIMIT;
use crate::AppState;

pub async fn list_dead_letters(state: &AppState, topic: Option<Topic>, limit: Option<usize>) -> Vec<DeadLetterEntry> {
    let limit = limit.unwrap_or(100).clamp(1, MAX_LIST_LIMIT);
    state.dead_letters.list(topic, limit).await
}
