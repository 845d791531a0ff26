use serde::{Deserialize, Serialize};

use super::task::{SortBy, TaskFilter};

/// Persisted presentation preferences (written under the state key)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default)]
    pub filter: TaskFilter,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub search_query: String,
}
