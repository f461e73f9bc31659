use serde::{Deserialize, Serialize};

use crate::principal::Principal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(with = "crate::serde::serde_nat")]
    pub id: u64,
    #[serde(with = "crate::serde::serde_nat")]
    pub hotel_id: u64,
    pub reviewed_by: Principal,
    #[serde(with = "crate::serde::serde_nat")]
    pub rating: u64,
    pub comment: String,
    #[serde(with = "crate::serde::serde_int")]
    pub created_at: i64,
}
