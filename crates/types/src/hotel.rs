use serde::{Deserialize, Serialize};

use crate::principal::Principal;

/// Hotel record as stored by the canister. Prices are e8s, times are ns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    #[serde(with = "crate::serde::serde_nat")]
    pub id: u64,
    pub name: String,
    pub location: String,
    pub description: String,
    #[serde(with = "crate::serde::serde_nat")]
    pub total_rooms: u64,
    #[serde(with = "crate::serde::serde_nat")]
    pub available_rooms: u64,
    #[serde(with = "crate::serde::serde_nat")]
    pub price_per_night: u64,
    pub owner: Principal,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub rating: f64,
    #[serde(with = "crate::serde::serde_nat")]
    pub review_count: u64,
    #[serde(with = "crate::serde::serde_int")]
    pub created_at: i64,
}

/// Argument record for addHotel / updateHotel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelInput {
    pub name: String,
    pub location: String,
    pub description: String,
    #[serde(with = "crate::serde::serde_nat")]
    pub total_rooms: u64,
    #[serde(with = "crate::serde::serde_nat")]
    pub price_per_night: u64,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
}
