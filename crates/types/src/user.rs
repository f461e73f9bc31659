use serde::{Deserialize, Serialize};

use crate::principal::Principal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub principal: Principal,
    pub is_hotel_owner: bool,
    #[serde(with = "crate::serde::serde_nat")]
    pub total_bookings: u64,
    #[serde(with = "crate::serde::serde_int")]
    pub joined_at: i64,
}

/// Per-owner aggregate returned by getMyHotelStats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelStats {
    #[serde(with = "crate::serde::serde_nat")]
    pub total_bookings: u64,
    /// e8s
    #[serde(with = "crate::serde::serde_nat")]
    pub total_revenue: u64,
    pub avg_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    #[serde(with = "crate::serde::serde_nat")]
    pub total_hotels: u64,
    #[serde(with = "crate::serde::serde_nat")]
    pub total_bookings: u64,
    #[serde(with = "crate::serde::serde_nat")]
    pub total_users: u64,
}
