//! UI-facing entities and input forms.
//!
//! Everything here is in display units: amounts as token floats and
//! timestamps as calendar times. Wire records live in `muvin_types`; the
//! conversion between the two is in [`crate::transform`].

use chrono::{DateTime, Utc};
use muvin_types::{BookingInput, BookingStatus, HotelInput};
use muvin_units::{to_minor_units, to_wire_time, UnitError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiBookingStatus {
    Active,
    Completed,
    Cancelled,
    Pending,
}

impl UiBookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiBookingStatus::Active => "active",
            UiBookingStatus::Completed => "completed",
            UiBookingStatus::Cancelled => "cancelled",
            UiBookingStatus::Pending => "pending",
        }
    }
}

impl From<BookingStatus> for UiBookingStatus {
    fn from(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Active => UiBookingStatus::Active,
            BookingStatus::Completed => UiBookingStatus::Completed,
            BookingStatus::Cancelled => UiBookingStatus::Cancelled,
            BookingStatus::Pending => UiBookingStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiHotel {
    pub id: u64,
    pub name: String,
    pub location: String,
    pub description: String,
    pub total_rooms: u64,
    pub available_rooms: u64,
    pub price_per_night: f64,
    pub owner: String,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    pub rating: f64,
    pub review_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiBooking {
    pub id: u64,
    pub hotel_id: u64,
    pub hotel_name: String,
    pub booked_by: String,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub nights: u64,
    pub rooms_booked: u64,
    pub total_price: f64,
    pub status: UiBookingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiReview {
    pub id: u64,
    pub hotel_id: u64,
    pub reviewed_by: String,
    pub rating: u64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiUser {
    pub principal: String,
    pub is_hotel_owner: bool,
    pub total_bookings: u64,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiPlatformStats {
    pub total_hotels: u64,
    pub total_bookings: u64,
    pub total_users: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiHotelStats {
    pub total_bookings: u64,
    pub total_revenue: f64,
    pub avg_rating: f64,
}

/// Rejected form input. Raised before anything reaches the network.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct InputError(pub String);

impl From<UnitError> for InputError {
    fn from(err: UnitError) -> Self {
        InputError(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateHotelForm {
    pub name: String,
    pub location: String,
    pub description: String,
    pub total_rooms: u64,
    /// Display amount per night.
    pub price_per_night: f64,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl CreateHotelForm {
    pub fn to_input(&self) -> Result<HotelInput, InputError> {
        if self.name.trim().is_empty() {
            return Err(InputError("hotel name is required".into()));
        }
        if self.location.trim().is_empty() {
            return Err(InputError("hotel location is required".into()));
        }
        if self.total_rooms == 0 {
            return Err(InputError("a hotel needs at least one room".into()));
        }
        Ok(HotelInput {
            name: self.name.trim().to_string(),
            location: self.location.trim().to_string(),
            description: self.description.clone(),
            total_rooms: self.total_rooms,
            price_per_night: to_minor_units(self.price_per_night)?,
            amenities: self.amenities.clone(),
            images: self.images.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBookingForm {
    pub hotel_id: u64,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub rooms_booked: u64,
}

impl CreateBookingForm {
    pub fn to_input(&self) -> Result<BookingInput, InputError> {
        if self.check_out <= self.check_in {
            return Err(InputError(format!(
                "check-out ({}) must be after check-in ({})",
                self.check_out.format("%Y-%m-%d"),
                self.check_in.format("%Y-%m-%d")
            )));
        }
        if self.rooms_booked == 0 {
            return Err(InputError("at least one room must be booked".into()));
        }
        Ok(BookingInput {
            hotel_id: self.hotel_id,
            check_in: to_wire_time(self.check_in),
            check_out: to_wire_time(self.check_out),
            rooms_booked: self.rooms_booked,
        })
    }
}

/// Review submission. The rating range is enforced by the canister, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateReviewForm {
    pub hotel_id: u64,
    pub rating: u64,
    pub comment: String,
}

/// Client-side narrowing of an already loaded hotel list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotelFilter {
    /// Case-insensitive match against name or location.
    pub search: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Only hotels with at least one free room.
    pub available_only: bool,
}

impl HotelFilter {
    pub fn matches(&self, hotel: &UiHotel) -> bool {
        let name = hotel.name.to_lowercase();
        let location = hotel.location.to_lowercase();

        if let Some(term) = non_blank(&self.search) {
            if !name.contains(&term) && !location.contains(&term) {
                return false;
            }
        }
        if let Some(wanted) = non_blank(&self.location) {
            if !location.contains(&wanted) {
                return false;
            }
        }
        if matches!(self.min_price, Some(min) if hotel.price_per_night < min) {
            return false;
        }
        if matches!(self.max_price, Some(max) if hotel.price_per_night > max) {
            return false;
        }
        !(self.available_only && hotel.available_rooms == 0)
    }

    pub fn apply(&self, hotels: &[UiHotel]) -> Vec<UiHotel> {
        hotels.iter().filter(|h| self.matches(h)).cloned().collect()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}
