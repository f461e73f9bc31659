//! Wire record -> UI entity conversion.
//!
//! Each transform either yields a fully converted entity or rejects the
//! record; nothing half-converted escapes. Collections drop rejected records
//! individually and keep the rest.

use muvin_types::{Booking, Hotel, HotelStats, PlatformStats, Review, User};
use muvin_units::{to_calendar_time, to_display_amount, UnitError};
use tracing::warn;

use crate::model::{UiBooking, UiHotel, UiHotelStats, UiPlatformStats, UiReview, UiUser};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("available rooms {available} exceed total rooms {total}")]
    RoomsExceedTotal { available: u64, total: u64 },
    #[error("check-out {check_out}ns is not after check-in {check_in}ns")]
    InvertedStay { check_in: i64, check_out: i64 },
    #[error("rating is not a finite number")]
    NonFiniteRating,
    #[error(transparent)]
    Time(#[from] UnitError),
}

pub fn transform_hotel(h: Hotel) -> Result<UiHotel, TransformError> {
    if h.available_rooms > h.total_rooms {
        return Err(TransformError::RoomsExceedTotal {
            available: h.available_rooms,
            total: h.total_rooms,
        });
    }
    if !h.rating.is_finite() {
        return Err(TransformError::NonFiniteRating);
    }
    Ok(UiHotel {
        id: h.id,
        name: h.name,
        location: h.location,
        description: h.description,
        total_rooms: h.total_rooms,
        available_rooms: h.available_rooms,
        price_per_night: to_display_amount(h.price_per_night),
        owner: h.owner.to_string(),
        amenities: h.amenities,
        images: h.images,
        rating: h.rating,
        review_count: h.review_count,
        created_at: to_calendar_time(h.created_at)?,
    })
}

pub fn transform_booking(b: Booking) -> Result<UiBooking, TransformError> {
    if b.check_out <= b.check_in {
        return Err(TransformError::InvertedStay {
            check_in: b.check_in,
            check_out: b.check_out,
        });
    }
    Ok(UiBooking {
        id: b.id,
        hotel_id: b.hotel_id,
        hotel_name: b.hotel_name,
        booked_by: b.booked_by.to_string(),
        check_in: to_calendar_time(b.check_in)?,
        check_out: to_calendar_time(b.check_out)?,
        nights: b.nights,
        rooms_booked: b.rooms_booked,
        total_price: to_display_amount(b.total_price),
        status: b.status.into(),
        created_at: to_calendar_time(b.created_at)?,
    })
}

pub fn transform_review(r: Review) -> Result<UiReview, TransformError> {
    Ok(UiReview {
        id: r.id,
        hotel_id: r.hotel_id,
        reviewed_by: r.reviewed_by.to_string(),
        rating: r.rating,
        comment: r.comment,
        created_at: to_calendar_time(r.created_at)?,
    })
}

pub fn transform_user(u: User) -> Result<UiUser, TransformError> {
    Ok(UiUser {
        principal: u.principal.to_string(),
        is_hotel_owner: u.is_hotel_owner,
        total_bookings: u.total_bookings,
        joined_at: to_calendar_time(u.joined_at)?,
    })
}

pub fn transform_platform_stats(s: PlatformStats) -> Result<UiPlatformStats, TransformError> {
    Ok(UiPlatformStats {
        total_hotels: s.total_hotels,
        total_bookings: s.total_bookings,
        total_users: s.total_users,
    })
}

pub fn transform_hotel_stats(s: HotelStats) -> Result<UiHotelStats, TransformError> {
    if !s.avg_rating.is_finite() {
        return Err(TransformError::NonFiniteRating);
    }
    Ok(UiHotelStats {
        total_bookings: s.total_bookings,
        total_revenue: to_display_amount(s.total_revenue),
        avg_rating: s.avg_rating,
    })
}

/// Converts a collection, dropping (and logging) records that fail.
pub fn transform_all<W, U>(
    entity: &'static str,
    items: Vec<W>,
    f: fn(W) -> Result<U, TransformError>,
) -> Vec<U> {
    let total = items.len();
    let out: Vec<U> = items
        .into_iter()
        .filter_map(|item| match f(item) {
            Ok(v) => Some(v),
            Err(err) => {
                warn!(target: "transform", entity, "dropping malformed record: {err}");
                None
            }
        })
        .collect();
    if out.len() != total {
        warn!(
            target: "transform",
            entity,
            kept = out.len(),
            dropped = total - out.len(),
            "collection partially rejected"
        );
    }
    out
}
