use serde::de::IgnoredAny;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::principal::Principal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(with = "crate::serde::serde_nat")]
    pub id: u64,
    #[serde(with = "crate::serde::serde_nat")]
    pub hotel_id: u64,
    pub hotel_name: String,
    pub booked_by: Principal,
    /// ns since epoch
    #[serde(with = "crate::serde::serde_int")]
    pub check_in: i64,
    #[serde(with = "crate::serde::serde_int")]
    pub check_out: i64,
    #[serde(with = "crate::serde::serde_nat")]
    pub nights: u64,
    #[serde(with = "crate::serde::serde_nat")]
    pub rooms_booked: u64,
    /// e8s
    #[serde(with = "crate::serde::serde_nat")]
    pub total_price: u64,
    pub status: BookingStatus,
    #[serde(with = "crate::serde::serde_int")]
    pub created_at: i64,
}

/// Argument record for bookHotel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingInput {
    #[serde(with = "crate::serde::serde_nat")]
    pub hotel_id: u64,
    #[serde(with = "crate::serde::serde_int")]
    pub check_in: i64,
    #[serde(with = "crate::serde::serde_int")]
    pub check_out: i64,
    #[serde(with = "crate::serde::serde_nat")]
    pub rooms_booked: u64,
}

/// Booking lifecycle tag.
///
/// On the wire this is a single-key variant object such as `{"active": null}`.
/// Decoding is deliberately permissive: the tags are inspected in the order
/// active, completed, cancelled, pending, and a value carrying none of them
/// decodes as [`BookingStatus::Pending`]. The bare string form `"active"` is
/// accepted as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    Active,
    Completed,
    Cancelled,
    Pending,
}

impl BookingStatus {
    const PRECEDENCE: [BookingStatus; 4] = [
        BookingStatus::Active,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Pending => "pending",
        }
    }

    /// Resolves a set of variant tags; unknown or empty sets become `Pending`.
    pub fn from_tags<'a>(tags: impl IntoIterator<Item = &'a str> + Clone) -> Self {
        Self::PRECEDENCE
            .into_iter()
            .find(|status| tags.clone().into_iter().any(|t| t == status.as_str()))
            .unwrap_or(BookingStatus::Pending)
    }
}

impl Serialize for BookingStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(1))?;
        map.serialize_entry(self.as_str(), &())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for BookingStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawStatus {
            Tag(String),
            Variant(BTreeMap<String, IgnoredAny>),
        }

        Ok(match RawStatus::deserialize(d)? {
            RawStatus::Tag(tag) => BookingStatus::from_tags([tag.as_str()]),
            RawStatus::Variant(map) => BookingStatus::from_tags(map.keys().map(String::as_str)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(v: serde_json::Value) -> BookingStatus {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn decodes_each_variant_tag() {
        assert_eq!(decode(json!({"active": null})), BookingStatus::Active);
        assert_eq!(decode(json!({"completed": null})), BookingStatus::Completed);
        assert_eq!(decode(json!({"cancelled": null})), BookingStatus::Cancelled);
        assert_eq!(decode(json!({"pending": null})), BookingStatus::Pending);
        assert_eq!(decode(json!("cancelled")), BookingStatus::Cancelled);
    }

    #[test]
    fn unrecognized_tag_defaults_to_pending() {
        assert_eq!(decode(json!({"refunded": null})), BookingStatus::Pending);
        assert_eq!(decode(json!({})), BookingStatus::Pending);
    }

    #[test]
    fn multiple_tags_follow_precedence() {
        assert_eq!(
            decode(json!({"cancelled": null, "completed": null})),
            BookingStatus::Completed
        );
    }

    #[test]
    fn encodes_as_variant_object() {
        let v = serde_json::to_value(BookingStatus::Cancelled).unwrap();
        assert_eq!(v, json!({"cancelled": null}));
    }

    #[test]
    fn booking_decodes_stringified_numbers() {
        let raw = json!({
            "id": "7",
            "hotelId": 1,
            "hotelName": "Cyber Palace Hotel",
            "bookedBy": "2vxsx-fae",
            "checkIn": "1734220800000000000",
            "checkOut": 1734480000000000000i64,
            "nights": "3",
            "roomsBooked": 1,
            "totalPrice": 45000000000u64,
            "status": {"active": null},
            "createdAt": 0
        });
        let b: Booking = serde_json::from_value(raw).unwrap();
        assert_eq!(b.id, 7);
        assert_eq!(b.check_in, 1_734_220_800_000_000_000);
        assert_eq!(b.nights, 3);
        assert!(b.booked_by.is_anonymous());
        assert_eq!(b.status, BookingStatus::Active);
    }
}
