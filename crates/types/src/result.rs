use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain rejection reported by the canister inside an `err` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidInput,
    InsufficientRooms,
    BookingConflict,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InsufficientRooms => "insufficient_rooms",
            ErrorKind::BookingConflict => "booking_conflict",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorKind::NotFound => "the requested item was not found",
            ErrorKind::Unauthorized => "you are not allowed to perform this action",
            ErrorKind::InvalidInput => "the request was rejected as invalid",
            ErrorKind::InsufficientRooms => "not enough rooms are available",
            ErrorKind::BookingConflict => "the dates conflict with an existing booking",
        };
        f.write_str(msg)
    }
}

/// `variant { ok : T; err : ErrorType }` as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallResult<T> {
    #[serde(rename = "ok")]
    Ok(T),
    #[serde(rename = "err")]
    Err(ErrorKind),
}

impl<T> CallResult<T> {
    pub fn into_result(self) -> Result<T, ErrorKind> {
        match self {
            CallResult::Ok(v) => Ok(v),
            CallResult::Err(kind) => Err(kind),
        }
    }
}

impl<T> From<Result<T, ErrorKind>> for CallResult<T> {
    fn from(r: Result<T, ErrorKind>) -> Self {
        match r {
            Ok(v) => CallResult::Ok(v),
            Err(kind) => CallResult::Err(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_ok_and_err_variants() {
        let ok: CallResult<u64> = serde_json::from_value(json!({"ok": 42})).unwrap();
        assert_eq!(ok.into_result(), Ok(42));

        let err: CallResult<u64> =
            serde_json::from_value(json!({"err": {"InsufficientRooms": null}})).unwrap();
        assert_eq!(err.into_result(), Err(ErrorKind::InsufficientRooms));
    }

    #[test]
    fn unknown_error_kind_is_a_decode_failure() {
        let res = serde_json::from_value::<CallResult<u64>>(json!({"err": {"Teapot": null}}));
        assert!(res.is_err());
    }
}
