pub mod booking;
pub mod hotel;
pub mod identity;
pub mod principal;
pub mod result;
pub mod review;
pub mod serde;
pub mod user;

pub use crate::booking::{Booking, BookingInput, BookingStatus};
pub use crate::hotel::{Hotel, HotelInput};
pub use crate::identity::Identity;
pub use crate::principal::{Principal, PrincipalError};
pub use crate::result::{CallResult, ErrorKind};
pub use crate::review::Review;
pub use crate::user::{HotelStats, PlatformStats, User};
