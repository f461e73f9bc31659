use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use muvin_backend_api::{Agent, BackendError, HotelBackend};
use muvin_types::{
    Booking, BookingInput, CallResult, Hotel, HotelInput, HotelStats, PlatformStats, Principal,
    Review, User,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::time::timeout;
use tracing::debug;

use crate::transport::{CallKind, Transport, TransportError, TransportErrorKind};

/// [`HotelBackend`] that talks to the canister through a [`Transport`].
pub struct CanisterBackend {
    transport: Arc<dyn Transport>,
    call_timeout: Duration,
}

impl CanisterBackend {
    pub fn new(transport: Arc<dyn Transport>, call_timeout: Duration) -> Self {
        Self {
            transport,
            call_timeout,
        }
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        agent: &Agent,
        method: &str,
        kind: CallKind,
        args: serde_json::Value,
    ) -> Result<T, BackendError> {
        if agent.endpoint().is_none() {
            return Err(BackendError::Unavailable(format!(
                "{method}: no gateway endpoint resolved"
            )));
        }
        let value = timeout(self.call_timeout, self.transport.call(agent, method, kind, args))
            .await
            .map_err(|_| BackendError::Timeout {
                method: method.to_string(),
            })?
            .map_err(|e| map_transport_error(method, e))?;
        debug!(target: "rpc", method, "decoding reply");
        serde_json::from_value(value).map_err(|e| BackendError::Decode {
            method: method.to_string(),
            message: e.to_string(),
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        agent: &Agent,
        method: &str,
        args: serde_json::Value,
    ) -> Result<T, BackendError> {
        self.invoke(agent, method, CallKind::Query, args).await
    }

    /// Update call whose reply is a `Result` variant.
    async fn update<T: DeserializeOwned>(
        &self,
        agent: &Agent,
        method: &str,
        args: serde_json::Value,
    ) -> Result<T, BackendError> {
        let reply: CallResult<T> = self.invoke(agent, method, CallKind::Update, args).await?;
        reply.into_result().map_err(BackendError::Rejected)
    }
}

fn map_transport_error(method: &str, err: TransportError) -> BackendError {
    match err.kind {
        TransportErrorKind::Timeout => BackendError::Timeout {
            method: method.to_string(),
        },
        TransportErrorKind::Decode => BackendError::Decode {
            method: method.to_string(),
            message: err.message,
        },
        TransportErrorKind::CircuitOpen => BackendError::Unavailable(err.to_string()),
        _ => BackendError::Transport(err.to_string()),
    }
}

#[async_trait]
impl HotelBackend for CanisterBackend {
    async fn get_my_profile(&self, agent: &Agent) -> Result<User, BackendError> {
        self.query(agent, "getMyProfile", json!([])).await
    }

    async fn update_profile(
        &self,
        agent: &Agent,
        is_hotel_owner: bool,
    ) -> Result<String, BackendError> {
        self.update(agent, "updateProfile", json!([is_hotel_owner])).await
    }

    async fn is_hotel_owner(&self, agent: &Agent, user: &Principal) -> Result<bool, BackendError> {
        self.query(agent, "isHotelOwner", json!([user])).await
    }

    async fn get_all_users(&self, agent: &Agent) -> Result<Vec<(Principal, User)>, BackendError> {
        self.query(agent, "getAllUsers", json!([])).await
    }

    async fn add_hotel(&self, agent: &Agent, input: HotelInput) -> Result<u64, BackendError> {
        self.update(agent, "addHotel", json!([input])).await
    }

    async fn update_hotel(
        &self,
        agent: &Agent,
        hotel_id: u64,
        input: HotelInput,
    ) -> Result<String, BackendError> {
        self.update(agent, "updateHotel", json!([hotel_id, input])).await
    }

    async fn delete_hotel(&self, agent: &Agent, hotel_id: u64) -> Result<String, BackendError> {
        self.update(agent, "deleteHotel", json!([hotel_id])).await
    }

    async fn get_hotels(&self, agent: &Agent) -> Result<Vec<Hotel>, BackendError> {
        self.query(agent, "getHotels", json!([])).await
    }

    async fn get_hotel(&self, agent: &Agent, hotel_id: u64) -> Result<Option<Hotel>, BackendError> {
        // opt T arrives as [] or [T]
        let reply: Vec<Hotel> = self.query(agent, "getHotel", json!([hotel_id])).await?;
        Ok(reply.into_iter().next())
    }

    async fn get_my_hotels(&self, agent: &Agent) -> Result<Vec<Hotel>, BackendError> {
        // caller-scoped, so it goes through consensus
        self.invoke(agent, "getMyHotels", CallKind::Update, json!([])).await
    }

    async fn search_hotels(
        &self,
        agent: &Agent,
        location: String,
        min_price: u64,
        max_price: u64,
    ) -> Result<Vec<Hotel>, BackendError> {
        let args = json!([location, min_price, max_price]);
        self.query(agent, "searchHotels", args).await
    }

    async fn book_hotel(&self, agent: &Agent, input: BookingInput) -> Result<u64, BackendError> {
        self.update(agent, "bookHotel", json!([input])).await
    }

    async fn confirm_booking(
        &self,
        agent: &Agent,
        booking_id: u64,
    ) -> Result<String, BackendError> {
        self.update(agent, "confirmBooking", json!([booking_id])).await
    }

    async fn cancel_booking(&self, agent: &Agent, booking_id: u64) -> Result<String, BackendError> {
        self.update(agent, "cancelBooking", json!([booking_id])).await
    }

    async fn complete_booking(
        &self,
        agent: &Agent,
        booking_id: u64,
    ) -> Result<String, BackendError> {
        self.update(agent, "completeBooking", json!([booking_id])).await
    }

    async fn get_my_bookings(&self, agent: &Agent) -> Result<Vec<Booking>, BackendError> {
        self.invoke(agent, "getMyBookings", CallKind::Update, json!([])).await
    }

    async fn get_hotel_bookings(
        &self,
        agent: &Agent,
        hotel_id: u64,
    ) -> Result<Vec<Booking>, BackendError> {
        self.update(agent, "getHotelBookings", json!([hotel_id])).await
    }

    async fn get_booking(
        &self,
        agent: &Agent,
        booking_id: u64,
    ) -> Result<Option<Booking>, BackendError> {
        let reply: Vec<Booking> = self.query(agent, "getBooking", json!([booking_id])).await?;
        Ok(reply.into_iter().next())
    }

    async fn get_all_bookings(&self, agent: &Agent) -> Result<Vec<Booking>, BackendError> {
        self.query(agent, "getAllBookings", json!([])).await
    }

    async fn check_room_availability(
        &self,
        agent: &Agent,
        hotel_id: u64,
        check_in: i64,
        check_out: i64,
        rooms: u64,
    ) -> Result<bool, BackendError> {
        let args = json!([hotel_id, check_in, check_out, rooms]);
        self.query(agent, "checkRoomAvailability", args).await
    }

    async fn add_review(
        &self,
        agent: &Agent,
        hotel_id: u64,
        rating: u64,
        comment: String,
    ) -> Result<u64, BackendError> {
        self.update(agent, "addReview", json!([hotel_id, rating, comment])).await
    }

    async fn get_hotel_reviews(
        &self,
        agent: &Agent,
        hotel_id: u64,
    ) -> Result<Vec<Review>, BackendError> {
        self.query(agent, "getHotelReviews", json!([hotel_id])).await
    }

    async fn get_all_reviews(&self, agent: &Agent) -> Result<Vec<Review>, BackendError> {
        self.query(agent, "getAllReviews", json!([])).await
    }

    async fn get_my_hotel_stats(&self, agent: &Agent) -> Result<HotelStats, BackendError> {
        self.update(agent, "getMyHotelStats", json!([])).await
    }

    async fn get_platform_stats(&self, agent: &Agent) -> Result<PlatformStats, BackendError> {
        self.query(agent, "getPlatformStats", json!([])).await
    }
}
