#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use muvin_backend_api::{Agent, BackendError, HotelBackend};
use muvin_client::config::ClientConfig;
use muvin_client::endpoint::EndpointResolver;
use muvin_client::session::{IdentityProvider, MemoryIdentityProvider, SessionManager};
use muvin_client::source::{FixtureBackend, Sources};
use muvin_client::transport::Handshake;
use muvin_client::HotelService;
use muvin_types::{
    Booking, BookingInput, Hotel, HotelInput, HotelStats, Identity, PlatformStats, Principal,
    Review, User,
};
use url::Url;

pub const CANISTER_ID: &str = "rrkah-fqaaa-aaaaa-aaaaq-cai";
pub const GUEST: &str = "aaaaa-aa";

pub struct Unreachable;

#[async_trait]
impl Handshake for Unreachable {
    async fn fetch_root_key(&self, _endpoint: &Url) -> anyhow::Result<Vec<u8>> {
        bail!("connection refused")
    }
}

/// Fixture backend that records every method it serves and can stall
/// selected methods after the data has been read.
pub struct RecordingBackend {
    inner: FixtureBackend,
    calls: Mutex<Vec<&'static str>>,
    stalls: Mutex<Vec<(&'static str, Duration)>>,
}

impl RecordingBackend {
    pub fn new(inner: FixtureBackend) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(Vec::new()),
            stalls: Mutex::new(Vec::new()),
        })
    }

    pub fn stall(&self, method: &'static str, delay: Duration) {
        self.stalls.lock().unwrap().push((method, delay));
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|m| **m == method).count()
    }

    async fn served<T>(
        &self,
        method: &'static str,
        result: Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        self.calls.lock().unwrap().push(method);
        let delay = self
            .stalls
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl HotelBackend for RecordingBackend {
    async fn get_my_profile(&self, agent: &Agent) -> Result<User, BackendError> {
        let r = self.inner.get_my_profile(agent).await;
        self.served("getMyProfile", r).await
    }

    async fn update_profile(
        &self,
        agent: &Agent,
        is_hotel_owner: bool,
    ) -> Result<String, BackendError> {
        let r = self.inner.update_profile(agent, is_hotel_owner).await;
        self.served("updateProfile", r).await
    }

    async fn is_hotel_owner(&self, agent: &Agent, user: &Principal) -> Result<bool, BackendError> {
        let r = self.inner.is_hotel_owner(agent, user).await;
        self.served("isHotelOwner", r).await
    }

    async fn get_all_users(&self, agent: &Agent) -> Result<Vec<(Principal, User)>, BackendError> {
        let r = self.inner.get_all_users(agent).await;
        self.served("getAllUsers", r).await
    }

    async fn add_hotel(&self, agent: &Agent, input: HotelInput) -> Result<u64, BackendError> {
        let r = self.inner.add_hotel(agent, input).await;
        self.served("addHotel", r).await
    }

    async fn update_hotel(
        &self,
        agent: &Agent,
        hotel_id: u64,
        input: HotelInput,
    ) -> Result<String, BackendError> {
        let r = self.inner.update_hotel(agent, hotel_id, input).await;
        self.served("updateHotel", r).await
    }

    async fn delete_hotel(&self, agent: &Agent, hotel_id: u64) -> Result<String, BackendError> {
        let r = self.inner.delete_hotel(agent, hotel_id).await;
        self.served("deleteHotel", r).await
    }

    async fn get_hotels(&self, agent: &Agent) -> Result<Vec<Hotel>, BackendError> {
        let r = self.inner.get_hotels(agent).await;
        self.served("getHotels", r).await
    }

    async fn get_hotel(&self, agent: &Agent, hotel_id: u64) -> Result<Option<Hotel>, BackendError> {
        let r = self.inner.get_hotel(agent, hotel_id).await;
        self.served("getHotel", r).await
    }

    async fn get_my_hotels(&self, agent: &Agent) -> Result<Vec<Hotel>, BackendError> {
        let r = self.inner.get_my_hotels(agent).await;
        self.served("getMyHotels", r).await
    }

    async fn search_hotels(
        &self,
        agent: &Agent,
        location: String,
        min_price: u64,
        max_price: u64,
    ) -> Result<Vec<Hotel>, BackendError> {
        let r = self.inner.search_hotels(agent, location, min_price, max_price).await;
        self.served("searchHotels", r).await
    }

    async fn book_hotel(&self, agent: &Agent, input: BookingInput) -> Result<u64, BackendError> {
        let r = self.inner.book_hotel(agent, input).await;
        self.served("bookHotel", r).await
    }

    async fn confirm_booking(
        &self,
        agent: &Agent,
        booking_id: u64,
    ) -> Result<String, BackendError> {
        let r = self.inner.confirm_booking(agent, booking_id).await;
        self.served("confirmBooking", r).await
    }

    async fn cancel_booking(&self, agent: &Agent, booking_id: u64) -> Result<String, BackendError> {
        let r = self.inner.cancel_booking(agent, booking_id).await;
        self.served("cancelBooking", r).await
    }

    async fn complete_booking(
        &self,
        agent: &Agent,
        booking_id: u64,
    ) -> Result<String, BackendError> {
        let r = self.inner.complete_booking(agent, booking_id).await;
        self.served("completeBooking", r).await
    }

    async fn get_my_bookings(&self, agent: &Agent) -> Result<Vec<Booking>, BackendError> {
        let r = self.inner.get_my_bookings(agent).await;
        self.served("getMyBookings", r).await
    }

    async fn get_hotel_bookings(
        &self,
        agent: &Agent,
        hotel_id: u64,
    ) -> Result<Vec<Booking>, BackendError> {
        let r = self.inner.get_hotel_bookings(agent, hotel_id).await;
        self.served("getHotelBookings", r).await
    }

    async fn get_booking(
        &self,
        agent: &Agent,
        booking_id: u64,
    ) -> Result<Option<Booking>, BackendError> {
        let r = self.inner.get_booking(agent, booking_id).await;
        self.served("getBooking", r).await
    }

    async fn get_all_bookings(&self, agent: &Agent) -> Result<Vec<Booking>, BackendError> {
        let r = self.inner.get_all_bookings(agent).await;
        self.served("getAllBookings", r).await
    }

    async fn check_room_availability(
        &self,
        agent: &Agent,
        hotel_id: u64,
        check_in: i64,
        check_out: i64,
        rooms: u64,
    ) -> Result<bool, BackendError> {
        let r = self
            .inner
            .check_room_availability(agent, hotel_id, check_in, check_out, rooms)
            .await;
        self.served("checkRoomAvailability", r).await
    }

    async fn add_review(
        &self,
        agent: &Agent,
        hotel_id: u64,
        rating: u64,
        comment: String,
    ) -> Result<u64, BackendError> {
        let r = self.inner.add_review(agent, hotel_id, rating, comment).await;
        self.served("addReview", r).await
    }

    async fn get_hotel_reviews(
        &self,
        agent: &Agent,
        hotel_id: u64,
    ) -> Result<Vec<Review>, BackendError> {
        let r = self.inner.get_hotel_reviews(agent, hotel_id).await;
        self.served("getHotelReviews", r).await
    }

    async fn get_all_reviews(&self, agent: &Agent) -> Result<Vec<Review>, BackendError> {
        let r = self.inner.get_all_reviews(agent).await;
        self.served("getAllReviews", r).await
    }

    async fn get_my_hotel_stats(&self, agent: &Agent) -> Result<HotelStats, BackendError> {
        let r = self.inner.get_my_hotel_stats(agent).await;
        self.served("getMyHotelStats", r).await
    }

    async fn get_platform_stats(&self, agent: &Agent) -> Result<PlatformStats, BackendError> {
        let r = self.inner.get_platform_stats(agent).await;
        self.served("getPlatformStats", r).await
    }
}

pub fn guest_identity() -> Identity {
    Identity::new(GUEST.parse::<Principal>().unwrap())
}

/// A degraded session whose every call lands on `backend`.
pub fn service_over(
    backend: Arc<RecordingBackend>,
    provider: Arc<dyn IdentityProvider>,
) -> Arc<HotelService> {
    let resolver = EndpointResolver::new(&ClientConfig::local(), Arc::new(Unreachable));
    let session = Arc::new(SessionManager::new(CANISTER_ID, resolver, provider));
    Arc::new(HotelService::new(session, Sources::live_only(backend)))
}

/// Provider that signs in as [`GUEST`] on every login.
pub fn guest_provider() -> Arc<MemoryIdentityProvider> {
    Arc::new(MemoryIdentityProvider::with_identity(guest_identity()))
}
