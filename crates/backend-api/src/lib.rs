use async_trait::async_trait;
use muvin_types::{
    Booking, BookingInput, ErrorKind, Hotel, HotelInput, HotelStats, Identity, PlatformStats,
    Principal, Review, User,
};
use url::Url;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// No endpoint is reachable for this handle.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("{method} timed out")]
    Timeout { method: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("could not decode {method} response: {message}")]
    Decode { method: String, message: String },
    /// Domain rejection from an `err` variant.
    #[error("rejected: {0}")]
    Rejected(ErrorKind),
}

/// Capability handle for one canister, bound to the caller identity and the
/// resolved gateway endpoint. Cheap to clone; replaced wholesale on login or
/// logout rather than mutated.
#[derive(Debug, Clone)]
pub struct Agent {
    canister_id: String,
    endpoint: Option<Url>,
    identity: Option<Identity>,
}

impl Agent {
    pub fn anonymous(canister_id: impl Into<String>, endpoint: Option<Url>) -> Self {
        Self {
            canister_id: canister_id.into(),
            endpoint,
            identity: None,
        }
    }

    /// Same canister and endpoint, different caller.
    pub fn with_identity(&self, identity: Option<Identity>) -> Self {
        Self {
            identity,
            ..self.clone()
        }
    }

    pub fn canister_id(&self) -> &str {
        &self.canister_id
    }

    /// `None` while the session is degraded.
    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity
            .as_ref()
            .map(|id| !id.principal.is_anonymous())
            .unwrap_or(false)
    }

    pub fn principal(&self) -> Principal {
        self.identity
            .as_ref()
            .map(|id| id.principal.clone())
            .unwrap_or_else(Principal::anonymous)
    }
}

/// The canister interface. One method per remote method; `err` variants are
/// surfaced as [`BackendError::Rejected`].
#[async_trait]
pub trait HotelBackend: Send + Sync {
    // users
    async fn get_my_profile(&self, agent: &Agent) -> Result<User, BackendError>;
    async fn update_profile(&self, agent: &Agent, is_hotel_owner: bool)
        -> Result<String, BackendError>;
    async fn is_hotel_owner(&self, agent: &Agent, user: &Principal) -> Result<bool, BackendError>;
    async fn get_all_users(&self, agent: &Agent) -> Result<Vec<(Principal, User)>, BackendError>;

    // hotels
    async fn add_hotel(&self, agent: &Agent, input: HotelInput) -> Result<u64, BackendError>;
    async fn update_hotel(
        &self,
        agent: &Agent,
        hotel_id: u64,
        input: HotelInput,
    ) -> Result<String, BackendError>;
    async fn delete_hotel(&self, agent: &Agent, hotel_id: u64) -> Result<String, BackendError>;
    async fn get_hotels(&self, agent: &Agent) -> Result<Vec<Hotel>, BackendError>;
    async fn get_hotel(&self, agent: &Agent, hotel_id: u64) -> Result<Option<Hotel>, BackendError>;
    async fn get_my_hotels(&self, agent: &Agent) -> Result<Vec<Hotel>, BackendError>;
    async fn search_hotels(
        &self,
        agent: &Agent,
        location: String,
        min_price: u64,
        max_price: u64,
    ) -> Result<Vec<Hotel>, BackendError>;

    // bookings
    async fn book_hotel(&self, agent: &Agent, input: BookingInput) -> Result<u64, BackendError>;
    async fn confirm_booking(&self, agent: &Agent, booking_id: u64)
        -> Result<String, BackendError>;
    async fn cancel_booking(&self, agent: &Agent, booking_id: u64) -> Result<String, BackendError>;
    async fn complete_booking(
        &self,
        agent: &Agent,
        booking_id: u64,
    ) -> Result<String, BackendError>;
    async fn get_my_bookings(&self, agent: &Agent) -> Result<Vec<Booking>, BackendError>;
    async fn get_hotel_bookings(
        &self,
        agent: &Agent,
        hotel_id: u64,
    ) -> Result<Vec<Booking>, BackendError>;
    async fn get_booking(
        &self,
        agent: &Agent,
        booking_id: u64,
    ) -> Result<Option<Booking>, BackendError>;
    async fn get_all_bookings(&self, agent: &Agent) -> Result<Vec<Booking>, BackendError>;
    async fn check_room_availability(
        &self,
        agent: &Agent,
        hotel_id: u64,
        check_in: i64,
        check_out: i64,
        rooms: u64,
    ) -> Result<bool, BackendError>;

    // reviews
    async fn add_review(
        &self,
        agent: &Agent,
        hotel_id: u64,
        rating: u64,
        comment: String,
    ) -> Result<u64, BackendError>;
    async fn get_hotel_reviews(
        &self,
        agent: &Agent,
        hotel_id: u64,
    ) -> Result<Vec<Review>, BackendError>;
    async fn get_all_reviews(&self, agent: &Agent) -> Result<Vec<Review>, BackendError>;

    // stats
    async fn get_my_hotel_stats(&self, agent: &Agent) -> Result<HotelStats, BackendError>;
    async fn get_platform_stats(&self, agent: &Agent) -> Result<PlatformStats, BackendError>;
}
