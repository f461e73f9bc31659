//! Remote call façade: one method per domain operation.
//!
//! Reads never fail from the caller's point of view. A failed read is
//! logged, counted and answered with an empty sentinel. Mutations return a
//! normalized [`ServiceError`]. Every user-scoped operation checks the
//! session first, so an anonymous caller never reaches a backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use muvin_backend_api::{Agent, BackendError, HotelBackend};
use muvin_types::{ErrorKind, Principal};
use muvin_units::{to_minor_units, to_wire_time};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::endpoint::EndpointResolver;
use crate::model::{
    CreateBookingForm, CreateHotelForm, CreateReviewForm, InputError, UiBooking, UiHotel,
    UiHotelStats, UiPlatformStats, UiReview, UiUser,
};
use crate::session::{
    DelegationFileProvider, IdentityProvider, MemoryIdentityProvider, SessionManager,
    SessionSnapshot,
};
use crate::source::{CanisterBackend, FixtureBackend, SourceKind, Sources};
use crate::telemetry::{CallTelemetry, CallTelemetrySummary};
use crate::transform::{
    transform_all, transform_booking, transform_hotel, transform_hotel_stats,
    transform_platform_stats, transform_review, transform_user, TransformError,
};
use crate::transport::{HttpTransport, TransportConfig};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("please sign in to continue")]
    Unauthorized,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Rejected(ErrorKind),
    #[error("the booking service is unavailable ({0})")]
    Unavailable(String),
    #[error("the booking service sent a reply that could not be read")]
    Malformed,
}

impl From<BackendError> for ServiceError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Rejected(kind) => ServiceError::Rejected(kind),
            BackendError::Decode { .. } => ServiceError::Malformed,
            BackendError::Unavailable(msg) | BackendError::Transport(msg) => {
                ServiceError::Unavailable(msg)
            }
            BackendError::Timeout { method } => {
                ServiceError::Unavailable(format!("{method} timed out"))
            }
        }
    }
}

impl From<InputError> for ServiceError {
    fn from(err: InputError) -> Self {
        ServiceError::InvalidInput(err.0)
    }
}

fn failure_label(err: &BackendError) -> &'static str {
    match err {
        BackendError::Unavailable(_) => "unavailable",
        BackendError::Timeout { .. } => "timeout",
        BackendError::Transport(_) => "transport",
        BackendError::Decode { .. } => "decode",
        BackendError::Rejected(kind) => kind.as_str(),
    }
}

pub struct HotelService {
    session: Arc<SessionManager>,
    sources: Sources,
    telemetry: CallTelemetry,
}

impl HotelService {
    pub fn new(session: Arc<SessionManager>, sources: Sources) -> Self {
        Self {
            session,
            sources,
            telemetry: CallTelemetry::default(),
        }
    }

    /// Wires the HTTP transport, endpoint resolver, identity provider and
    /// data sources described by `cfg`. Nothing touches the network until
    /// [`HotelService::init`].
    pub fn from_config(cfg: &ClientConfig) -> Result<Self> {
        let provider: Arc<dyn IdentityProvider> = match &cfg.identity_path {
            Some(path) => Arc::new(DelegationFileProvider::new(
                path.clone(),
                cfg.identity_provider.clone(),
                cfg.login_timeout,
            )),
            None => Arc::new(MemoryIdentityProvider::new()),
        };
        Self::with_identity_provider(cfg, provider)
    }

    /// Like [`HotelService::from_config`] with a caller-supplied identity
    /// provider.
    pub fn with_identity_provider(
        cfg: &ClientConfig,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(TransportConfig::from(cfg))?);
        let resolver = EndpointResolver::new(cfg, transport.clone());
        let session = Arc::new(SessionManager::new(cfg.canister_id.clone(), resolver, provider));
        let live: Arc<dyn HotelBackend> =
            Arc::new(CanisterBackend::new(transport, cfg.call_timeout));
        let fixture: Option<Arc<dyn HotelBackend>> = if cfg.fixture_fallback {
            Some(Arc::new(FixtureBackend::new()))
        } else {
            None
        };

        info!(
            target: "service",
            canister_id = %cfg.canister_id,
            deployment = cfg.deployment.as_str(),
            fixture_fallback = cfg.fixture_fallback,
            "hotel service configured"
        );
        Ok(Self::new(session, Sources::new(live, fixture)))
    }

    pub async fn init(&self) -> SessionSnapshot {
        let resolution = self.session.init().await;
        if resolution.is_degraded() && !self.sources.has_fixture() {
            warn!(
                target: "service",
                "no gateway reachable and fixtures are off; reads will come back empty"
            );
        }
        self.session.snapshot()
    }

    pub async fn login(&self) -> bool {
        self.session.login().await
    }

    pub async fn logout(&self) {
        self.session.logout().await
    }

    pub async fn dispose(&self) {
        self.session.dispose().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn principal(&self) -> String {
        self.session.principal()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn telemetry(&self) -> CallTelemetrySummary {
        self.telemetry.summary()
    }

    async fn agent(&self) -> Agent {
        self.session.init().await;
        self.session.agent()
    }

    async fn authorized_agent(&self, method: &'static str) -> Result<Agent, ServiceError> {
        let agent = self.agent().await;
        if agent.is_authenticated() {
            Ok(agent)
        } else {
            self.telemetry.record_unauthorized();
            info!(target: "service", method, "rejected before calling: not signed in");
            Err(ServiceError::Unauthorized)
        }
    }

    fn invalid(&self, method: &'static str, err: impl Into<ServiceError>) -> ServiceError {
        let err = err.into();
        self.telemetry.record_invalid_input();
        info!(target: "service", method, "rejected before calling: {err}");
        err
    }

    async fn call<T, F, Fut>(
        &self,
        method: &'static str,
        agent: Agent,
        f: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce(Arc<dyn HotelBackend>, Agent) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let (source, backend) = self.sources.pick(&agent);
        if source == SourceKind::Fixture {
            self.telemetry.record_fixture_served();
        }
        let started = Instant::now();
        match f(backend, agent).await {
            Ok(value) => {
                self.telemetry.record_success(started.elapsed());
                debug!(
                    target: "service",
                    method,
                    source = source.as_str(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "call ok"
                );
                Ok(value)
            }
            Err(err) => {
                self.telemetry.record_failure(failure_label(&err), &format!("{method}: {err}"));
                warn!(target: "service", method, source = source.as_str(), "call failed: {err}");
                Err(err.into())
            }
        }
    }

    async fn read<T, F, Fut>(&self, method: &'static str, agent: Agent, f: F) -> Option<T>
    where
        F: FnOnce(Arc<dyn HotelBackend>, Agent) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        // failures were already logged and counted by `call`
        self.call(method, agent, f).await.ok()
    }

    fn convert_all<W, U>(
        &self,
        entity: &'static str,
        items: Vec<W>,
        f: fn(W) -> Result<U, TransformError>,
    ) -> Vec<U> {
        let total = items.len();
        let out = transform_all(entity, items, f);
        self.telemetry.record_malformed((total - out.len()) as u64);
        out
    }

    fn convert_one<W, U>(
        &self,
        entity: &'static str,
        item: W,
        f: fn(W) -> Result<U, TransformError>,
    ) -> Option<U> {
        match f(item) {
            Ok(v) => Some(v),
            Err(err) => {
                self.telemetry.record_malformed(1);
                warn!(target: "transform", entity, "dropping malformed record: {err}");
                None
            }
        }
    }

    // hotels

    pub async fn get_hotels(&self) -> Vec<UiHotel> {
        let agent = self.agent().await;
        let wire = self
            .read("getHotels", agent, |b, a| async move { b.get_hotels(&a).await })
            .await
            .unwrap_or_default();
        self.convert_all("hotel", wire, transform_hotel)
    }

    /// Prices are display amounts. An unconvertible bound yields no results.
    pub async fn search_hotels(
        &self,
        location: &str,
        min_price: f64,
        max_price: f64,
    ) -> Vec<UiHotel> {
        let (min, max) = match (to_minor_units(min_price), to_minor_units(max_price)) {
            (Ok(min), Ok(max)) => (min, max),
            (Err(err), _) | (_, Err(err)) => {
                self.invalid("searchHotels", InputError::from(err));
                return Vec::new();
            }
        };
        let agent = self.agent().await;
        let location = location.trim().to_string();
        let wire = self
            .read("searchHotels", agent, |b, a| async move {
                b.search_hotels(&a, location, min, max).await
            })
            .await
            .unwrap_or_default();
        self.convert_all("hotel", wire, transform_hotel)
    }

    pub async fn get_hotel(&self, hotel_id: u64) -> Option<UiHotel> {
        let agent = self.agent().await;
        let wire = self
            .read("getHotel", agent, |b, a| async move { b.get_hotel(&a, hotel_id).await })
            .await
            .flatten()?;
        self.convert_one("hotel", wire, transform_hotel)
    }

    pub async fn get_my_hotels(&self) -> Vec<UiHotel> {
        let Ok(agent) = self.authorized_agent("getMyHotels").await else {
            return Vec::new();
        };
        let wire = self
            .read("getMyHotels", agent, |b, a| async move { b.get_my_hotels(&a).await })
            .await
            .unwrap_or_default();
        self.convert_all("hotel", wire, transform_hotel)
    }

    pub async fn create_hotel(&self, form: &CreateHotelForm) -> Result<u64, ServiceError> {
        let agent = self.authorized_agent("addHotel").await?;
        let input = form.to_input().map_err(|e| self.invalid("addHotel", e))?;
        self.call("addHotel", agent, |b, a| async move { b.add_hotel(&a, input).await })
            .await
    }

    pub async fn update_hotel(
        &self,
        hotel_id: u64,
        form: &CreateHotelForm,
    ) -> Result<(), ServiceError> {
        let agent = self.authorized_agent("updateHotel").await?;
        let input = form.to_input().map_err(|e| self.invalid("updateHotel", e))?;
        self.call("updateHotel", agent, |b, a| async move {
            b.update_hotel(&a, hotel_id, input).await
        })
        .await
        .map(drop)
    }

    pub async fn delete_hotel(&self, hotel_id: u64) -> Result<(), ServiceError> {
        let agent = self.authorized_agent("deleteHotel").await?;
        self.call("deleteHotel", agent, |b, a| async move { b.delete_hotel(&a, hotel_id).await })
            .await
            .map(drop)
    }

    // bookings

    pub async fn create_booking(&self, form: &CreateBookingForm) -> Result<u64, ServiceError> {
        let agent = self.authorized_agent("bookHotel").await?;
        let input = form.to_input().map_err(|e| self.invalid("bookHotel", e))?;
        self.call("bookHotel", agent, |b, a| async move { b.book_hotel(&a, input).await })
            .await
    }

    pub async fn get_my_bookings(&self) -> Vec<UiBooking> {
        let Ok(agent) = self.authorized_agent("getMyBookings").await else {
            return Vec::new();
        };
        let wire = self
            .read("getMyBookings", agent, |b, a| async move { b.get_my_bookings(&a).await })
            .await
            .unwrap_or_default();
        self.convert_all("booking", wire, transform_booking)
    }

    pub async fn get_hotel_bookings(&self, hotel_id: u64) -> Vec<UiBooking> {
        let Ok(agent) = self.authorized_agent("getHotelBookings").await else {
            return Vec::new();
        };
        let wire = self
            .read("getHotelBookings", agent, |b, a| async move {
                b.get_hotel_bookings(&a, hotel_id).await
            })
            .await
            .unwrap_or_default();
        self.convert_all("booking", wire, transform_booking)
    }

    pub async fn get_booking(&self, booking_id: u64) -> Option<UiBooking> {
        let agent = self.agent().await;
        let wire = self
            .read("getBooking", agent, |b, a| async move { b.get_booking(&a, booking_id).await })
            .await
            .flatten()?;
        self.convert_one("booking", wire, transform_booking)
    }

    pub async fn get_all_bookings(&self) -> Vec<UiBooking> {
        let agent = self.agent().await;
        let wire = self
            .read("getAllBookings", agent, |b, a| async move { b.get_all_bookings(&a).await })
            .await
            .unwrap_or_default();
        self.convert_all("booking", wire, transform_booking)
    }

    pub async fn cancel_booking(&self, booking_id: u64) -> Result<(), ServiceError> {
        let agent = self.authorized_agent("cancelBooking").await?;
        self.call("cancelBooking", agent, |b, a| async move {
            b.cancel_booking(&a, booking_id).await
        })
        .await
        .map(drop)
    }

    pub async fn confirm_booking(&self, booking_id: u64) -> Result<(), ServiceError> {
        let agent = self.authorized_agent("confirmBooking").await?;
        self.call("confirmBooking", agent, |b, a| async move {
            b.confirm_booking(&a, booking_id).await
        })
        .await
        .map(drop)
    }

    pub async fn complete_booking(&self, booking_id: u64) -> Result<(), ServiceError> {
        let agent = self.authorized_agent("completeBooking").await?;
        self.call("completeBooking", agent, |b, a| async move {
            b.complete_booking(&a, booking_id).await
        })
        .await
        .map(drop)
    }

    /// `false` for an empty or inverted stay without asking the backend.
    pub async fn check_availability(
        &self,
        hotel_id: u64,
        check_in: DateTime<Utc>,
        check_out: DateTime<Utc>,
        rooms: u64,
    ) -> bool {
        if rooms == 0 || check_out <= check_in {
            self.invalid(
                "checkRoomAvailability",
                ServiceError::InvalidInput(
                    "stay must cover at least one night and one room".into(),
                ),
            );
            return false;
        }
        let (check_in, check_out) = (to_wire_time(check_in), to_wire_time(check_out));
        let agent = self.agent().await;
        self.read("checkRoomAvailability", agent, |b, a| async move {
            b.check_room_availability(&a, hotel_id, check_in, check_out, rooms)
                .await
        })
        .await
        .unwrap_or(false)
    }

    // reviews

    pub async fn create_review(&self, form: &CreateReviewForm) -> Result<u64, ServiceError> {
        let agent = self.authorized_agent("addReview").await?;
        let (hotel_id, rating, comment) = (form.hotel_id, form.rating, form.comment.clone());
        self.call("addReview", agent, |b, a| async move {
            b.add_review(&a, hotel_id, rating, comment).await
        })
        .await
    }

    pub async fn get_hotel_reviews(&self, hotel_id: u64) -> Vec<UiReview> {
        let agent = self.agent().await;
        let wire = self
            .read("getHotelReviews", agent, |b, a| async move {
                b.get_hotel_reviews(&a, hotel_id).await
            })
            .await
            .unwrap_or_default();
        self.convert_all("review", wire, transform_review)
    }

    pub async fn get_all_reviews(&self) -> Vec<UiReview> {
        let agent = self.agent().await;
        let wire = self
            .read("getAllReviews", agent, |b, a| async move { b.get_all_reviews(&a).await })
            .await
            .unwrap_or_default();
        self.convert_all("review", wire, transform_review)
    }

    // users

    pub async fn get_my_profile(&self) -> Option<UiUser> {
        let agent = self.authorized_agent("getMyProfile").await.ok()?;
        let wire = self
            .read("getMyProfile", agent, |b, a| async move { b.get_my_profile(&a).await })
            .await?;
        self.convert_one("user", wire, transform_user)
    }

    pub async fn update_profile(&self, is_hotel_owner: bool) -> Result<(), ServiceError> {
        let agent = self.authorized_agent("updateProfile").await?;
        self.call("updateProfile", agent, |b, a| async move {
            b.update_profile(&a, is_hotel_owner).await
        })
        .await
        .map(drop)
    }

    /// `false` for text that is not a principal.
    pub async fn is_hotel_owner(&self, principal: &str) -> bool {
        let principal: Principal = match principal.parse() {
            Ok(p) => p,
            Err(err) => {
                self.invalid("isHotelOwner", ServiceError::InvalidInput(err.to_string()));
                return false;
            }
        };
        let agent = self.agent().await;
        self.read("isHotelOwner", agent, |b, a| async move {
            b.is_hotel_owner(&a, &principal).await
        })
        .await
        .unwrap_or(false)
    }

    pub async fn get_all_users(&self) -> Vec<UiUser> {
        let agent = self.agent().await;
        let wire = self
            .read("getAllUsers", agent, |b, a| async move { b.get_all_users(&a).await })
            .await
            .unwrap_or_default();
        let users = wire.into_iter().map(|(_, user)| user).collect();
        self.convert_all("user", users, transform_user)
    }

    // stats

    pub async fn get_platform_stats(&self) -> Option<UiPlatformStats> {
        let agent = self.agent().await;
        let wire = self
            .read("getPlatformStats", agent, |b, a| async move {
                b.get_platform_stats(&a).await
            })
            .await?;
        self.convert_one("platform_stats", wire, transform_platform_stats)
    }

    pub async fn get_my_hotel_stats(&self) -> Option<UiHotelStats> {
        let agent = self.authorized_agent("getMyHotelStats").await.ok()?;
        let wire = self
            .read("getMyHotelStats", agent, |b, a| async move {
                b.get_my_hotel_stats(&a).await
            })
            .await?;
        self.convert_one("hotel_stats", wire, transform_hotel_stats)
    }
}
