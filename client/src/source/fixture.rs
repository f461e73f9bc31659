//! In-memory stand-in for the canister, served when no gateway is reachable.
//!
//! Reads are deterministic. Mutations apply to process-local state and hand
//! out synthetic ids starting at [`FIRST_SYNTHETIC_ID`]. Seeded bookings have
//! no real owner: they show up as the caller's own bookings so a degraded
//! session still has something to render.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use muvin_backend_api::{Agent, BackendError, HotelBackend};
use muvin_types::{
    Booking, BookingInput, BookingStatus, ErrorKind, Hotel, HotelInput, HotelStats,
    PlatformStats, Principal, Review, User,
};
use muvin_units::{nights_between, E8S_PER_TOKEN};
use tracing::{debug, warn};

use crate::session::now_ns;

pub const FIRST_SYNTHETIC_ID: u64 = 1000;

const NS_PER_SEC: i64 = 1_000_000_000;

// 2024-06-01T00:00:00Z
const SEED_CREATED_AT: i64 = 1_717_200_000 * NS_PER_SEC;

struct SeedHotel {
    name: &'static str,
    location: &'static str,
    description: &'static str,
    price_tokens: u64,
    total_rooms: u64,
    available_rooms: u64,
    amenities: &'static [&'static str],
    image: &'static str,
    owner: &'static str,
    rating: f64,
    review_count: u64,
}

const SEED_HOTELS: [SeedHotel; 4] = [
    SeedHotel {
        name: "Cyber Palace Hotel",
        location: "Neo Tokyo, Japan",
        description: "Luxury futuristic hotel in the heart of the digital district",
        price_tokens: 150,
        total_rooms: 50,
        available_rooms: 12,
        amenities: &["WiFi", "Pool", "Spa", "Restaurant", "Gym"],
        image: "https://images.unsplash.com/photo-1566073771259-6a8506099945?w=800",
        owner: "rdmx6-jaaaa-aaaaa-aaadq-cai",
        rating: 4.8,
        review_count: 127,
    },
    SeedHotel {
        name: "Blockchain Heights",
        location: "Singapore",
        description: "High-tech accommodation with stunning city views",
        price_tokens: 200,
        total_rooms: 30,
        available_rooms: 8,
        amenities: &["WiFi", "Rooftop Bar", "Business Center", "Concierge"],
        image: "https://images.unsplash.com/photo-1551882547-ff40c63fe5fa?w=800",
        owner: "qaa6y-5yaaa-aaaaa-aaafa-cai",
        rating: 4.9,
        review_count: 89,
    },
    SeedHotel {
        name: "Quantum Resort",
        location: "Zurich, Switzerland",
        description: "Peaceful retreat with cutting-edge amenities",
        price_tokens: 300,
        total_rooms: 75,
        available_rooms: 25,
        amenities: &["WiFi", "Spa", "Ski Access", "Fine Dining", "Wellness Center"],
        image: "https://images.unsplash.com/photo-1582719478250-c89cae4dc85b?w=800",
        owner: "rdmx6-jaaaa-aaaaa-aaadq-cai",
        rating: 4.7,
        review_count: 203,
    },
    SeedHotel {
        name: "Neon Nights Hotel",
        location: "Los Angeles, USA",
        description: "Vibrant urban hotel with immersive experiences",
        price_tokens: 120,
        total_rooms: 60,
        available_rooms: 15,
        amenities: &["WiFi", "Pool", "Gaming Lounge", "Restaurant", "Event Spaces"],
        image: "https://images.unsplash.com/photo-1564501049412-61c2a3083791?w=800",
        owner: "qaa6y-5yaaa-aaaaa-aaafa-cai",
        rating: 4.6,
        review_count: 156,
    },
];

// (hotel id, check-in s, check-out s, rooms, total tokens, status, created s)
const SEED_BOOKINGS: [(u64, i64, i64, u64, u64, BookingStatus, i64); 3] = [
    (1, 1_734_220_800, 1_734_480_000, 1, 450, BookingStatus::Active, 1_733_011_200),
    (2, 1_732_060_800, 1_732_320_000, 2, 600, BookingStatus::Completed, 1_731_196_800),
    (3, 1_728_518_400, 1_728_691_200, 1, 600, BookingStatus::Cancelled, 1_727_222_400),
];

// (hotel id, reviewer, rating, comment)
const SEED_REVIEWS: [(u64, &str, u64, &str); 3] = [
    (1, "qaa6y-5yaaa-aaaaa-aaafa-cai", 5, "Holographic concierge was a highlight."),
    (1, "rdmx6-jaaaa-aaaaa-aaadq-cai", 4, "Great views, the pool gets crowded."),
    (2, "rdmx6-jaaaa-aaaaa-aaadq-cai", 5, "Rooftop bar alone is worth the stay."),
];

fn seed_principal(text: &str) -> Principal {
    text.parse().unwrap_or_else(|err| {
        warn!(target: "fixture", principal = text, "bad seed principal: {err}");
        Principal::anonymous()
    })
}

#[derive(Default)]
struct FixtureState {
    hotels: Vec<Hotel>,
    bookings: Vec<Booking>,
    reviews: Vec<Review>,
    users: BTreeMap<Principal, User>,
}

impl FixtureState {
    fn seeded() -> Self {
        let hotels: Vec<Hotel> = SEED_HOTELS
            .iter()
            .zip(1u64..)
            .map(|(seed, id)| Hotel {
                id,
                name: seed.name.to_string(),
                location: seed.location.to_string(),
                description: seed.description.to_string(),
                total_rooms: seed.total_rooms,
                available_rooms: seed.available_rooms,
                price_per_night: seed.price_tokens * E8S_PER_TOKEN,
                owner: seed_principal(seed.owner),
                amenities: seed.amenities.iter().map(|a| a.to_string()).collect(),
                images: vec![seed.image.to_string()],
                rating: seed.rating,
                review_count: seed.review_count,
                created_at: SEED_CREATED_AT,
            })
            .collect();

        let bookings = SEED_BOOKINGS
            .iter()
            .zip(1u64..)
            .map(|(&(hotel_id, check_in, check_out, rooms, total, status, created), id)| {
                let check_in = check_in * NS_PER_SEC;
                let check_out = check_out * NS_PER_SEC;
                Booking {
                    id,
                    hotel_id,
                    hotel_name: hotels
                        .iter()
                        .find(|h| h.id == hotel_id)
                        .map(|h| h.name.clone())
                        .unwrap_or_default(),
                    // anonymous marks a seeded booking that every caller sees as theirs
                    booked_by: Principal::anonymous(),
                    check_in,
                    check_out,
                    nights: nights_between(check_in, check_out).max(0) as u64,
                    rooms_booked: rooms,
                    total_price: total * E8S_PER_TOKEN,
                    status,
                    created_at: created * NS_PER_SEC,
                }
            })
            .collect();

        let reviews = SEED_REVIEWS
            .iter()
            .zip(1u64..)
            .map(|(&(hotel_id, reviewer, rating, comment), id)| Review {
                id,
                hotel_id,
                reviewed_by: seed_principal(reviewer),
                rating,
                comment: comment.to_string(),
                created_at: SEED_CREATED_AT,
            })
            .collect();

        Self {
            hotels,
            bookings,
            reviews,
            users: BTreeMap::new(),
        }
    }

    fn hotel_mut(&mut self, id: u64) -> Result<&mut Hotel, BackendError> {
        self.hotels
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or(BackendError::Rejected(ErrorKind::NotFound))
    }

    fn bookings_of(&self, caller: &Principal) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|b| b.booked_by == *caller || b.booked_by.is_anonymous())
            .map(|b| Booking {
                booked_by: caller.clone(),
                ..b.clone()
            })
            .collect()
    }

    fn profile(&mut self, caller: &Principal) -> User {
        let total_bookings = self.bookings_of(caller).len() as u64;
        let owns_hotels = self.hotels.iter().any(|h| h.owner == *caller);
        let user = self.users.entry(caller.clone()).or_insert_with(|| User {
            principal: caller.clone(),
            is_hotel_owner: false,
            total_bookings: 0,
            joined_at: now_ns(),
        });
        user.total_bookings = total_bookings;
        user.is_hotel_owner |= owns_hotels;
        user.clone()
    }
}

/// Deterministic [`HotelBackend`] used in degraded mode, demos and tests.
pub struct FixtureBackend {
    state: Mutex<FixtureState>,
    next_id: AtomicU64,
}

impl Default for FixtureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FixtureState::seeded()),
            next_id: AtomicU64::new(FIRST_SYNTHETIC_ID),
        }
    }

    /// Starts with no hotels, bookings or reviews.
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(FixtureState::default()),
            next_id: AtomicU64::new(FIRST_SYNTHETIC_ID),
        }
    }

    fn state(&self) -> MutexGuard<'_, FixtureState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    target: "fixture",
                    "fixture state mutex poisoned; continuing with last state"
                );
                poisoned.into_inner()
            }
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn caller(agent: &Agent) -> Result<Principal, BackendError> {
        if agent.is_authenticated() {
            Ok(agent.principal())
        } else {
            Err(BackendError::Rejected(ErrorKind::Unauthorized))
        }
    }

    fn set_status(
        &self,
        agent: &Agent,
        booking_id: u64,
        next: BookingStatus,
    ) -> Result<String, BackendError> {
        let caller = Self::caller(agent)?;
        let mut state = self.state();
        let idx = state
            .bookings
            .iter()
            .position(|b| b.id == booking_id)
            .ok_or(BackendError::Rejected(ErrorKind::NotFound))?;
        let booking = state.bookings[idx].clone();
        let hotel_owner = state
            .hotels
            .iter()
            .find(|h| h.id == booking.hotel_id)
            .map(|h| h.owner.clone());

        let guest = booking.booked_by == caller || booking.booked_by.is_anonymous();
        let owner = hotel_owner.as_ref() == Some(&caller);
        let allowed = match next {
            BookingStatus::Cancelled => guest || owner,
            _ => owner,
        };
        if !allowed {
            return Err(BackendError::Rejected(ErrorKind::Unauthorized));
        }

        let legal = matches!(
            (booking.status, next),
            (BookingStatus::Pending, BookingStatus::Active)
                | (BookingStatus::Pending | BookingStatus::Active, BookingStatus::Cancelled)
                | (BookingStatus::Active, BookingStatus::Completed)
        );
        if !legal {
            return Err(BackendError::Rejected(ErrorKind::BookingConflict));
        }

        state.bookings[idx].status = next;
        if next == BookingStatus::Cancelled {
            if let Ok(hotel) = state.hotel_mut(booking.hotel_id) {
                hotel.available_rooms =
                    (hotel.available_rooms + booking.rooms_booked).min(hotel.total_rooms);
            }
        }
        debug!(target: "fixture", booking_id, status = next.as_str(), "booking status changed");
        Ok(format!("Booking {} is now {}", booking_id, next.as_str()))
    }
}

#[async_trait]
impl HotelBackend for FixtureBackend {
    async fn get_my_profile(&self, agent: &Agent) -> Result<User, BackendError> {
        let caller = Self::caller(agent)?;
        Ok(self.state().profile(&caller))
    }

    async fn update_profile(
        &self,
        agent: &Agent,
        is_hotel_owner: bool,
    ) -> Result<String, BackendError> {
        let caller = Self::caller(agent)?;
        let mut state = self.state();
        state.profile(&caller);
        if let Some(user) = state.users.get_mut(&caller) {
            user.is_hotel_owner = is_hotel_owner;
        }
        Ok("Profile updated".to_string())
    }

    async fn is_hotel_owner(&self, _agent: &Agent, user: &Principal) -> Result<bool, BackendError> {
        let state = self.state();
        Ok(state.users.get(user).map(|u| u.is_hotel_owner).unwrap_or(false)
            || state.hotels.iter().any(|h| h.owner == *user))
    }

    async fn get_all_users(&self, _agent: &Agent) -> Result<Vec<(Principal, User)>, BackendError> {
        Ok(self
            .state()
            .users
            .iter()
            .map(|(p, u)| (p.clone(), u.clone()))
            .collect())
    }

    async fn add_hotel(&self, agent: &Agent, input: HotelInput) -> Result<u64, BackendError> {
        let caller = Self::caller(agent)?;
        if input.name.trim().is_empty() || input.total_rooms == 0 {
            return Err(BackendError::Rejected(ErrorKind::InvalidInput));
        }
        let id = self.next_id();
        let mut state = self.state();
        state.hotels.push(Hotel {
            id,
            name: input.name,
            location: input.location,
            description: input.description,
            total_rooms: input.total_rooms,
            available_rooms: input.total_rooms,
            price_per_night: input.price_per_night,
            owner: caller.clone(),
            amenities: input.amenities,
            images: input.images,
            rating: 0.0,
            review_count: 0,
            created_at: now_ns(),
        });
        state.profile(&caller);
        debug!(target: "fixture", hotel_id = id, "hotel added");
        Ok(id)
    }

    async fn update_hotel(
        &self,
        agent: &Agent,
        hotel_id: u64,
        input: HotelInput,
    ) -> Result<String, BackendError> {
        let caller = Self::caller(agent)?;
        let mut state = self.state();
        let hotel = state.hotel_mut(hotel_id)?;
        if hotel.owner != caller {
            return Err(BackendError::Rejected(ErrorKind::Unauthorized));
        }
        let booked = hotel.total_rooms - hotel.available_rooms;
        if input.total_rooms < booked {
            return Err(BackendError::Rejected(ErrorKind::InvalidInput));
        }
        hotel.name = input.name;
        hotel.location = input.location;
        hotel.description = input.description;
        hotel.available_rooms = input.total_rooms - booked;
        hotel.total_rooms = input.total_rooms;
        hotel.price_per_night = input.price_per_night;
        hotel.amenities = input.amenities;
        hotel.images = input.images;
        Ok("Hotel updated".to_string())
    }

    async fn delete_hotel(&self, agent: &Agent, hotel_id: u64) -> Result<String, BackendError> {
        let caller = Self::caller(agent)?;
        let mut state = self.state();
        if state.hotel_mut(hotel_id)?.owner != caller {
            return Err(BackendError::Rejected(ErrorKind::Unauthorized));
        }
        state.hotels.retain(|h| h.id != hotel_id);
        Ok("Hotel deleted".to_string())
    }

    async fn get_hotels(&self, _agent: &Agent) -> Result<Vec<Hotel>, BackendError> {
        Ok(self.state().hotels.clone())
    }

    async fn get_hotel(
        &self,
        _agent: &Agent,
        hotel_id: u64,
    ) -> Result<Option<Hotel>, BackendError> {
        Ok(self.state().hotels.iter().find(|h| h.id == hotel_id).cloned())
    }

    async fn get_my_hotels(&self, agent: &Agent) -> Result<Vec<Hotel>, BackendError> {
        let caller = Self::caller(agent)?;
        Ok(self
            .state()
            .hotels
            .iter()
            .filter(|h| h.owner == caller)
            .cloned()
            .collect())
    }

    async fn search_hotels(
        &self,
        _agent: &Agent,
        location: String,
        min_price: u64,
        max_price: u64,
    ) -> Result<Vec<Hotel>, BackendError> {
        let wanted = location.trim().to_lowercase();
        Ok(self
            .state()
            .hotels
            .iter()
            .filter(|h| wanted.is_empty() || h.location.to_lowercase().contains(&wanted))
            .filter(|h| (min_price..=max_price).contains(&h.price_per_night))
            .cloned()
            .collect())
    }

    async fn book_hotel(&self, agent: &Agent, input: BookingInput) -> Result<u64, BackendError> {
        let caller = Self::caller(agent)?;
        if input.rooms_booked == 0 || input.check_out <= input.check_in {
            return Err(BackendError::Rejected(ErrorKind::InvalidInput));
        }
        let nights = nights_between(input.check_in, input.check_out).max(1) as u64;

        let mut state = self.state();
        let hotel = state.hotel_mut(input.hotel_id)?;
        if hotel.available_rooms < input.rooms_booked {
            return Err(BackendError::Rejected(ErrorKind::InsufficientRooms));
        }
        let total_price = hotel
            .price_per_night
            .checked_mul(nights)
            .and_then(|p| p.checked_mul(input.rooms_booked))
            .ok_or(BackendError::Rejected(ErrorKind::InvalidInput))?;
        hotel.available_rooms -= input.rooms_booked;
        let hotel_name = hotel.name.clone();

        let id = self.next_id();
        state.bookings.push(Booking {
            id,
            hotel_id: input.hotel_id,
            hotel_name,
            booked_by: caller,
            check_in: input.check_in,
            check_out: input.check_out,
            nights,
            rooms_booked: input.rooms_booked,
            total_price,
            status: BookingStatus::Pending,
            created_at: now_ns(),
        });
        debug!(target: "fixture", booking_id = id, hotel_id = input.hotel_id, "booking recorded");
        Ok(id)
    }

    async fn confirm_booking(
        &self,
        agent: &Agent,
        booking_id: u64,
    ) -> Result<String, BackendError> {
        self.set_status(agent, booking_id, BookingStatus::Active)
    }

    async fn cancel_booking(&self, agent: &Agent, booking_id: u64) -> Result<String, BackendError> {
        self.set_status(agent, booking_id, BookingStatus::Cancelled)
    }

    async fn complete_booking(
        &self,
        agent: &Agent,
        booking_id: u64,
    ) -> Result<String, BackendError> {
        self.set_status(agent, booking_id, BookingStatus::Completed)
    }

    async fn get_my_bookings(&self, agent: &Agent) -> Result<Vec<Booking>, BackendError> {
        let caller = Self::caller(agent)?;
        Ok(self.state().bookings_of(&caller))
    }

    async fn get_hotel_bookings(
        &self,
        agent: &Agent,
        hotel_id: u64,
    ) -> Result<Vec<Booking>, BackendError> {
        let caller = Self::caller(agent)?;
        let mut state = self.state();
        if state.hotel_mut(hotel_id)?.owner != caller {
            return Err(BackendError::Rejected(ErrorKind::Unauthorized));
        }
        Ok(state
            .bookings
            .iter()
            .filter(|b| b.hotel_id == hotel_id)
            .cloned()
            .collect())
    }

    async fn get_booking(
        &self,
        _agent: &Agent,
        booking_id: u64,
    ) -> Result<Option<Booking>, BackendError> {
        Ok(self.state().bookings.iter().find(|b| b.id == booking_id).cloned())
    }

    async fn get_all_bookings(&self, _agent: &Agent) -> Result<Vec<Booking>, BackendError> {
        Ok(self.state().bookings.clone())
    }

    async fn check_room_availability(
        &self,
        _agent: &Agent,
        hotel_id: u64,
        check_in: i64,
        check_out: i64,
        rooms: u64,
    ) -> Result<bool, BackendError> {
        if rooms == 0 || check_out <= check_in {
            return Ok(false);
        }
        Ok(self
            .state()
            .hotels
            .iter()
            .find(|h| h.id == hotel_id)
            .map(|h| h.available_rooms >= rooms)
            .unwrap_or(false))
    }

    async fn add_review(
        &self,
        agent: &Agent,
        hotel_id: u64,
        rating: u64,
        comment: String,
    ) -> Result<u64, BackendError> {
        let caller = Self::caller(agent)?;
        if !(1..=5).contains(&rating) {
            return Err(BackendError::Rejected(ErrorKind::InvalidInput));
        }
        let mut state = self.state();
        let hotel = state.hotel_mut(hotel_id)?;
        let count = hotel.review_count as f64;
        hotel.rating = (hotel.rating * count + rating as f64) / (count + 1.0);
        hotel.review_count += 1;

        let id = self.next_id();
        state.reviews.push(Review {
            id,
            hotel_id,
            reviewed_by: caller,
            rating,
            comment,
            created_at: now_ns(),
        });
        Ok(id)
    }

    async fn get_hotel_reviews(
        &self,
        _agent: &Agent,
        hotel_id: u64,
    ) -> Result<Vec<Review>, BackendError> {
        Ok(self
            .state()
            .reviews
            .iter()
            .filter(|r| r.hotel_id == hotel_id)
            .cloned()
            .collect())
    }

    async fn get_all_reviews(&self, _agent: &Agent) -> Result<Vec<Review>, BackendError> {
        Ok(self.state().reviews.clone())
    }

    async fn get_my_hotel_stats(&self, agent: &Agent) -> Result<HotelStats, BackendError> {
        let caller = Self::caller(agent)?;
        let state = self.state();
        let mine: Vec<&Hotel> = state.hotels.iter().filter(|h| h.owner == caller).collect();
        let live = state.bookings.iter().filter(|b| {
            b.status != BookingStatus::Cancelled && mine.iter().any(|h| h.id == b.hotel_id)
        });
        let (total_bookings, total_revenue) =
            live.fold((0u64, 0u64), |(n, sum), b| (n + 1, sum.saturating_add(b.total_price)));
        let avg_rating = if mine.is_empty() {
            0.0
        } else {
            mine.iter().map(|h| h.rating).sum::<f64>() / mine.len() as f64
        };
        Ok(HotelStats {
            total_bookings,
            total_revenue,
            avg_rating,
        })
    }

    async fn get_platform_stats(&self, _agent: &Agent) -> Result<PlatformStats, BackendError> {
        let state = self.state();
        Ok(PlatformStats {
            total_hotels: state.hotels.len() as u64,
            total_bookings: state.bookings.len() as u64,
            total_users: state.users.len() as u64,
        })
    }
}
