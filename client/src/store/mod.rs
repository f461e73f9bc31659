//! Application state: one snapshot, a closed action set and a pure reducer.
//!
//! [`Store`] is the only owner of the snapshot and publishes every change
//! over a watch channel. Responses to async requests carry a [`Token`];
//! a token superseded by a newer request for the same slot, or by an explicit
//! invalidation, is dropped instead of overwriting fresher state.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::model::{
    UiBooking, UiBookingStatus, UiHotel, UiHotelStats, UiPlatformStats, UiReview, UiUser,
};
use crate::session::SessionSnapshot;

pub mod controller;
pub use controller::AppController;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppState {
    pub session: SessionSnapshot,
    pub hotels: Vec<UiHotel>,
    pub my_hotels: Vec<UiHotel>,
    pub bookings: Vec<UiBooking>,
    /// Reviews of the hotel last opened.
    pub reviews: Vec<UiReview>,
    pub profile: Option<UiUser>,
    pub stats: Option<UiPlatformStats>,
    pub owner_stats: Option<UiHotelStats>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Collection {
    Hotels(Vec<UiHotel>),
    MyHotels(Vec<UiHotel>),
    Bookings(Vec<UiBooking>),
    Reviews(Vec<UiReview>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Hotel(UiHotel),
    MyHotel(UiHotel),
    Booking(UiBooking),
    Review(UiReview),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    BookingStatus { id: u64, status: UiBookingStatus },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Session(SessionSnapshot),
    Profile(Option<UiUser>),
    Stats(Option<UiPlatformStats>),
    OwnerStats(Option<UiHotelStats>),
    Loading(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetCollection(Collection),
    /// Appends, or replaces the entry with the same id.
    AppendItem(Item),
    UpdateItem(Patch),
    SetField(Field),
    SetError(String),
    ClearError,
}

fn upsert<T>(items: &mut Vec<T>, item: T, id: impl Fn(&T) -> u64) {
    let key = id(&item);
    match items.iter_mut().find(|existing| id(existing) == key) {
        Some(slot) => *slot = item,
        None => items.push(item),
    }
}

pub fn reduce(mut state: AppState, action: Action) -> AppState {
    match action {
        Action::SetCollection(collection) => match collection {
            Collection::Hotels(v) => state.hotels = v,
            Collection::MyHotels(v) => state.my_hotels = v,
            Collection::Bookings(v) => state.bookings = v,
            Collection::Reviews(v) => state.reviews = v,
        },
        Action::AppendItem(item) => match item {
            Item::Hotel(h) => upsert(&mut state.hotels, h, |h| h.id),
            Item::MyHotel(h) => upsert(&mut state.my_hotels, h, |h| h.id),
            Item::Booking(b) => upsert(&mut state.bookings, b, |b| b.id),
            Item::Review(r) => upsert(&mut state.reviews, r, |r| r.id),
        },
        Action::UpdateItem(Patch::BookingStatus { id, status }) => {
            if let Some(b) = state.bookings.iter_mut().find(|b| b.id == id) {
                b.status = status;
            }
        }
        Action::SetField(field) => match field {
            Field::Session(s) => state.session = s,
            Field::Profile(p) => state.profile = p,
            Field::Stats(s) => state.stats = s,
            Field::OwnerStats(s) => state.owner_stats = s,
            Field::Loading(l) => state.loading = l,
        },
        Action::SetError(message) => state.error = Some(message),
        Action::ClearError => state.error = None,
    }
    state
}

/// Independently fetched parts of the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Hotels,
    MyHotels,
    Bookings,
    Reviews,
    Profile,
    Stats,
    OwnerStats,
}

impl Slot {
    const COUNT: usize = 7;

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    slot: Slot,
    generation: u64,
}

pub struct Store {
    tx: watch::Sender<AppState>,
    generations: [AtomicU64; Slot::COUNT],
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AppState::default());
        Self {
            tx,
            generations: Default::default(),
        }
    }

    pub fn state(&self) -> AppState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }

    pub fn dispatch(&self, action: Action) {
        self.tx.send_modify(|state| *state = reduce(std::mem::take(state), action));
    }

    /// Starts a request for `slot`; earlier tokens for it become stale.
    pub fn begin(&self, slot: Slot) -> Token {
        let generation = self.generations[slot.index()].fetch_add(1, Ordering::SeqCst) + 1;
        Token { slot, generation }
    }

    /// Marks every outstanding request for `slot` as stale.
    pub fn invalidate(&self, slot: Slot) {
        self.generations[slot.index()].fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, token: Token) -> bool {
        self.generations[token.slot.index()].load(Ordering::SeqCst) == token.generation
    }

    /// Applies `action` only if `token` is still the latest for its slot.
    pub fn dispatch_if_current(&self, token: Token, action: Action) -> bool {
        let applied = self.tx.send_if_modified(|state| {
            if !self.is_current(token) {
                return false;
            }
            *state = reduce(std::mem::take(state), action);
            true
        });
        if !applied {
            debug!(target: "store", slot = ?token.slot, "dropping stale response");
        }
        applied
    }
}
