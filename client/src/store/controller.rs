use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Action, Collection, Field, Item, Patch, Slot, Store};
use crate::model::{CreateBookingForm, CreateHotelForm, CreateReviewForm, UiBookingStatus};
use crate::service::{HotelService, ServiceError};

/// Drives the façade and feeds the results into the store.
pub struct AppController {
    service: Arc<HotelService>,
    store: Arc<Store>,
    refresh_running: AtomicBool,
    refresh_pending: AtomicBool,
}

impl AppController {
    pub fn new(service: Arc<HotelService>, store: Arc<Store>) -> Self {
        Self {
            service,
            store,
            refresh_running: AtomicBool::new(false),
            refresh_pending: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn service(&self) -> &Arc<HotelService> {
        &self.service
    }

    /// Initializes the session and loads the first snapshot.
    pub async fn start(&self) {
        let session = self.service.init().await;
        self.store.dispatch(Action::SetField(Field::Session(session)));
        self.refresh().await;
    }

    pub async fn login(&self) -> bool {
        if !self.service.login().await {
            return false;
        }
        self.sync_session();
        self.refresh().await;
        true
    }

    /// Drops to anonymous and forgets everything tied to the old identity.
    pub async fn logout(&self) {
        self.service.logout().await;
        for slot in [Slot::Bookings, Slot::MyHotels, Slot::Profile, Slot::OwnerStats] {
            self.store.invalidate(slot);
        }
        self.store
            .dispatch(Action::SetCollection(Collection::Bookings(Vec::new())));
        self.store
            .dispatch(Action::SetCollection(Collection::MyHotels(Vec::new())));
        self.store.dispatch(Action::SetField(Field::Profile(None)));
        self.store.dispatch(Action::SetField(Field::OwnerStats(None)));
        self.sync_session();
        self.refresh().await;
    }

    fn sync_session(&self) {
        self.store
            .dispatch(Action::SetField(Field::Session(self.service.snapshot())));
    }

    /// Reloads public data, plus user data when signed in. A call that
    /// arrives while a pass is running schedules one more pass and returns.
    pub async fn refresh(&self) {
        if self.refresh_running.swap(true, Ordering::SeqCst) {
            self.refresh_pending.store(true, Ordering::SeqCst);
            debug!(target: "store", "refresh already running; coalesced");
            return;
        }
        loop {
            self.refresh_pending.store(false, Ordering::SeqCst);
            self.refresh_pass().await;
            if self.refresh_pending.load(Ordering::SeqCst) {
                continue;
            }
            self.refresh_running.store(false, Ordering::SeqCst);
            // a trigger may have slipped in between the check and the release
            if self.refresh_pending.load(Ordering::SeqCst)
                && !self.refresh_running.swap(true, Ordering::SeqCst)
            {
                continue;
            }
            break;
        }
    }

    async fn refresh_pass(&self) {
        self.store.dispatch(Action::SetField(Field::Loading(true)));
        let authenticated = self.service.is_authenticated();

        let hotels = self.store.begin(Slot::Hotels);
        let stats = self.store.begin(Slot::Stats);
        let (hotel_list, platform) =
            tokio::join!(self.service.get_hotels(), self.service.get_platform_stats());
        self.store
            .dispatch_if_current(hotels, Action::SetCollection(Collection::Hotels(hotel_list)));
        self.store
            .dispatch_if_current(stats, Action::SetField(Field::Stats(platform)));

        if authenticated {
            let bookings = self.store.begin(Slot::Bookings);
            let my_hotels = self.store.begin(Slot::MyHotels);
            let profile = self.store.begin(Slot::Profile);
            let owner_stats = self.store.begin(Slot::OwnerStats);
            let (booking_list, owned, user, mine) = tokio::join!(
                self.service.get_my_bookings(),
                self.service.get_my_hotels(),
                self.service.get_my_profile(),
                self.service.get_my_hotel_stats(),
            );
            self.store.dispatch_if_current(
                bookings,
                Action::SetCollection(Collection::Bookings(booking_list)),
            );
            self.store
                .dispatch_if_current(my_hotels, Action::SetCollection(Collection::MyHotels(owned)));
            self.store
                .dispatch_if_current(profile, Action::SetField(Field::Profile(user)));
            self.store
                .dispatch_if_current(owner_stats, Action::SetField(Field::OwnerStats(mine)));
        }

        self.sync_session();
        self.store.dispatch(Action::SetField(Field::Loading(false)));
    }

    /// Marks the booking cancelled right away and rolls back if the
    /// backend refuses.
    pub async fn cancel_booking(&self, booking_id: u64) -> bool {
        let previous = self
            .store
            .state()
            .bookings
            .iter()
            .find(|b| b.id == booking_id)
            .map(|b| b.status);

        // a fetch already in flight would resurrect the old status
        self.store.invalidate(Slot::Bookings);
        self.store.dispatch(Action::UpdateItem(Patch::BookingStatus {
            id: booking_id,
            status: UiBookingStatus::Cancelled,
        }));

        match self.service.cancel_booking(booking_id).await {
            Ok(()) => {
                info!(target: "store", booking_id, "booking cancelled");
                true
            }
            Err(err) => {
                if let Some(status) = previous {
                    self.store.dispatch(Action::UpdateItem(Patch::BookingStatus {
                        id: booking_id,
                        status,
                    }));
                }
                self.report(err);
                false
            }
        }
    }

    pub async fn book_hotel(&self, form: &CreateBookingForm) -> Option<u64> {
        let id = match self.service.create_booking(form).await {
            Ok(id) => id,
            Err(err) => {
                self.report(err);
                return None;
            }
        };
        match self.service.get_booking(id).await {
            Some(booking) => self.store.dispatch(Action::AppendItem(Item::Booking(booking))),
            None => self.reload_bookings().await,
        }
        Some(id)
    }

    pub async fn create_hotel(&self, form: &CreateHotelForm) -> Option<u64> {
        let id = match self.service.create_hotel(form).await {
            Ok(id) => id,
            Err(err) => {
                self.report(err);
                return None;
            }
        };
        if let Some(hotel) = self.service.get_hotel(id).await {
            self.store.dispatch(Action::AppendItem(Item::Hotel(hotel.clone())));
            self.store.dispatch(Action::AppendItem(Item::MyHotel(hotel)));
        } else {
            warn!(target: "store", hotel_id = id, "new hotel not readable yet");
        }
        Some(id)
    }

    pub async fn add_review(&self, form: &CreateReviewForm) -> Option<u64> {
        match self.service.create_review(form).await {
            Ok(id) => {
                self.load_reviews(form.hotel_id).await;
                Some(id)
            }
            Err(err) => {
                self.report(err);
                None
            }
        }
    }

    pub async fn load_reviews(&self, hotel_id: u64) {
        let token = self.store.begin(Slot::Reviews);
        let reviews = self.service.get_hotel_reviews(hotel_id).await;
        self.store
            .dispatch_if_current(token, Action::SetCollection(Collection::Reviews(reviews)));
    }

    async fn reload_bookings(&self) {
        let token = self.store.begin(Slot::Bookings);
        let bookings = self.service.get_my_bookings().await;
        self.store
            .dispatch_if_current(token, Action::SetCollection(Collection::Bookings(bookings)));
    }

    pub fn dismiss_error(&self) {
        self.store.dispatch(Action::ClearError);
    }

    fn report(&self, err: ServiceError) {
        warn!(target: "store", "operation failed: {err}");
        self.store.dispatch(Action::SetError(err.to_string()));
    }
}
