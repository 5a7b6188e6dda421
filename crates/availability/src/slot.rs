use chrono::{NaiveDate, NaiveTime};
use common::{BookingId, SalonId, ServiceId, SlotId, StaffId};
use serde::{Deserialize, Serialize};

/// A bookable time slot.
///
/// `booked == true` always comes with `booking_id == Some(..)`; the stores
/// only set both together in [`finalize`](crate::SlotStore::finalize).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub salon_id: SalonId,
    pub staff_id: Option<StaffId>,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub available: bool,
    pub booked: bool,
    pub booking_id: Option<BookingId>,
}

impl Slot {
    /// Creates an open (available, unbooked) slot.
    pub fn open(
        salon_id: SalonId,
        service_id: ServiceId,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: u32,
    ) -> Self {
        Self {
            id: SlotId::new(),
            salon_id,
            staff_id: None,
            service_id,
            date,
            time,
            duration_minutes,
            available: true,
            booked: false,
            booking_id: None,
        }
    }

    /// Assigns the slot to a staff member.
    pub fn with_staff(mut self, staff_id: StaffId) -> Self {
        self.staff_id = Some(staff_id);
        self
    }

    /// Marks the slot as withdrawn from sale.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Returns true if the slot may be locked or offered, ignoring locks.
    pub fn is_open(&self) -> bool {
        self.available && !self.booked
    }
}

/// Filter for [`SlotStore::get_available`](crate::SlotStore::get_available).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotQuery {
    pub salon_id: SalonId,
    pub date: NaiveDate,
    pub service_id: Option<ServiceId>,
}

impl SlotQuery {
    pub fn new(salon_id: SalonId, date: NaiveDate) -> Self {
        Self {
            salon_id,
            date,
            service_id: None,
        }
    }

    /// Restricts results to one service.
    pub fn service(mut self, service_id: ServiceId) -> Self {
        self.service_id = Some(service_id);
        self
    }

    /// Returns true if the slot matches the salon/date/service filter.
    pub fn matches(&self, slot: &Slot) -> bool {
        slot.salon_id == self.salon_id
            && slot.date == self.date
            && self.service_id.is_none_or(|s| s == slot.service_id)
    }
}

/// Outcome of [`SlotStore::finalize`](crate::SlotStore::finalize).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The slot is now booked by the given booking.
    Finalized,
    /// The slot was already booked; carries the current owner.
    AlreadyBooked { booking_id: Option<BookingId> },
    /// No such slot.
    NotFound,
}

/// Outcome of [`SlotStore::release_slot`](crate::SlotStore::release_slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRelease {
    /// The slot was booked by the booking and is now free.
    Released,
    /// The slot was not booked by that booking; nothing changed.
    NotHeld,
}
