use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use common::{BookingId, Money, SalonId, ServiceId, SlotId, UserId};
use serde::{Deserialize, Serialize};

use crate::{BookingStatus, LedgerError, Result};

/// A service line captured at booking time.
///
/// The price is a snapshot; later catalog changes never touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingItem {
    pub service_id: ServiceId,
    pub service_name: String,
    pub price: Money,
    pub duration_minutes: u32,
}

/// A booking record and its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub customer_id: UserId,
    pub salon_id: SalonId,
    pub slot_id: SlotId,
    pub status: BookingStatus,
    pub total_amount: Money,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub notes: Option<String>,
    pub items: Vec<BookingItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Sum of the item durations.
    pub fn total_duration_minutes(&self) -> u32 {
        self.items.iter().map(|i| i.duration_minutes).sum()
    }
}

/// Input to [`LedgerTransaction::insert`](crate::LedgerTransaction::insert).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub id: BookingId,
    pub customer_id: UserId,
    pub salon_id: SalonId,
    pub slot_id: SlotId,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub notes: Option<String>,
    pub items: Vec<BookingItem>,
}

impl NewBooking {
    /// Rejects empty bookings, repeated services and unrepresentable totals.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(LedgerError::EmptyBooking);
        }
        let mut seen = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            if !seen.insert(item.service_id) {
                return Err(LedgerError::DuplicateService(item.service_id));
            }
            if item.price.is_negative() {
                return Err(LedgerError::InvalidAmount(format!(
                    "service {} is priced at {}",
                    item.service_id, item.price
                )));
            }
        }
        if Money::checked_sum(self.items.iter().map(|i| i.price)).is_none() {
            return Err(LedgerError::InvalidAmount("total overflows".to_string()));
        }
        Ok(())
    }

    pub fn total_amount(&self) -> Money {
        self.items.iter().map(|i| i.price).sum()
    }

    /// Builds the stored `PENDING` record.
    pub fn into_pending(self, now: DateTime<Utc>) -> Booking {
        let total_amount = self.total_amount();
        Booking {
            id: self.id,
            customer_id: self.customer_id,
            salon_id: self.salon_id,
            slot_id: self.slot_id,
            status: BookingStatus::Pending,
            total_amount,
            booking_date: self.booking_date,
            booking_time: self.booking_time,
            notes: self.notes,
            items: self.items,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Optional filters for salon booking listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalonBookingFilter {
    pub status: Option<BookingStatus>,
    pub date: Option<NaiveDate>,
}

impl SalonBookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.status.is_none_or(|s| s == booking.status)
            && self.date.is_none_or(|d| d == booking.booking_date)
    }
}
