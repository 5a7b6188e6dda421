//! Booking saga for salon appointment slots.
//!
//! The saga reserves a slot, prices the requested services, records the
//! booking and finalizes the slot:
//! 1. Acquire the slot lock
//! 2. Validate the slot
//! 3. Price services
//! 4. Record the `PENDING` booking
//! 5. Finalize the slot
//! 6. Confirm the booking
//!
//! If any step fails, acquired resources are compensated in reverse order.
//! Every step is recorded as a [`SagaEvent`] so a saga can be rebuilt with
//! [`SagaInstance::replay`].

pub mod aggregate;
pub mod cancellation;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod log;
pub mod queries;
pub mod reconciler;
pub mod services;
pub mod state;
pub mod steps;

pub use aggregate::{CompensationRecord, SagaInstance};
pub use config::{ReconcilerConfig, SagaConfig};
pub use coordinator::{BookingCoordinator, CreateBooking};
pub use error::{BookingError, ErrorKind, Result};
pub use events::SagaEvent;
pub use log::{InMemorySagaLog, PostgresSagaLog, SagaLog, SagaLogError};
pub use reconciler::{PendingBookingReconciler, ReconcileReport};
pub use services::{
    Catalog, CatalogError, HttpCatalog, HttpNotificationSink, InMemoryCatalog,
    InMemoryNotificationSink, LogNotificationSink, Notification, NotificationError,
    NotificationKind, NotificationSink, ServiceInfo,
};
pub use state::SagaState;
