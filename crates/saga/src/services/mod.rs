//! Ports to the external collaborators the saga calls.

pub mod catalog;
pub mod notification;

pub use catalog::{Catalog, CatalogError, HttpCatalog, InMemoryCatalog, ServiceInfo};
pub use notification::{
    HttpNotificationSink, InMemoryNotificationSink, LogNotificationSink, Notification,
    NotificationError, NotificationKind, NotificationSink,
};
