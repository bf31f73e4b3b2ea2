//! USBODE Protocol Client
//!
//! This crate provides the client layer a presentation front end drives:
//!
//! - [`CatalogClient`]: item-count and list queries
//! - [`DiscSelector`]: set-active command plus the believed active entry
//! - [`Session`]: owns the bus, the attached [`DeviceHandle`] and its catalog
//!
//! # Lifecycle
//!
//! ```text
//! connect() --> DeviceHandle(address, empty catalog)
//! refresh() --> catalog replaced, active marker cleared
//! activate() --> active marker set on success
//! any communication failure --> device dropped, DeviceLost
//! ```
//!
//! No call is retried. Every failure is returned immediately and the
//! presentation layer decides whether to scan again.
//!
//! # Example
//!
//! ```rust,no_run
//! use usbode_client::Session;
//! use usbode_detect::Transport;
//!
//! fn mount_first<T: Transport>(transport: T) -> Result<(), usbode_client::ClientError> {
//!     let mut session = Session::new(transport);
//!     session.connect()?;
//!
//!     let first = session.refresh()?.iter().next().cloned();
//!     if let Some(entry) = first {
//!         session.activate_entry(&entry)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod error;
pub mod events;
pub mod selector;
pub mod session;

pub use catalog::{CatalogClient, ItemCount};
pub use error::{ClientError, CommunicationFailure};
pub use events::SessionEvent;
pub use selector::DiscSelector;
pub use session::{DeviceHandle, Session, SessionConfig};
