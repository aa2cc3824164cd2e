//! Demonstration handlers served by the daemon.
//!
//! The `person` action exposes a small in-memory table through every call
//! style a grid client needs: paged and sorted reads, lookups, and batched
//! create, update and destroy. It doubles as an executable example of how to
//! register handlers with [`batchrpc`].

mod person;

use std::sync::Arc;

use batchrpc::{RegistryBuilder, RegistryError};

pub use self::person::{Person, PersonDraft, PersonStore, STATES};

/// View that hides contact details from directory listings.
pub const DIRECTORY_VIEW: &str = "directory";

/// Registers the demonstration handlers on `builder` over a freshly seeded
/// table.
///
/// # Errors
///
/// Returns [`RegistryError`] when a handler or view clashes with one already
/// on the builder.
pub fn install(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    install_with(builder, Arc::new(PersonStore::seeded()))
}

/// Registers the demonstration handlers over `store`.
///
/// # Errors
///
/// Same as [`install`].
pub fn install_with(
    builder: &mut RegistryBuilder,
    store: Arc<PersonStore>,
) -> Result<(), RegistryError> {
    builder.register_view(DIRECTORY_VIEW, ["id", "firstName", "lastName", "state"])?;
    person::register(builder, &store)
}
