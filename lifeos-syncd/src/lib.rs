pub mod credentials;
pub mod daemon;
pub mod dbus_api;
pub mod store;
pub mod sync;
