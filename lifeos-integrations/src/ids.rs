pub const APP_ID_BASE: &str = "org.lifeos";

pub const DBUS_NAME_SYNC: &str = "org.lifeos.Sync1";
pub const DBUS_INTERFACE_SYNC: &str = "org.lifeos.Sync1";
pub const DBUS_OBJECT_PATH_SYNC: &str = "/org/lifeos/Sync1";

pub const DBUS_ERROR_NOT_FOUND: &str = "org.lifeos.Sync1.Error.NotFound";
pub const DBUS_ERROR_BUSY: &str = "org.lifeos.Sync1.Error.Busy";
pub const DBUS_ERROR_NOT_CONNECTED: &str = "org.lifeos.Sync1.Error.NotConnected";
pub const DBUS_ERROR_INVALID_ARGUMENT: &str = "org.lifeos.Sync1.Error.InvalidArgument";
pub const DBUS_ERROR_FAILED: &str = "org.lifeos.Sync1.Error.Failed";

pub const PROVIDER_EDUPLANR: &str = "eduplanr";
pub const PROVIDER_GOOGLE_CALENDAR: &str = "google-calendar";
pub const PROVIDER_GOOGLE_CONTACTS: &str = "google-contacts";
pub const PROVIDER_EXCHANGE_RATES: &str = "exchange-rates";
pub const PROVIDER_MEDIA_LOOKUP: &str = "media-lookup";
