pub mod ids;
pub mod registry;

pub use registry::{
    Platform, ProviderCategory, ProviderDescriptor, SyncMode, UnknownSyncMode, all, describe,
};
