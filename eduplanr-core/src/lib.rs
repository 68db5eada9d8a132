mod client;
mod oauth;

pub use client::{
    ApiErrorClass, BatchResult, Collection, DEFAULT_BASE_URL, EduPlanrClient, EduPlanrError,
    PushAccepted, PushRecord, PushRejected, RemoteDocument, RemotePage,
};
pub use oauth::{OAuthClient, OAuthError, OAuthToken};
