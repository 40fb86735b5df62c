use cadence_types::{SyncRequest, SyncResponse};

/// The peer-to-peer transport the sync client sends its requests over.
///
/// This trait is a trait-alias, so you can't implement it yourself, implement
/// [`tower::Service<SyncRequest>`] instead.
///
/// Each in-flight height gets its own clone of the transport.
pub trait SyncTransport:
    tower::Service<
        SyncRequest,
        Response = SyncResponse,
        Error = tower::BoxError,
        Future: Send + 'static,
    > + Clone
    + Send
    + 'static
{
}

impl<T> SyncTransport for T where
    T: tower::Service<
            SyncRequest,
            Response = SyncResponse,
            Error = tower::BoxError,
            Future: Send + 'static,
        > + Clone
        + Send
        + 'static
{
}
