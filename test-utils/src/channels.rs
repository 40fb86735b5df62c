//! Helpers for asserting on channels in async tests.
use std::{fmt::Debug, time::Duration};

use tokio::{sync::mpsc, time::timeout};

use cadence_types::{ReplayedHeaderRequest, ReplayedHeaderResponse};

/// How long [`receive_soon`] waits before failing the test.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives the next item from `rx`, failing the test if it doesn't arrive within
/// [`RECEIVE_TIMEOUT`] or the channel closes.
pub async fn receive_soon<T>(rx: &mut mpsc::Receiver<T>) -> T {
    timeout(RECEIVE_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting to receive")
        .expect("channel closed")
}

/// Fails the test if anything arrives on `rx` within `wait`.
pub async fn assert_not_receiving<T: Debug>(rx: &mut mpsc::Receiver<T>, wait: Duration) {
    if let Ok(Some(item)) = timeout(wait, rx.recv()).await {
        panic!("unexpectedly received {item:?}");
    }
}

/// Answers a replay request successfully, returning the replayed header's height.
pub fn ack_replay(req: ReplayedHeaderRequest) -> u64 {
    let height = req.header.height;
    req.resp
        .send(ReplayedHeaderResponse::default())
        .expect("sync client dropped the replay response channel");
    height
}
