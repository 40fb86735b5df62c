//! `async` related

//---------------------------------------------------------------------------------------------------- Use
use std::future::Future;

use futures::channel::oneshot;
use tokio_util::sync::CancellationToken;

//---------------------------------------------------------------------------------------------------- rayon_spawn_async
/// Spawns a task for the rayon thread pool and awaits the result without blocking the async runtime.
pub async fn rayon_spawn_async<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    rayon::spawn(move || {
        drop(tx.send(f()));
    });
    rx.await.expect("The sender must not be dropped")
}

//---------------------------------------------------------------------------------------------------- until_cancelled
/// Drives `fut` until it completes or `token` is cancelled.
///
/// Returns [`None`] if the token was cancelled first, `fut` is dropped in that case.
/// A token that is already cancelled always wins, even against a ready future.
pub async fn until_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = token.cancelled() => None,
        res = fut => Some(res),
    }
}
