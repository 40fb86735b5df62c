//! # Sync Task
//!
//! The task behind a [`SyncClient`](crate::SyncClient) handle. It owns the height range being
//! synced, spawns a [fetch worker](crate::fetch) per height and hands fetched headers to the
//! consensus engine strictly in height order, one at a time.
use std::{cmp::max, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
};
use tracing::instrument;

use cadence_types::{
    CommittedHeader, Height, ReplayedHeaderRequest, ReplayedHeaderResponse, TxDecoder, Unmarshaler,
};

use crate::{
    fetch::{fetch_height, FetchShared, FetchedHeight},
    replay_queue::ReplayQueue,
    transport::SyncTransport,
};

/// A command sent from a [`SyncClient`](crate::SyncClient) handle to its task.
#[derive(Debug)]
pub(crate) enum SyncCommand {
    ResumeFetching {
        start: Height,
        stop: Height,
        resp: oneshot::Sender<bool>,
    },
}

/// The heights a sync task is working through.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct SyncRange {
    /// The next height to hand to the consensus engine.
    pub(crate) next_to_replay: Height,
    /// The next height to spawn a fetch worker for.
    pub(crate) next_to_fetch: Height,
    /// The end of the range, exclusive.
    pub(crate) stop: Height,
}

impl SyncRange {
    /// Returns `true` once every height in the range has been replayed.
    pub(crate) const fn is_complete(&self) -> bool {
        self.next_to_replay >= self.stop
    }

    /// Merges `[start, stop)` into the current range, returning `false` if it can't be merged.
    ///
    /// While a range is being worked on, a new range may overlap or directly follow it, which
    /// extends the range. Once a range is complete any range is accepted, but heights that were
    /// already replayed are never fetched again.
    pub(crate) fn merge(range: &mut Option<Self>, start: Height, stop: Height) -> bool {
        if start >= stop {
            return false;
        }

        let Some(current) = range else {
            *range = Some(Self {
                next_to_replay: start,
                next_to_fetch: start,
                stop,
            });
            return true;
        };

        if current.is_complete() {
            let next = max(start, current.next_to_replay);
            *current = Self {
                next_to_replay: next,
                next_to_fetch: next,
                stop: max(stop, next),
            };
            return true;
        }

        if start > current.stop {
            return false;
        }

        current.stop = max(current.stop, stop);
        true
    }
}

/// Why a replay could not be handed to the consensus engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ReplayFailure {
    /// The engine is no longer receiving replay requests.
    OutputClosed,
    /// The engine dropped the request without answering it.
    ResponseDropped,
}

/// A replay request that has been sent, or is being sent, to the consensus engine.
struct PendingReplay {
    height: Height,
    /// Kept so the header can be sent again if the engine drops the request.
    committed: CommittedHeader,
    fut: BoxFuture<'static, Result<ReplayedHeaderResponse, ReplayFailure>>,
}

/// The sync task.
pub(crate) struct SyncTask<T, U, D: TxDecoder> {
    shared: Arc<FetchShared<U, D>>,
    transport: T,

    replayed_headers_out: mpsc::Sender<ReplayedHeaderRequest>,
    command_rx: mpsc::Receiver<SyncCommand>,

    range: Option<SyncRange>,
    /// Fetch workers, one per height.
    fetch_tasks: JoinSet<Option<FetchedHeight>>,
    /// Fetched heights waiting for their turn to be replayed.
    replay_queue: ReplayQueue,
    pending_replay: Option<PendingReplay>,
}

impl<T, U, D> SyncTask<T, U, D>
where
    T: SyncTransport,
    U: Unmarshaler,
    D: TxDecoder,
{
    pub(crate) fn new(
        shared: Arc<FetchShared<U, D>>,
        transport: T,
        replayed_headers_out: mpsc::Sender<ReplayedHeaderRequest>,
        command_rx: mpsc::Receiver<SyncCommand>,
    ) -> Self {
        Self {
            shared,
            transport,
            replayed_headers_out,
            command_rx,
            range: None,
            fetch_tasks: JoinSet::new(),
            replay_queue: ReplayQueue::default(),
            pending_replay: None,
        }
    }

    /// Runs the sync task until the sync client is shut down or the consensus engine stops
    /// receiving replays.
    #[instrument(level = "info", name = "sync_client", skip_all)]
    pub(crate) async fn run(mut self) {
        tracing::debug!("Starting sync task.");

        loop {
            self.spawn_fetch_tasks();
            self.start_next_replay();

            let pending_replay = futures::future::OptionFuture::from(
                self.pending_replay.as_mut().map(|pending| &mut pending.fut),
            );

            tokio::select! {
                biased;
                () = self.shared.cancellation_token.cancelled() => {
                    tracing::debug!("Sync client shut down.");
                    break;
                }
                Some(res) = pending_replay => {
                    if !self.handle_replay_res(res) {
                        break;
                    }
                }
                Some(res) = self.fetch_tasks.join_next() => {
                    match res {
                        Ok(Some(fetched)) => self.replay_queue.push(fetched.height, fetched.committed),
                        Ok(None) => (),
                        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                        Err(e) => tracing::debug!("Fetch task stopped: {e}"),
                    }
                }
                Some(command) = self.command_rx.recv() => self.handle_command(command),
            }
        }

        self.shared.peer_pool.close();
        self.fetch_tasks.shutdown().await;
    }

    fn handle_command(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::ResumeFetching { start, stop, resp } => {
                let accepted = SyncRange::merge(&mut self.range, start, stop);

                if accepted {
                    tracing::debug!(start, stop, range = ?self.range, "Resuming fetching.");
                } else {
                    tracing::debug!(start, stop, range = ?self.range, "Rejected fetch range.");
                }

                drop(resp.send(accepted));
            }
        }
    }

    /// Spawns fetch workers for every height in the fetch window that doesn't have one.
    fn spawn_fetch_tasks(&mut self) {
        let Some(range) = &mut self.range else {
            return;
        };

        let window_end = range
            .next_to_replay
            .saturating_add(self.shared.config.in_flight_heights())
            .min(range.stop);

        while range.next_to_fetch < window_end {
            let height = range.next_to_fetch;
            tracing::trace!(height, "Spawning fetch task.");

            self.fetch_tasks.spawn(fetch_height(
                Arc::clone(&self.shared),
                self.transport.clone(),
                height,
            ));
            range.next_to_fetch += 1;
        }
    }

    /// Sends the next height to the consensus engine, if it has been fetched and no other
    /// replay is waiting on the engine.
    fn start_next_replay(&mut self) {
        if self.pending_replay.is_some() {
            return;
        }

        let Some(range) = &self.range else {
            return;
        };

        let height = range.next_to_replay;
        let Some(committed) = self.replay_queue.pop_next(height) else {
            return;
        };

        tracing::debug!(height, "Replaying header.");

        let (resp, resp_rx) = oneshot::channel();
        let req = ReplayedHeaderRequest {
            header: committed.header.clone(),
            proof: committed.proof.clone(),
            resp,
        };
        let replayed_headers_out = self.replayed_headers_out.clone();

        let fut = async move {
            replayed_headers_out
                .send(req)
                .await
                .map_err(|_| ReplayFailure::OutputClosed)?;

            resp_rx.await.map_err(|_| ReplayFailure::ResponseDropped)
        }
        .boxed();

        self.pending_replay = Some(PendingReplay {
            height,
            committed,
            fut,
        });
    }

    /// Handles the end of a replay, returns `false` if the task should stop.
    fn handle_replay_res(&mut self, res: Result<ReplayedHeaderResponse, ReplayFailure>) -> bool {
        let Some(PendingReplay {
            height, committed, ..
        }) = self.pending_replay.take()
        else {
            unreachable!("a replay result can only come from a pending replay");
        };

        match res {
            Ok(ReplayedHeaderResponse { err: Some(e) }) => {
                tracing::warn!(height, "Consensus engine failed to replay header: {e}");
            }
            Ok(ReplayedHeaderResponse { err: None }) => {
                tracing::debug!(height, "Header replayed.");
            }
            Err(ReplayFailure::ResponseDropped) => {
                tracing::debug!(height, "Consensus engine dropped replay request, sending it again.");
                self.replay_queue.push(height, committed);
                return true;
            }
            Err(ReplayFailure::OutputClosed) => {
                tracing::warn!("Consensus engine stopped receiving replayed headers, stopping sync.");
                return false;
            }
        }

        if let Some(range) = &mut self.range {
            range.next_to_replay = height + 1;
        }

        true
    }
}
