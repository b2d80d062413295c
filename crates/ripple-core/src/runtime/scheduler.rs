//! Suspended cell work.
//!
//! Deferred values and generator steps are turned into futures that resolve
//! to a [`Continuation`]. Each continuation carries the sequence number the
//! cell had when it suspended; the runtime applies it only if that number is
//! still current.
//!
//! A cell has at most one live task. Scheduling newer work for the same cell,
//! or cancelling it, aborts the previous task through its [`AbortHandle`], so
//! a superseded future that never resolves cannot keep the scheduler busy.

use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use futures::StreamExt;
use futures::future::{AbortHandle, Abortable, Aborted, BoxFuture};
use futures::stream::FuturesUnordered;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::graph::CellKey;
use crate::program::{Deferred, Generator, Yield};

pub(crate) struct Continuation {
    pub key: CellKey,
    pub sequence: u64,
    pub resumption: Resumption,
}

pub(crate) enum Resumption {
    /// A deferred program result settled.
    Settled(Result<Value, String>),
    /// A generator item is ready. `Ok(None)` is a skipped item.
    Step {
        item: Result<Option<Value>, String>,
        rest: Generator,
    },
}

#[derive(Default)]
pub(crate) struct Scheduler {
    tasks: FuturesUnordered<BoxFuture<'static, Result<Continuation, Aborted>>>,
    /// The live task of each cell, with the sequence it was scheduled for.
    live: FxHashMap<CellKey, (u64, AbortHandle)>,
}

impl Scheduler {
    /// Number of cells with live suspended work.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn defer(&mut self, key: CellKey, sequence: u64, deferred: Deferred) {
        self.push(key, sequence, async move {
            Continuation {
                key,
                sequence,
                resumption: Resumption::Settled(deferred.await),
            }
        });
    }

    /// Wait for a pulled generator item, then hand the generator back.
    pub fn step(
        &mut self,
        key: CellKey,
        sequence: u64,
        item: Yield,
        rest: Generator,
        throttle: Duration,
    ) {
        self.push(key, sequence, async move {
            let item = match item {
                Yield::Deferred(deferred) => deferred.await.map(Some),
                Yield::Value(value) => {
                    tokio::time::sleep(throttle).await;
                    Ok(Some(value))
                }
                Yield::Undefined => {
                    tokio::time::sleep(throttle).await;
                    Ok(None)
                }
            };
            Continuation {
                key,
                sequence,
                resumption: Resumption::Step { item, rest },
            }
        });
    }

    /// Abort the cell's live task, if any.
    pub fn cancel(&mut self, key: CellKey) {
        if let Some((sequence, handle)) = self.live.remove(&key) {
            handle.abort();
            tracing::trace!(cell = %key, sequence, "aborted suspended work");
        }
    }

    fn push<F>(&mut self, key: CellKey, sequence: u64, task: F)
    where
        F: Future<Output = Continuation> + Send + 'static,
    {
        let (handle, registration) = AbortHandle::new_pair();
        if let Some((_, previous)) = self.live.insert(key, (sequence, handle)) {
            previous.abort();
        }
        self.tasks.push(Abortable::new(task, registration).boxed());
    }

    /// Next continuation to resume, or `None` when nothing is outstanding.
    /// Aborted tasks are skipped.
    pub async fn next(&mut self) -> Option<Continuation> {
        while let Some(outcome) = self.tasks.next().await {
            let Ok(continuation) = outcome else {
                continue;
            };
            let finished = self
                .live
                .get(&continuation.key)
                .is_some_and(|(sequence, _)| *sequence == continuation.sequence);
            if finished {
                self.live.remove(&continuation.key);
            }
            return Some(continuation);
        }
        None
    }
}
