//! Record streams and the plumbing between them.
//!
//! A [`RecordStream`] is lazy and pull-based: nothing upstream is read until
//! something downstream polls, so a slow consumer pauses its producers. The
//! only buffers are the bounded channels created by [`fork`] and
//! [`decouple`].

use crate::core::FileRecord;
use crate::errors::{BuildError, BuildResult};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace};

/// A sequence of file records, or the first error that ended it.
pub type RecordStream = BoxStream<'static, BuildResult<FileRecord>>;

/// Default capacity of the bounded channels between pipeline tasks.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Wraps a list of records in a stream.
#[must_use]
pub fn from_records(records: Vec<FileRecord>) -> RecordStream {
    stream::iter(records.into_iter().map(Ok)).boxed()
}

/// A stream that fails immediately with `error`.
#[must_use]
pub fn failed(error: BuildError) -> RecordStream {
    stream::once(async move { Err(error) }).boxed()
}

/// Drains a stream into a vector, stopping at the first error.
pub async fn collect_records(stream: RecordStream) -> BuildResult<Vec<FileRecord>> {
    stream.try_collect().await
}

/// Splits one stream into `forks` independent streams.
///
/// Every fork receives its own clone of each record; content buffers are
/// immutable and may be shared, metadata never is. An upstream error is
/// delivered to every fork at the same position, after which all forks end.
/// A fork that is dropped stops receiving; the others continue. The slowest
/// live fork sets the pace.
///
/// Must be called inside a tokio runtime.
#[must_use]
pub fn fork(stream: RecordStream, forks: usize, capacity: usize) -> Vec<RecordStream> {
    if forks == 0 {
        return Vec::new();
    }
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..forks).map(|_| mpsc::channel(capacity.max(1))).unzip();
    tokio::spawn(drive_fork(stream, senders));
    receivers
        .into_iter()
        .map(|rx| ReceiverStream::new(rx).boxed())
        .collect()
}

async fn drive_fork(
    mut upstream: RecordStream,
    mut senders: Vec<mpsc::Sender<BuildResult<FileRecord>>>,
) {
    let mut forwarded = 0usize;
    while let Some(item) = upstream.next().await {
        let failed = item.is_err();
        let mut open = Vec::with_capacity(senders.len());
        for tx in senders {
            if tx.send(item.clone()).await.is_ok() {
                open.push(tx);
            }
        }
        senders = open;
        forwarded += 1;
        if failed || senders.is_empty() {
            break;
        }
    }
    debug!(records = forwarded, forks = senders.len(), "Stream isolator drained");
}

/// A single-consumer [`fork`]: the returned stream owns its records outright.
#[must_use]
pub fn isolate(stream: RecordStream, capacity: usize) -> RecordStream {
    fork(stream, 1, capacity)
        .pop()
        .unwrap_or_else(|| stream::empty().boxed())
}

/// Interleaves two streams in the order their records become available.
#[must_use]
pub fn merge(sources: RecordStream, dependencies: RecordStream) -> RecordStream {
    stream::select(sources, dependencies).boxed()
}

/// Moves production of `stream` onto its own task, handing records over a
/// bounded channel.
///
/// The stages upstream and downstream of the boundary then overlap in time,
/// while the channel capacity bounds how far the producer may run ahead.
#[must_use]
pub fn decouple(stream: RecordStream, capacity: usize) -> RecordStream {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            let failed = item.is_err();
            if tx.send(item).await.is_err() {
                trace!("Decoupled consumer dropped");
                return;
            }
            if failed {
                return;
            }
        }
    });
    ReceiverStream::new(rx).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FileRecord;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn records(paths: &[&str]) -> Vec<FileRecord> {
        paths
            .iter()
            .map(|p| FileRecord::source(*p, format!("content of {p}")))
            .collect()
    }

    #[tokio::test]
    async fn test_fork_outputs_are_content_equal() {
        let input = records(&["a.js", "b.css", "index.html"]);
        let forks = fork(from_records(input.clone()), 3, 2);
        assert_eq!(forks.len(), 3);

        for fork in forks {
            assert_eq!(collect_records(fork).await.unwrap(), input);
        }
    }

    #[tokio::test]
    async fn test_mutating_one_fork_leaves_others_untouched() {
        let mut forks = fork(from_records(records(&["a.js"])), 2, 4);
        let second = forks.pop().unwrap();
        let first = forks.pop().unwrap();

        let mut mutated = collect_records(first).await.unwrap();
        mutated[0].set_text("rewritten");
        mutated[0].path = "moved.js".to_string();

        let untouched = collect_records(second).await.unwrap();
        assert_eq!(untouched[0].path, "a.js");
        assert_eq!(untouched[0].text().unwrap(), "content of a.js");
    }

    #[tokio::test]
    async fn test_fork_propagates_error_to_every_fork_at_same_position() {
        let upstream = from_records(records(&["a.js", "b.js"]))
            .chain(failed(BuildError::Internal("disk gone".into())))
            .chain(from_records(records(&["never.js"])))
            .boxed();

        for mut fork in fork(upstream, 2, 1) {
            assert_eq!(fork.next().await.unwrap().unwrap().path, "a.js");
            assert_eq!(fork.next().await.unwrap().unwrap().path, "b.js");
            let err = fork.next().await.unwrap().unwrap_err();
            assert!(err.to_string().contains("disk gone"));
            assert!(fork.next().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_dropped_fork_does_not_stall_siblings() {
        let mut forks = fork(from_records(records(&["a", "b", "c", "d", "e"])), 2, 1);
        drop(forks.remove(0));
        let survivors = collect_records(forks.remove(0)).await.unwrap();
        assert_eq!(survivors.len(), 5);
    }

    #[tokio::test]
    async fn test_fork_is_bounded_by_slowest_consumer() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let upstream = stream::iter(0..100)
            .map(move |i| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(FileRecord::source(format!("f{i}.js"), "x"))
            })
            .boxed();

        let _forks = fork(upstream, 2, 4);
        tokio::time::sleep(Duration::from_millis(50)).await;
        // One record per channel slot plus the one blocked in `send`.
        assert!(pulled.load(Ordering::SeqCst) <= 6);
    }

    #[tokio::test]
    async fn test_merge_yields_union() {
        let merged = merge(
            from_records(records(&["index.html", "src/app.js"])),
            from_records(vec![FileRecord::dependency("node_modules/lib.js", "x")]),
        );
        let paths: BTreeSet<String> = collect_records(merged)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(
            paths,
            ["index.html", "node_modules/lib.js", "src/app.js"]
                .into_iter()
                .map(String::from)
                .collect()
        );
    }

    #[tokio::test]
    async fn test_decouple_preserves_order_and_errors() {
        let upstream = from_records(records(&["1", "2"]))
            .chain(failed(BuildError::stage("optimize", "boom")))
            .boxed();
        let mut out = decouple(upstream, 1);
        assert_eq!(out.next().await.unwrap().unwrap().path, "1");
        assert_eq!(out.next().await.unwrap().unwrap().path, "2");
        assert!(out.next().await.unwrap().is_err());
        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn test_zero_forks() {
        assert!(fork(from_records(Vec::new()), 0, 1).is_empty());
    }

    #[tokio::test]
    async fn test_isolate_passes_everything_through() {
        let input = records(&["index.html", "app.js"]);
        let out = collect_records(isolate(from_records(input.clone()), 4)).await.unwrap();
        assert_eq!(out, input);
    }
}
