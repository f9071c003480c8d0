//! Generic completion-signal future (§5 Concurrency & Resource Model).
//!
//! Grounded on the teacher's `runtime::async_wrappers` (`CrawlRequest`,
//! `AsyncJsonSave`): a oneshot channel wrapped in its own `Future` impl, so
//! callers can `.await` a value produced by another task without pulling in
//! `futures::channel::oneshot` at every call site.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// The sending half: exactly one `complete` call is expected, a second is a
/// silent no-op (the receiver is already gone or already fulfilled).
pub struct Completion<T> {
    sender: oneshot::Sender<T>,
}

impl<T> Completion<T> {
    pub fn complete(self, value: T) {
        let _ = self.sender.send(value);
    }
}

/// The awaitable half, returned alongside a `Completion<T>` from `pending`.
pub struct PendingResult<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Future for PendingResult<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(Some(value)),
            Poll::Ready(Err(_)) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Creates a linked `Completion`/`PendingResult` pair: one task holds the
/// `Completion` and calls it once work finishes, another `.await`s the
/// `PendingResult` to learn the outcome.
#[must_use]
pub fn pending<T>() -> (Completion<T>, PendingResult<T>) {
    let (sender, receiver) = oneshot::channel();
    (Completion { sender }, PendingResult { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_delivers_its_value_to_the_pending_result() {
        let (completion, pending_result) = pending::<u32>();
        tokio::spawn(async move {
            completion.complete(42);
        });
        assert_eq!(pending_result.await, Some(42));
    }

    #[tokio::test]
    async fn dropping_the_completion_resolves_to_none() {
        let (completion, pending_result) = pending::<u32>();
        drop(completion);
        assert_eq!(pending_result.await, None);
    }
}
