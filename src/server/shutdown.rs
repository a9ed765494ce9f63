use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::sync::oneshot;

/// The signal resolves when the handle is dropped or fired, whichever comes
/// first. Hand the signal to an HTTP server's graceful-shutdown hook and keep
/// the handle wherever process lifetime is decided.
pub fn shutdown_signal() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (ShutdownHandle { _tx: tx }, ShutdownSignal { rx })
}

pub struct ShutdownHandle {
    _tx: oneshot::Sender<()>,
}

pub struct ShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let rx = Pin::new(&mut self.rx);
        // Sent value and dropped sender mean the same thing here.
        let _: Result<(), oneshot::error::RecvError> = ready!(rx.poll(cx));
        Poll::Ready(())
    }
}
