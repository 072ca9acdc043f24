use std::io;
use std::thread::{self, JoinHandle};

use mirrorwire_transport::ByteSource;
use tracing::debug;

use crate::cancel::CancelHandle;
use crate::error::Result;
use crate::run::{run_session, SessionSummary};
use crate::session::StreamSession;
use crate::sink::FrameSink;

/// A session running on its own worker thread.
#[derive(Debug)]
pub struct SessionHandle<K> {
    cancel: CancelHandle,
    thread: JoinHandle<(Result<SessionSummary>, K)>,
}

/// Run `session` to completion on a named worker thread, feeding `sink`.
///
/// The sink is handed back by [`SessionHandle::join`].
pub fn spawn_session<S, K>(
    mut session: StreamSession<S>,
    mut sink: K,
) -> io::Result<SessionHandle<K>>
where
    S: ByteSource + Send + 'static,
    K: FrameSink + Send + 'static,
{
    let cancel = session.cancel_handle();
    let thread = thread::Builder::new()
        .name("mirrorwire-session".into())
        .spawn(move || {
            let result = run_session(&mut session, &mut sink);
            debug!(ok = result.is_ok(), "session worker finished");
            (result, sink)
        })?;

    Ok(SessionHandle { cancel, thread })
}

impl<K> SessionHandle<K> {
    /// Cancel the session. The worker ends with `SourceClosed`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker, returning its outcome and the sink.
    ///
    /// A panic on the worker thread is resumed on the caller.
    pub fn join(self) -> (Result<SessionSummary>, K) {
        match self.thread.join() {
            Ok(outcome) => outcome,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
