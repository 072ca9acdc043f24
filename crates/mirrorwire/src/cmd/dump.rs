use tracing::info;

use crate::cmd::DumpArgs;
use crate::exit::{session_error, CliResult, INTERRUPTED, SUCCESS};
use crate::output::{FramePrinter, OutputFormat};

pub fn run(args: DumpArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = args.session.open()?;
    let cancel = session.cancel_handle();

    session
        .handshake()
        .map_err(|err| session_error("handshake failed", err))?;

    let mut printer = FramePrinter::new(format);
    let mut printed = 0u64;

    let outcome = loop {
        if args.count.is_some_and(|count| printed >= count) {
            session.close();
            break Ok(SUCCESS);
        }

        match session.next_frame() {
            Ok(Some(frame)) => {
                printer.print(&frame);
                printed += 1;
            }
            Ok(None) => break Ok(SUCCESS),
            Err(_) if cancel.is_cancelled() => {
                info!(printed, "interrupted");
                break Ok(INTERRUPTED);
            }
            Err(err) => break Err(session_error("stream failed", err)),
        }
    };

    printer.finish();
    outcome
}
