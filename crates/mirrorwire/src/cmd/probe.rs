use tracing::debug;

use crate::cmd::ProbeArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_meta, MetaOutput, OutputFormat};

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = args.session.open()?;

    let meta = session
        .handshake()
        .map_err(|err| session_error("handshake failed", err))?
        .clone();
    let out = MetaOutput::new(args.session.endpoint.to_string(), &meta, session.probe());

    session.close();
    debug!("probe complete; session closed");

    print_meta(&out, format);
    Ok(SUCCESS)
}
