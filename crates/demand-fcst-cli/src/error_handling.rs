//! Translation of run outcomes into process exit codes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::ExitCode;

use demand_fcst_core::PipelineError;

/// Exit code for failures outside the pipeline (I/O, bad arguments).
pub const EXIT_FAILURE: u8 = 1;

/// Exit code when the run panicked.
pub const EXIT_PANIC: u8 = 70;

/// Exit code for an error: the pipeline's own code when the chain contains a
/// [`PipelineError`], [`EXIT_FAILURE`] otherwise.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PipelineError>()
        .and_then(|e| u8::try_from(e.to_code()).ok())
        .unwrap_or(EXIT_FAILURE)
}

/// Run `f`, reporting an error or panic on stderr and mapping it to an exit
/// code.
pub fn run_guarded<F>(f: F) -> ExitCode
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
        Err(_) => {
            eprintln!("error: internal panic");
            ExitCode::from(EXIT_PANIC)
        }
    }
}
