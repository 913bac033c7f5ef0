//! Output helpers for the CLI with BrokenPipe handling.
//!
//! Output is often piped into tools like `head` that close the pipe early.
//! Instead of erroring, the enclosing function returns `Ok(())`.

/// Copy a reader to stdout, handling BrokenPipe gracefully.
///
/// Returns `Ok(())` early if BrokenPipe is encountered.
#[macro_export]
macro_rules! copy_out {
    ($reader:expr) => {{
        let mut stdout = std::io::stdout().lock();
        match std::io::copy($reader, &mut stdout) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }};
}

pub use copy_out;
