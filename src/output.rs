/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!` directly
/// so output can be suppressed or redirected in tests and future
/// machine-readable modes.
pub trait UserOutput: Send + Sync {
    /// Informational status message.
    fn status(&self, message: &str);

    /// Success message.
    fn success(&self, message: &str);
}

/// Standard CLI output on stdout.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("{}", message);
    }
}
