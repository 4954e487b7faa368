//! Transports used by the pipeline stages.
//!
//! `ScriptTransport` is the seam between the fetch stage and the build
//! server: the fetcher only submits script text and reads back text, so the
//! HTTP implementation can be replaced by a fake in tests or by another
//! remote-execution mechanism.

use crate::errors::TriageError;

/// Filesystem helpers for the record store and report output.
pub mod fs;
/// Jenkins script-console transport over blocking HTTP.
pub mod http;

pub use http::JenkinsScriptConsole;

/// Remote-execution transport for the failure-enumeration script.
pub trait ScriptTransport {
    /// Endpoint the script is submitted to, used in logs and errors.
    fn endpoint(&self) -> &str;

    /// Submit `script` and return the complete response body.
    ///
    /// Connection failures, timeouts and non-success statuses are errors.
    fn run_script(&self, script: &str) -> Result<String, TriageError>;

    /// Read a text resource (e.g. a console log) through the same session.
    fn fetch_text(&self, url: &str) -> Result<String, TriageError>;
}

impl<T: ScriptTransport + ?Sized> ScriptTransport for &T {
    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }

    fn run_script(&self, script: &str) -> Result<String, TriageError> {
        (**self).run_script(script)
    }

    fn fetch_text(&self, url: &str) -> Result<String, TriageError> {
        (**self).fetch_text(url)
    }
}
