//! Subscriber setup for the `chatbot` binary.
//!
//! Filtering follows `CHATBOT_LOG` (e.g. `CHATBOT_LOG=jenkins_chatbot_core=debug,info`),
//! defaulting to `info`. Output goes to stderr so command output on stdout
//! stays machine-readable.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "CHATBOT_LOG";

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
