/// Re-export `Config` from `multisites-core` for use within this crate.
///
/// All environment-variable parsing lives in `multisites-core` so it can be
/// shared with integration tests without depending on the full server.
pub use multisites_core::config::Config;
