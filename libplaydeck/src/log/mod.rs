//! Re-exports of the logging macros used across playdeck, plus the global
//! report handler setup.
pub use color_eyre::eyre::eyre;
pub use tracing::{debug, error, info, span, trace, warn};

/// Frame prefixes hidden from error reports. These are runtime and
/// formatting internals that never explain a playdeck failure.
const HIDDEN_FRAME_PREFIXES: &[&str] = &[
    "tokio::",
    "tracing::",
    "color_eyre::",
    "reqwest::",
    "hyper::",
    "<core::",
];

/// Install color_eyre as the global error handler.
#[tracing::instrument]
pub fn install_color_eyre() -> color_eyre::eyre::Result<()> {
    color_eyre::config::HookBuilder::default()
        .issue_url(concat!(env!("CARGO_PKG_REPOSITORY"), "/issues/new"))
        .add_issue_metadata("crate", env!("CARGO_PKG_NAME"))
        .add_default_filters()
        .add_frame_filter(Box::new(|frames| {
            frames.retain(|frame| match frame.name.as_deref() {
                Some(name) => !HIDDEN_FRAME_PREFIXES
                    .iter()
                    .any(|prefix| name.starts_with(prefix)),
                None => true,
            });
        }))
        .install()?;

    Ok(())
}
