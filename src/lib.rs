//! Live inspector for Gemini API traffic
//!
//! Wrap a `reqwest::Client` in an [`InspectingClient`] and every call to the
//! target host is captured, classified and streamed to the inspector UI,
//! while the caller reads the response exactly as the upstream sent it.
//!
//! ```no_run
//! # async fn demo() -> reqwest::Result<()> {
//! let config = gemini_inspector::config::Config::default();
//! let client = gemini_inspector::inspecting_client(&config, reqwest::Client::new()).await;
//! let response = client
//!     .send(client.post("https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"))
//!     .await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod classifier;
pub mod config;
pub mod decoder;
pub mod emitter;
pub mod events;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod proxy;
pub mod reassembly;
pub mod server;
pub mod util;

pub use capture::InspectingClient;

/// Start (or join) the inspector and wrap `inner` for capture
///
/// Never fails: if no inspector port can be used, the client still works
/// and its events go unheard.
pub async fn inspecting_client(config: &config::Config, inner: reqwest::Client) -> InspectingClient {
    let launch = server::launch_or_detach(config).await;
    InspectingClient::new(inner, launch.inspector)
}
