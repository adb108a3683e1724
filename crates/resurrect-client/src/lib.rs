//! resurrect-client — client for the proxy daemon's control API.
//!
//! Speaks HTTP/1.1 over a fresh TCP connection per request; every call is
//! bounded by the configured timeout so a hung daemon can never stall the
//! watchdog.
//!
//! # Endpoints
//!
//! | Method | Path | Call |
//! |---|---|---|
//! | GET | `/` | [`ControlApi::probe_health`] |
//! | GET | `/proxies` | [`ControlApi::list_proxies`] |
//! | PUT | `/proxies/{group}` | [`ControlApi::set_selection`] |
//! | GET | `/configs` | [`DaemonClient::get_configs`] |

pub mod client;
pub mod error;

pub use client::{ControlApi, DaemonClient};
pub use error::{ClientError, ClientResult};
