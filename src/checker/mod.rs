// src/checker/mod.rs
// =============================================================================
// This module contains everything needed to probe a single URL.
//
// Submodules:
// - http: the Prober trait and the reqwest-backed HttpProber
// - classify: maps failure causes onto the fixed error taxonomy
//
// The checker holds no shared state. The scheduler (src/batch/) decides how
// many probes run at once; this module only knows how to run one.
// =============================================================================

mod classify;
mod http;

#[cfg(test)]
pub mod testing;

pub use classify::ProbeError;
pub use http::{
    HttpProber, ProbeConfig, ProbeResult, Prober, DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT,
};
