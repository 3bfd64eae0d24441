//! # kilu-extract
//!
//! Sandboxed page extraction for KiLu Hub workers.
//!
//! A Hub visits one external page per task. This crate owns that visit: it
//! creates a render surface with sandboxing defaults, bounds navigation and
//! script evaluation with timeouts, refuses pages that look gated (sign-in
//! redirects, 401/403/429, password fields, CAPTCHAs, paywall markers), and
//! collects paragraph text and headings from everything else.
//!
//! ## Design
//!
//! - The surface is a black box behind [`RenderSurface`]; the default
//!   [`HttpSurface`] fetches documents with `reqwest` and runs the page
//!   scripts against a `scraper` DOM
//! - Surface callbacks are raced against timers, first resolution wins
//! - Script evaluation fails soft (empty string), navigation fails closed
//!
//! ## Security
//!
//! - No cookie store and no file access on the surface
//! - Fixed, non-identifying User-Agent
//! - Page content is never logged

pub mod config;
pub mod dom;
pub mod error;
pub mod executor;
pub mod surface;

pub use config::ExtractConfig;
pub use error::{ExtractError, Result};
pub use executor::{Extraction, ExtractionState, SandboxedExtractor};
pub use surface::{
    HttpSurfaceFactory, PageScript, RenderSurface, SurfaceEvent, SurfaceEvents, SurfaceFactory,
    SurfaceSettings,
};
