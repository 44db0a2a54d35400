// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is flagged
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are flagged
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// Tests may unwrap and panic freely
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # airpods
//!
//! Orchestrates local AI services (Ollama, Open WebUI, ComfyUI and an
//! optional Caddy gateway) on rootless Podman.
//!
//! ## Overview
//!
//! airpods turns layered TOML configuration into running pods:
//!
//! - Merge configuration sources over built-in defaults and expand
//!   `{{dotted.path}}` templates
//! - Pick CUDA image variants from the detected GPU
//! - Derive concrete, hashed service specs
//! - Start, stop, inspect and clean services against the container engine
//!
//! ## Architecture
//!
//! Setup flows one way and produces an immutable plan:
//!
//! 1. **Configuration**: discovered, merged and resolved once per invocation
//! 2. **Plan**: accelerator decisions plus one spec per enabled service
//! 3. **Orchestrator**: observes engine state fresh and drives the plan
//!
//! ## Modules
//!
//! - [`config`]: Configuration discovery, merging, templates and schema
//! - [`accelerator`]: GPU detection and image variant selection
//! - [`planner`]: Service specs and the service plan
//! - [`engine`]: Container engine gateway, pulls and health probes
//! - [`orchestrator`]: `start`, `stop`, `status`, `clean` and `logs`
//! - [`state`]: On-disk state paths and the shared secret
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```toml
//! [services.ollama]
//! cuda_override = "cu126"
//!
//! [services.open-webui.env]
//! OLLAMA_BASE_URL = "http://ollama:{{services.ollama.ports.0.container}}"
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod accelerator;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{AirpodsConfig, ConfigLoader, ResolvedConfig};
pub use error::{AirpodsError, Result};
pub use orchestrator::{Orchestrator, StartReport, StatusReport, StopReport};
pub use planner::{InvocationContext, ServicePlan, ServiceSpec};
