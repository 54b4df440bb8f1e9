//! # Bridge Core Module
//!
//! The authenticated command bridge: everything with real state, invariants,
//! and failure policy lives here.
//!
//! ## Components
//!
//! - [`server`] - Control loop, boot sequence, and restart decisions
//! - [`router`] - The chat/command state machine
//! - [`registry`] - Fixed-capacity authorization table
//! - [`menu`] - Inline menu construction and callback ids
//! - [`reset`] - Two-step factory-reset challenge
//! - [`maintenance`] - Scheduled maintenance-restart policy
//!
//! ## Control Flow
//!
//! ```text
//! inbound update
//!       │
//!       ▼
//! ┌──────────────┐  not authorized  ┌────────────────┐
//! │ CommandRouter│ ───────────────→ │  secret gate   │
//! └──────────────┘                  └────────────────┘
//!       │ authorized
//!       ▼
//!  menu / channel toggle / settings / reset confirmation
//! ```
//!
//! Authorization is checked before any command interpretation; the reset
//! flow requires a freshly generated numeric code so a single mistyped or
//! replayed message can never wipe the device.

pub mod maintenance;
pub mod menu;
pub mod registry;
pub mod reset;
pub mod router;
pub mod server;

pub use registry::{AuthorizationRegistry, AuthorizeOutcome, LoadReport, Principal};
pub use router::{BridgeAction, CommandRouter, Outbound, RouterResponse, SessionState};
pub use server::{BridgeServer, RunExit};
