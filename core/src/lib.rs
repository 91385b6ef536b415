//! Shroud privacy engine
//!
//! Alias accounts on the public layer over a shielded note pool on the
//! private layer. Four flows move value between them:
//!
//! ```text
//!            public → public   (pass-through)
//!   alias ── public → private  (deposit)  ──┐
//!                                           ▼
//!                        ┌───────────────────────────┐
//!                        │ shielded pool (notes)     │◀─┐ private → private
//!                        └───────────────────────────┘──┘ (joint proof)
//!                                           │
//!   payee ◀─ private → public (withdraw) ───┘
//! ```
//!
//! [`service::PrivacyService`] is the application entry point.

pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod prover;
pub mod service;
pub mod state;
pub mod storage;

pub use config::{PrivacySettings, ShroudConfig};
pub use context::PrivacyContext;
pub use error::{PrivacyError, PrivacyResult};
pub use service::PrivacyService;
