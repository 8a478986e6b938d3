//! # Project RED
//!
//! Backend for a blood donation network. Patients post blood requests,
//! nearby donors with a matching group are notified and offer to donate,
//! a hospital between the two is chosen for testing and collection, and
//! both sides can chat until the donation is done.
//!
//! ## Features
//!
//! - **Proximity matching**: great-circle distance ranking of donors,
//!   hospitals and open requests
//! - **Accounts**: PBKDF2 password hashes, HS256 access/refresh tokens,
//!   separate donor and hospital staff logins, password reset links
//! - **Health analysis**: blood panel assessment, optionally through a
//!   completion model
//! - **Real-time**: WebSocket chat rooms and notification pushes
//!
//! ## Modules
//!
//! - [`domain`]: Records and enums shared by every layer
//! - [`geo`]: Coordinates and distance ranking
//! - [`storage`]: SQLite persistence
//! - [`auth`]: Passwords, tokens and reset links
//! - [`matching`]: Donor/request/hospital proximity queries
//! - [`prediction`]: Blood test analysis
//! - [`geocoding`]: Address lookup for registrations without coordinates
//! - [`websocket`]: Connection hub, chat and notification delivery
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use project_red::geo::{distance_km, Coordinates};
//!
//! let kathmandu = Coordinates::new(27.7172, 85.3240);
//! let pokhara = Coordinates::new(28.2096, 83.9856);
//! println!("{:.1} km", distance_km(kathmandu, pokhara));
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod geo;
pub mod geocoding;
pub mod logging;
pub mod matching;
pub mod prediction;
pub mod storage;
pub mod websocket;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError};

pub use domain::{
    Assignment, BloodGroup, BloodPanel, BloodRequest, BloodTest, ChatRoom, Donation, Hospital,
    Message, Notification, User,
};

pub use geo::{distance_km, Coordinates};

pub use storage::{Database, StorageError, StorageResult};

pub use websocket::{ConnectionHub, NotificationService, WsEvent};
