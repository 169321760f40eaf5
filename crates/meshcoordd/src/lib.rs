//! meshcoordd - mesh network coordinator
//!
//! Ties the radio stack, discovery scheduler, device registry and network
//! self-heal together behind the [`Coordinator`] facade.

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod self_heal;
pub mod signals;
pub mod simulation;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{Config, CoordinatorConfig};
pub use coordinator::{Coordinator, TickReport};
pub use error::{CoordinatorError, Result};
pub use self_heal::{SelfHealController, SelfHealStats};
pub use signals::{CommissioningStats, SignalAction, SignalRouter};
