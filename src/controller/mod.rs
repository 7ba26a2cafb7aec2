//! Session orchestration for the curing chamber panel
//!
//! [`session_controller`] is the only place where broker connectivity,
//! telemetry handling and the persisted session meet. It is driven from a
//! single task:
//!
//! ```text
//! BrokerSession ──[SessionEvent]──► SessionController ──[Notification]──► UI
//!                  (mpsc, drained      │
//!                   by pump())         └──► CSV data log / session.json
//! ```

pub mod session_controller;

pub use session_controller::{
    ControllerSettings, Notification, NotificationReceiver, SessionController,
};
