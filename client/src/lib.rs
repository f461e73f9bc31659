pub mod config;
pub mod endpoint;
pub mod model;
pub mod service;
pub mod session;
pub mod source;
pub mod store;
pub mod telemetry;
pub mod transform;
pub mod transport;

pub use config::{ClientConfig, Deployment};
pub use endpoint::{EndpointResolver, Resolution};
pub use service::{HotelService, ServiceError};
pub use session::{SessionManager, SessionSnapshot};
pub use source::{CanisterBackend, FixtureBackend, Sources};
pub use store::{AppController, AppState, Store};
