// Remote gateway (REST over reqwest) and realtime sockets (tokio-tungstenite).

pub mod backend;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod realtime;
pub mod session;

pub use backend::{AuthSession, Backend, HealthStatus};
pub use error::{GatewayError, RealtimeError};
pub use gateway::RemoteGateway;
pub use normalize::{normalize_object, normalize_sequence};
pub use realtime::{RealtimeEvent, RealtimeManager, SocketHandle};
pub use session::SessionContext;
