//! Client side of the session contract: persisted session, state machine,
//! and an HTTP client that attaches the bearer token and reacts to 401s.

pub mod error;
pub mod http;
pub mod session;
pub mod store;

pub use error::ClientError;
pub use http::{ApiClient, ClientConfig, Deleted, PostView, SignedIn};
pub use session::{
    Attempt, AuthOutcome, Navigator, RecordingNavigator, RouteDecision, SessionController,
    SessionState, LOGIN_PATH,
};
pub use store::{ClientSession, FileStore, MemoryStore, SessionStore, STORAGE_KEY};
