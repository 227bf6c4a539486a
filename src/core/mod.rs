//! Validation engine: providers, sessions, and run orchestration.

pub mod balance;
pub mod http;
pub mod input;
pub mod logging;
pub mod model_list;
pub mod models;
pub mod orchestrator;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod store;
pub mod strategy;
pub mod transport;
pub mod validator;
pub mod worker_pool;

pub use http::{FetchOptions, SecureFetcher};
pub use input::{ParsedInput, parse_credentials};
pub use model_list::fetch_models;
pub use models::{ApiStyle, Credential, ProviderConfig, ValidationResult};
pub use orchestrator::{
    OrchestratorSettings, RunEvent, RunHandle, RunPhase, RunReport, TaskOrchestrator,
};
pub use protocol::{ClientCommand, Frame, ServerMessage};
pub use provider::{ProviderMeta, ProviderRegistry};
pub use session::{BatchSession, SessionState};
pub use store::{CategoryCounts, ResultCategory, ResultStore, categorize};
pub use transport::{Connector, InProcessConnector, SessionLink};
pub use validator::{CheckCredential, CredentialValidator};
pub use worker_pool::{StopSignal, WorkerPool};
