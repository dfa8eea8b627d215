//! Rezilient auth control plane — policy services.
//!
//! Each service is generic over the snapshot store and clock so the
//! same code runs against the in-memory store in tests and SurrealDB in
//! production. Dependencies are passed explicitly at construction; no
//! globals.

pub mod audit;
pub mod config;
pub mod enrollment;
pub mod registry;
pub mod rotation;
pub mod token;

pub use audit::AuditRecorder;
pub use config::{MIN_SIGNING_KEY_LEN, TokenConfig};
pub use enrollment::{
    Enrollment, EnrollmentGrant, ExchangeOutcome, IssueEnrollmentCode, IssuedEnrollmentCode,
};
pub use registry::{PromotionOutput, Registry};
pub use rotation::{Rotation, RotationCompletion, RotationStart};
pub use token::{
    InFlightEvaluation, IssuedToken, MintOutcome, MintRequest, RefreshEvaluation, TokenClaims,
    TokenFlow, TokenService, ValidateOutcome, ValidateRequest,
};
