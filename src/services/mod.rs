//! Business logic services

pub mod audit;
pub mod file;
pub mod guest_token;
pub mod identity;
pub mod invariants;
pub mod membership;
pub mod notification;
pub mod storage;
pub mod subscription;
pub mod user;
pub mod webhook;
pub mod workspace;

pub use file::{Download, FileService, Upload};
pub use guest_token::{GuestTokenError, GuestTokenService, GuestVerification};
pub use identity::{ClerkVerifier, IdentityClaims, IdentityVerifier, TokenError};
pub use invariants::{InvariantError, InvariantViolation};
pub use membership::{InviteOutcome, MembershipError, MembershipService};
pub use notification::NotificationService;
pub use storage::{FileStorage, LocalStorage, MemoryStorage};
pub use subscription::SubscriptionService;
pub use user::UserService;
pub use webhook::{WebhookEvent, WebhookOutcome, WebhookService};
pub use workspace::WorkspaceService;
