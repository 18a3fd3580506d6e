//! Admission and access control for wabot.
//!
//! Every inbound command passes through these gates before a handler runs:
//!
//! - [`AccessRegistry`]: first-contact registration, greeting flag, allow-list
//! - [`BlockManager`]: expiring blocks that can never hold an owner
//! - [`SuspiciousTracker`]: rolling event log feeding automatic blocks
//! - [`PatternDetector`]: injection-style text screening
//! - [`RateLimiter`]: per-user sliding window
//! - [`PermissionChecker`]: owner-only and admin-only-in-group commands
//! - [`CooldownGate`] and [`ConcurrencyThrottle`]: per-user debounce and the
//!   heavy-command ceiling
//!
//! [`SecurityManager`] composes them. All state is in memory and lives as
//! long as the process.

pub mod blocklist;
pub mod cooldown;
pub mod expiring;
pub mod features;
pub mod manager;
pub mod patterns;
pub mod permissions;
pub mod rate_limit;
pub mod registry;
pub mod sanitize;
pub mod suspicious;
pub mod throttle;
pub mod validate;

pub use blocklist::{BlockError, BlockInfo, BlockManager, BlockReceipt, BlockSummary};
pub use cooldown::CooldownGate;
pub use expiring::{Expiring, ExpiringMap};
pub use features::{Features, UnknownFeature, FEATURE_NAMES};
pub use manager::{SecurityManager, SecurityStats, SweepReport, AUTO_BLOCK_REASON};
pub use patterns::{Detection, PatternDetector};
pub use permissions::{PermissionChecker, PermissionDenied};
pub use rate_limit::{RateDecision, RateLimitConfig, RateLimiter};
pub use registry::{AccessRegistry, AllowError, AllowlistEntry, RegisteredUser, RevokeError};
pub use sanitize::{parse_command, sanitize_input, ParsedCommand};
pub use suspicious::{ActivityKind, ActivityRecord, SuspiciousConfig, SuspiciousTracker, TrackOutcome};
pub use throttle::{ConcurrencyThrottle, HeavyPermit};
pub use validate::{validate_args, validate_expression, validate_url, ArgKind, ValidationError};
