//! 应用层实现。
//!
//! 围绕便签领域模型提供实时扇出与持久化一致性：
//! 便签先持久化再广播，连接由注册表统一管理，心跳巡检淘汰失联连接。

pub mod clock;
pub mod dto;
pub mod error;
pub mod heartbeat;
pub mod hub;
pub mod rate_limiter;
pub mod registry;

pub use clock::{Clock, SystemClock};
pub use dto::SubmitNoteRequest;
pub use error::ApplicationError;
pub use heartbeat::{HeartbeatMonitor, SweepReport};
pub use hub::{BroadcastHub, BroadcastHubDependencies, HubSettings, RealtimeEvent, SNAPSHOT_LIMIT};
pub use rate_limiter::{RateLimitError, SubmissionRateLimiter};
pub use registry::{
    ConnectionRegistry, Liveness, OutboundFrame, ProbeOutcome, PublishReport,
    RegisteredConnection,
};
