//! Network telemetry: lifecycle events in, finalized request records out.

pub mod capture;
pub mod classifier;
pub mod event;
pub mod ingestor;
pub mod monitor;
pub mod record;

pub use capture::{BodySource, CapturePolicy, ResponseBody};
pub use classifier::is_api_like;
pub use event::{HeaderMap, NetworkEvent, RequestSent, ResponseInfo};
pub use ingestor::EventIngestor;
pub use monitor::{NetworkMonitor, NetworkTap};
pub use record::{NetworkRequestRecord, RemoteAddress};
