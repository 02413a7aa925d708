//! Dispatch core: template resolution, routing, fan-out and the record stores.

pub mod dispatch;
pub mod router;
pub mod store;
pub mod template;

pub use dispatch::{
    DispatchEngine, DispatchHandle, DispatchSettings, EngineError, EngineStores, RecordPage,
    SubmitRequest, TaskSummary,
};
pub use router::RoutingPolicy;
pub use template::{TemplateError, TemplateResolver};
