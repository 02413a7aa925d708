//! HTTP surface of the dispatch service.
//!
//! Endpoints:
//! - POST /api/submit: accept a task, deliver in the background
//! - POST /api/template/fill: render a template without sending
//! - GET  /api/sendRecords, /api/sendRecords/{id}: query delivery outcomes
//! - POST /api/channel/testSend, /api/sender/testSend: one-off test delivery
//! - GET  /api/channel/emailProtocolSchema, /api/channel/schema/{channelType},
//!   /api/sender/schema/{senderType}: property schemas for configuration forms

pub mod middleware;
pub mod routes;
pub mod state;
