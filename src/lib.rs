// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! edgeguard: out-of-band traffic inspection agent SDK.
//!
//! A reverse proxy forwards request/response events to the agent over a
//! local socket; the agent replies with a decision (allow, block, redirect,
//! challenge) plus optional header and body mutations. This crate is the
//! agent-side protocol runtime: framing, the v1/v2 wire profiles, request
//! correlation, dispatch into user inspection logic, and graceful drain and
//! shutdown. Implement [`InspectionCapability`] and hand it to
//! [`AgentServer`].

pub mod audit;
pub mod capability;
pub mod config;
pub mod constants;
pub mod context;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod runtime;
pub mod transport;
pub mod view;

pub use capability::{
    Capabilities, DefaultCapability, HealthStatus, InspectionCapability, MetricsReport,
};
pub use config::{AgentConfig, TransportKind};
pub use decision::Decision;
pub use error::{AgentError, ProtocolError};
pub use protocol::{BodyMutation, HeaderOp, RequestKey};
pub use runtime::AgentServer;
pub use view::{RequestView, ResponseView};
