// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `nhc2_gateway` - session manager for Niko Home Control II controllers.
//!
//! The controller exposes its devices over MQTT. This library opens the
//! session, discovers the devices, sorts them into device classes and keeps
//! one live [`Device`] handle per device, updated from the controller's
//! status events. Writes made through the handles are coalesced and sent in
//! batches.
//!
//! # Overview
//!
//! - [`Gateway`]: connect, disconnect, and per-class device callbacks
//! - [`Device`]: attribute accessors, `on_change` callbacks and writes
//! - [`device::ClassificationTable`]: which models belong to which class
//! - [`batcher::CommandBatcher`]: admission-controlled write coalescing
//!
//! # Quick Start
//!
//! ```no_run
//! use nhc2_gateway::{Gateway, GatewayConfig};
//! use nhc2_gateway::types::{DeviceClass, Percentage};
//!
//! #[tokio::main]
//! async fn main() -> nhc2_gateway::Result<()> {
//!     let config = GatewayConfig::new("192.168.1.20", "hobby", "secret-token")
//!         .with_ca_path("/etc/nhc2/ca.pem");
//!     let gateway = Gateway::new(config)?;
//!
//!     gateway.system_info(|info| {
//!         println!("controller software {:?}", info.sw_version());
//!     });
//!
//!     gateway.devices(DeviceClass::Light, |lights| {
//!         for light in lights {
//!             light.on_change(|light| {
//!                 println!("{} is on: {}", light.name(), light.is_on());
//!             });
//!         }
//!     });
//!
//!     gateway.connect(None).await?;
//!
//!     if let Some(light) = gateway.devices_of(DeviceClass::Light).first() {
//!         light.set_brightness(Percentage::new(60)?).await?;
//!     }
//!
//!     gateway.disconnect().await
//! }
//! ```
//!
//! # Connection refusals
//!
//! Pass a callback to [`Gateway::connect`] to receive the refusal reason
//! instead of an error:
//!
//! ```no_run
//! use std::sync::Arc;
//! use nhc2_gateway::{Gateway, GatewayConfig};
//! use nhc2_gateway::types::RefusalReason;
//!
//! # async fn example(gateway: Gateway) -> nhc2_gateway::Result<()> {
//! gateway
//!     .connect(Some(Arc::new(|reason: RefusalReason| {
//!         eprintln!("controller refused the session: {reason}");
//!     })))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod batcher;
pub mod command;
pub mod device;
pub mod error;
mod gateway;
pub mod protocol;
pub mod response;
pub mod state;
pub mod subscription;
pub mod types;

pub use device::{Device, DeviceRegistry, StateListener};
pub use error::{ConnectError, Error, ParseError, ProtocolError, Result, ValueError};
pub use gateway::{DEFAULT_PORT, Gateway, GatewayConfig};
pub use protocol::RefusalCallback;
pub use response::DeviceDescriptor;
pub use state::SystemInfo;
pub use subscription::SubscriptionId;
pub use types::{DeviceClass, Percentage, RefusalReason};
