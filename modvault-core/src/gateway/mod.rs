//! Download gateway: key-to-upstream resolution and streaming relay.
//!
//! Callers only ever name a download by its opaque key. The upstream location
//! stays inside [`DescriptorTable`] and never leaves this module.

pub mod descriptor;
pub mod error;
pub mod relay;

pub use descriptor::{DescriptorError, DescriptorTable, DownloadDescriptor, UndownloadableProduct};
pub use error::{ErrorKind, GatewayError};
pub use relay::{DownloadGateway, DownloadStream, RelayInterrupted, RelayOutcome};
