//! Transport for environments without extension support.

use tracing::trace;

use crate::error::Result;
use crate::page::UrlInfo;
use crate::protocol::Envelope;
use crate::wrapper::WrapperOptions;

use super::{Dispatcher, OneShot, RunType, Transport};

/// Drops every outbound message; never receives anything.
#[derive(Debug, Clone)]
pub struct NoneTransport {
    url_info: UrlInfo,
}

impl NoneTransport {
    /// Creates the no-op transport.
    #[must_use]
    pub fn new(options: &WrapperOptions) -> Self {
        Self {
            url_info: UrlInfo::unsupported(&options.frame_urls),
        }
    }
}

impl Transport for NoneTransport {
    fn run_type(&self) -> RunType {
        RunType::None
    }

    fn url_info(&self) -> &UrlInfo {
        &self.url_info
    }

    fn send(
        &self,
        _dispatcher: &Dispatcher,
        envelope: Envelope,
        _reply: Option<OneShot>,
    ) -> Result<()> {
        trace!(message_type = %envelope.message_type, "No extension host; message dropped");
        Ok(())
    }

    fn connect(&self, _dispatcher: &Dispatcher) {}

    fn disconnect(&self) {}
}
