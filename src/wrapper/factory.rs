//! Environment inspection and transport selection.
//!
//! The embedding layer inspects the browser once and reports the outcome as
//! [`EnvironmentMarkers`], along with whatever host API handles it found
//! ([`Hosts`]). [`select_transport`] turns the two into exactly one
//! [`Transport`].
//!
//! # Priority
//!
//! | Order | Markers | Handle | Transport |
//! |-------|---------|--------|-----------|
//! | 1 | `chrome && chrome_extension` | [`Hosts::chrome`] | [`ChromeTransport`] |
//! | 2 | `opera && opera_extension` | [`Hosts::opera`] | [`OperaTransport`] |
//! | 3 | `gecko && fx_jetpack` | [`Hosts::jetpack`] | [`JetpackTransport`] |
//! | 4 | otherwise | none | [`NoneTransport`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::page::PageContext;
use crate::transport::{
    ChromeRuntime, ChromeTransport, JetpackPort, JetpackTransport, NoneTransport, OperaExtension,
    OperaTransport, RunType, Transport,
};

use super::core::ExtensionWrapper;
use super::options::WrapperOptions;

// ============================================================================
// Constants
// ============================================================================

/// Source of a native `getInterface`, whitespace collapsed.
static NATIVE_GET_INTERFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*function\s+getInterface\s*\([^)]*\)\s*\{\s*\[native\s+code\]\s*\}\s*$")
        .expect("static regex is valid")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex is valid"));

// ============================================================================
// EnvironmentMarkers
// ============================================================================

/// Boolean outcome of the environment check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvironmentMarkers {
    /// A `chrome` global exists.
    pub chrome: bool,
    /// `chrome.extension` is reachable.
    pub chrome_extension: bool,
    /// An `opera` global exists.
    pub opera: bool,
    /// `opera.extension` is reachable.
    pub opera_extension: bool,
    /// The engine is Gecko.
    pub gecko: bool,
    /// The Jetpack content-script marker is present.
    pub fx_jetpack: bool,
}

impl EnvironmentMarkers {
    /// Returns `true` if `navigator.product` and the user agent identify
    /// a Gecko engine.
    #[must_use]
    pub fn is_gecko_navigator(product: &str, user_agent: &str) -> bool {
        product == "Gecko" && user_agent.contains("Gecko/")
    }

    /// Returns `true` if `source` is the stringified form of a native
    /// `getInterface` function.
    #[must_use]
    pub fn is_native_get_interface(source: &str) -> bool {
        let collapsed = WHITESPACE.replace_all(source, " ");
        NATIVE_GET_INTERFACE.is_match(&collapsed)
    }

    fn is_chrome(&self) -> bool {
        self.chrome && self.chrome_extension
    }

    fn is_opera(&self) -> bool {
        self.opera && self.opera_extension
    }

    fn is_fx_jetpack(&self) -> bool {
        self.gecko && self.fx_jetpack
    }

    /// Derives the capability flags.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_communicate_with_extension: self.is_chrome()
                || self.is_opera()
                || self.is_fx_jetpack(),
            hotkey_enabled: self.is_fx_jetpack(),
            is_gecko: self.gecko,
            is_fx_jetpack: self.is_fx_jetpack(),
        }
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// What the environment allows the page script to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// A privileged host is reachable.
    pub can_communicate_with_extension: bool,
    /// Global key hooks can be installed.
    pub hotkey_enabled: bool,
    /// The engine is Gecko.
    pub is_gecko: bool,
    /// Running as a Jetpack content script.
    pub is_fx_jetpack: bool,
}

impl Capabilities {
    /// Infers capabilities from an already chosen transport.
    #[must_use]
    pub fn for_run_type(run_type: RunType) -> Self {
        let jetpack = run_type == RunType::FirefoxJetpack;
        Self {
            can_communicate_with_extension: run_type != RunType::None,
            hotkey_enabled: jetpack,
            is_gecko: jetpack,
            is_fx_jetpack: jetpack,
        }
    }
}

// ============================================================================
// Hosts
// ============================================================================

/// Host API handles discovered by the embedding layer.
#[derive(Clone, Default)]
pub struct Hosts {
    /// Direct request/response runtime.
    pub chrome: Option<Arc<dyn ChromeRuntime>>,
    /// Channel-handoff extension object.
    pub opera: Option<Arc<dyn OperaExtension>>,
    /// Jetpack content-script port.
    pub jetpack: Option<Arc<dyn JetpackPort>>,
}

impl fmt::Debug for Hosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hosts")
            .field("chrome", &self.chrome.is_some())
            .field("opera", &self.opera.is_some())
            .field("jetpack", &self.jetpack.is_some())
            .finish()
    }
}

impl Hosts {
    /// Creates an empty handle set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the direct request/response runtime.
    #[must_use]
    pub fn with_chrome(mut self, runtime: Arc<dyn ChromeRuntime>) -> Self {
        self.chrome = Some(runtime);
        self
    }

    /// Sets the channel-handoff extension object.
    #[must_use]
    pub fn with_opera(mut self, extension: Arc<dyn OperaExtension>) -> Self {
        self.opera = Some(extension);
        self
    }

    /// Sets the Jetpack port.
    #[must_use]
    pub fn with_jetpack(mut self, port: Arc<dyn JetpackPort>) -> Self {
        self.jetpack = Some(port);
        self
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Builds the transport the environment supports.
///
/// A marker whose handle is missing is skipped with a warning.
#[must_use]
pub fn select_transport(
    markers: &EnvironmentMarkers,
    hosts: Hosts,
    options: &WrapperOptions,
) -> Box<dyn Transport> {
    if markers.is_chrome() {
        match hosts.chrome {
            Some(runtime) => return Box::new(ChromeTransport::new(runtime, options)),
            None => warn!("Chrome markers present without a runtime handle"),
        }
    }

    if markers.is_opera() {
        match hosts.opera {
            Some(extension) => return Box::new(OperaTransport::new(extension, options)),
            None => warn!("Opera markers present without an extension handle"),
        }
    }

    if markers.is_fx_jetpack() {
        match hosts.jetpack {
            Some(port) => return Box::new(JetpackTransport::new(port, options)),
            None => warn!("Jetpack markers present without a port handle"),
        }
    }

    Box::new(NoneTransport::new(options))
}

impl ExtensionWrapper {
    /// Creates the wrapper for the current environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `options` are invalid.
    pub fn create(
        markers: &EnvironmentMarkers,
        hosts: Hosts,
        page: PageContext,
        options: &WrapperOptions,
    ) -> Result<Self> {
        let transport = select_transport(markers, hosts, options);
        debug!(run_type = %transport.run_type(), ?markers, "Transport selected");

        Self::assemble(transport, page, options, markers.capabilities())
    }

    /// Returns the attribute the bootstrap puts on the document element when
    /// this page hosts the external editor frame.
    #[must_use]
    pub fn presence_marker(&self) -> Option<PresenceMarker> {
        self.url_info()
            .is_external(self.page())
            .then(|| PresenceMarker::new(self.name()))
    }
}

// ============================================================================
// PresenceMarker
// ============================================================================

/// Document attribute announcing that the editor script is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceMarker {
    /// Attribute name, `data-<name>-present`.
    pub attribute: String,
    /// Attribute value.
    pub value: &'static str,
}

impl PresenceMarker {
    fn new(name: &str) -> Self {
        Self {
            attribute: format!("data-{name}-present"),
            value: "1",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
