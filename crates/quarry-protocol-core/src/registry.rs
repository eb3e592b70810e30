use crate::protocol::{Protocol, SharedSink};

/// Protocol version numbers of the supported client generations.
/// Adjust these (and the registry rows) if a revision is added or removed.
pub mod versions {
    pub const V1_2_5: i32 = 29;
    pub const V1_3_2: i32 = 39;
    pub const V1_4_2: i32 = 47;
    pub const V1_4_5: i32 = 49;
    pub const V1_4_7: i32 = 51;

    /// Default revision assumed for diagnostics when none is negotiated.
    pub const LATEST: i32 = V1_4_7;
}

/// Builds the concrete decoder for one registered revision. Receives the
/// negotiated version number and a handle for raw writes to the connection.
pub type DecoderFactory = Box<dyn Fn(i32, SharedSink) -> Box<dyn Protocol> + Send + Sync>;

struct VersionEntry {
    protocol_version: i32,
    client_version: &'static str,
    factory: DecoderFactory,
}

/// Closed table of supported protocol revisions. Built once at startup,
/// read-only afterwards; shared across connections without locking.
pub struct VersionRegistry {
    entries: Vec<VersionEntry>,
}

impl VersionRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add one revision row. Version numbers must be unique.
    pub fn register(
        mut self,
        protocol_version: i32,
        client_version: &'static str,
        factory: impl Fn(i32, SharedSink) -> Box<dyn Protocol> + Send + Sync + 'static,
    ) -> Self {
        assert!(
            self.entry(protocol_version).is_none(),
            "protocol version {} registered twice",
            protocol_version
        );
        self.entries.push(VersionEntry {
            protocol_version,
            client_version,
            factory: Box::new(factory),
        });
        self
    }

    fn entry(&self, protocol_version: i32) -> Option<&VersionEntry> {
        self.entries
            .iter()
            .find(|e| e.protocol_version == protocol_version)
    }

    pub fn is_supported(&self, protocol_version: i32) -> bool {
        self.entry(protocol_version).is_some()
    }

    /// Instantiate the decoder for a version, or None if unregistered.
    pub fn create_decoder(
        &self,
        protocol_version: i32,
        sink: SharedSink,
    ) -> Option<Box<dyn Protocol>> {
        self.entry(protocol_version)
            .map(|e| (e.factory)(protocol_version, sink))
    }

    pub fn client_version(&self, protocol_version: i32) -> Option<&'static str> {
        self.entry(protocol_version).map(|e| e.client_version)
    }

    /// Translate a protocol version number into client version text:
    /// 49 -> "1.4.4/1.4.5/1.4.6". Total over all inputs — unregistered
    /// numbers (possibly attacker-controlled) come back as "Unknown".
    pub fn version_text(&self, protocol_version: i32) -> &'static str {
        self.client_version(protocol_version).unwrap_or("Unknown")
    }

    /// Comma-separated protocol version numbers, e.g. "29, 39, 47, 49, 51".
    pub fn protocol_versions(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.protocol_version.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Comma-separated client version names, for rejection messages and
    /// the startup log line.
    pub fn client_versions(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.client_version)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for VersionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
