mod decoder;
mod events;

pub use decoder::ClassicProtocol;
pub use events::InboundEvent;

use quarry_protocol_core::{versions, Protocol, SharedSink, VersionRegistry};

fn classic(version: i32, sink: SharedSink) -> Box<dyn Protocol> {
    Box::new(ClassicProtocol::new(version, sink))
}

/// The registry of every client generation this crate can serve.
/// Extend by adding a row here (and branches in the decoder if the new
/// revision encodes fields differently).
pub fn default_registry() -> VersionRegistry {
    VersionRegistry::new()
        .register(versions::V1_2_5, "1.2.4/1.2.5", classic)
        .register(versions::V1_3_2, "1.3.1/1.3.2", classic)
        .register(versions::V1_4_2, "1.4.2", classic)
        .register(versions::V1_4_5, "1.4.4/1.4.5/1.4.6", classic)
        .register(versions::V1_4_7, "1.4.7", classic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rows() {
        let reg = default_registry();
        assert_eq!(reg.protocol_versions(), "29, 39, 47, 49, 51");
        assert_eq!(reg.version_text(49), "1.4.4/1.4.5/1.4.6");
        assert_eq!(reg.version_text(50), "Unknown");
    }
}
