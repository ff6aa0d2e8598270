//! The set of configured plugs.
//!
//! Built once at startup from the `<address>:<key>,<address>:<key>` mapping
//! and populated with a single sequential pass of system-info queries.

use std::sync::Arc;

use tracing::info;

use crate::config::ConfigError;
use crate::input::KeyId;
use crate::kasa::DeviceError;
use crate::kasa::Plug;
use crate::kasa::Transport;

/// One `<address>:<key>` entry of the mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlugBinding {
    pub address: String,
    pub trigger_key: KeyId,
}

/// Parse a comma-separated list of `<address>:<key>` pairs.
///
/// Fails on the first malformed entry; no partial list is returned.
pub fn parse_mapping(mapping: &str) -> Result<Vec<PlugBinding>, ConfigError> {
    if mapping.trim().is_empty() {
        return Err(ConfigError::EmptyMapping);
    }

    let mut bindings = Vec::new();
    let mut offset = 0;

    for raw in mapping.split(',') {
        let leading = raw.len() - raw.trim_start().len();
        let entry = raw.trim();
        let span = offset + leading..offset + leading + entry.len();
        offset += raw.len() + 1;

        let mut parts = entry.split(':');
        let (address, key) = match (parts.next(), parts.next(), parts.next()) {
            (Some(address), Some(key), None) => (address, key),
            _ => {
                return Err(ConfigError::MalformedPair {
                    entry: entry.to_string(),
                    span,
                });
            }
        };

        if address.is_empty() {
            return Err(ConfigError::EmptyAddress {
                entry: entry.to_string(),
                span,
            });
        }

        let trigger_key = key
            .parse::<KeyId>()
            .map_err(|source| ConfigError::InvalidTriggerKey {
                entry: entry.to_string(),
                span: span.clone(),
                source,
            })?;

        bindings.push(PlugBinding {
            address: address.to_string(),
            trigger_key,
        });
    }

    Ok(bindings)
}

/// All configured plugs, in mapping order
#[derive(Debug)]
pub struct Registry {
    plugs: Vec<Arc<Plug>>,
}

impl Registry {
    /// Parse `mapping` and create one plug per entry, all sharing `transport`.
    pub fn parse(mapping: &str, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        let bindings = parse_mapping(mapping)?;
        Ok(Self::from_bindings(bindings, transport))
    }

    pub fn from_bindings(bindings: Vec<PlugBinding>, transport: Arc<dyn Transport>) -> Self {
        let plugs = bindings
            .into_iter()
            .map(|b| Arc::new(Plug::new(b.address, b.trigger_key, transport.clone())))
            .collect();
        Self { plugs }
    }

    pub fn plugs(&self) -> &[Arc<Plug>] {
        &self.plugs
    }

    /// Plugs whose trigger key is `key`
    pub fn plugs_for_key(&self, key: KeyId) -> impl Iterator<Item = &Arc<Plug>> + '_ {
        self.plugs.iter().filter(move |p| p.trigger_key() == key)
    }

    pub fn len(&self) -> usize {
        self.plugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugs.is_empty()
    }

    /// Query every plug once, in order, to fill in name, model and relay state.
    ///
    /// Stops at the first failure; plugs after it stay unpopulated.
    pub async fn initialize(&self) -> Result<(), DeviceError> {
        info!(
            "Retrieving information for {} plug(s); this might take a while",
            self.plugs.len()
        );

        for plug in &self.plugs {
            let info = plug.query_system_info().await?;
            info!(
                address = plug.address(),
                model = %info.model,
                on = info.is_on(),
                "Found plug: {}",
                info.alias
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kasa::transport::MockTransport;

    fn sysinfo(alias: &str, relay_state: u8) -> String {
        format!(
            r#"{{"system":{{"get_sysinfo":{{"alias":"{}","model":"HS100(UK)","relay_state":{}}}}}}}"#,
            alias, relay_state
        )
    }

    #[test]
    fn test_parse_mapping() {
        let bindings = parse_mapping("10.0.0.5:49,10.0.0.6:50").unwrap();
        assert_eq!(
            bindings,
            vec![
                PlugBinding {
                    address: "10.0.0.5".to_string(),
                    trigger_key: KeyId(49),
                },
                PlugBinding {
                    address: "10.0.0.6".to_string(),
                    trigger_key: KeyId(50),
                },
            ]
        );
    }

    #[test]
    fn test_parse_mapping_trims_whitespace() {
        let bindings = parse_mapping(" plug.lan:49 , 10.0.0.6:50 ").unwrap();
        assert_eq!(bindings[0].address, "plug.lan");
        assert_eq!(bindings[1].trigger_key, KeyId(50));
    }

    #[test]
    fn test_parse_mapping_invalid_key() {
        let err = parse_mapping("10.0.0.5:abc").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTriggerKey { .. }));
        assert_eq!(err.span(), Some(0..12));
    }

    #[test]
    fn test_parse_mapping_rejects_whole_list() {
        let transport = Arc::new(MockTransport::new());
        let err = Registry::parse("10.0.0.5:49,10.0.0.6:abc", transport).unwrap_err();

        assert!(matches!(err, ConfigError::InvalidTriggerKey { .. }));
        assert_eq!(err.span(), Some(12..24));
    }

    #[test]
    fn test_parse_mapping_malformed() {
        assert!(matches!(
            parse_mapping("10.0.0.5"),
            Err(ConfigError::MalformedPair { .. })
        ));
        assert!(matches!(
            parse_mapping("10.0.0.5:49:50"),
            Err(ConfigError::MalformedPair { .. })
        ));
        assert!(matches!(
            parse_mapping("10.0.0.5:49,"),
            Err(ConfigError::MalformedPair { span, .. }) if span == (12..12)
        ));
        assert!(matches!(
            parse_mapping(":49"),
            Err(ConfigError::EmptyAddress { .. })
        ));
        assert!(matches!(
            parse_mapping("10.0.0.5:"),
            Err(ConfigError::InvalidTriggerKey { .. })
        ));
    }

    #[test]
    fn test_parse_mapping_empty() {
        assert!(matches!(parse_mapping(""), Err(ConfigError::EmptyMapping)));
        assert!(matches!(parse_mapping("  "), Err(ConfigError::EmptyMapping)));
    }

    #[test]
    fn test_registry_preserves_order() {
        let transport = Arc::new(MockTransport::new());
        let registry = Registry::parse("10.0.0.5:49,10.0.0.6:50,10.0.0.7:49", transport).unwrap();

        let addresses: Vec<_> = registry.plugs().iter().map(|p| p.address()).collect();
        assert_eq!(addresses, vec!["10.0.0.5", "10.0.0.6", "10.0.0.7"]);

        let matching: Vec<_> = registry
            .plugs_for_key(KeyId(49))
            .map(|p| p.address())
            .collect();
        assert_eq!(matching, vec!["10.0.0.5", "10.0.0.7"]);
        assert_eq!(registry.plugs_for_key(KeyId(51)).count(), 0);
    }

    #[tokio::test]
    async fn test_initialize_populates_plugs() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_with("10.0.0.5", &sysinfo("Lamp", 1));
        transport.respond_with("10.0.0.6", &sysinfo("Fan", 0));

        let registry = Registry::parse("10.0.0.5:49,10.0.0.6:50", transport).unwrap();
        registry.initialize().await.unwrap();

        let lamp = registry.plugs()[0].snapshot().await;
        assert_eq!(lamp.name, "Lamp");
        assert_eq!(lamp.model, "HS100(UK)");
        assert!(lamp.on);

        let fan = registry.plugs()[1].snapshot().await;
        assert_eq!(fan.name, "Fan");
        assert!(!fan.on);
    }

    #[tokio::test]
    async fn test_initialize_fails_fast() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_with("10.0.0.5", &sysinfo("Lamp", 1));
        transport.fail("10.0.0.6");
        transport.respond_with("10.0.0.7", &sysinfo("Heater", 1));

        let registry =
            Registry::parse("10.0.0.5:49,10.0.0.6:50,10.0.0.7:51", transport.clone()).unwrap();
        let err = registry.initialize().await.unwrap_err();

        assert_eq!(err.address(), "10.0.0.6");
        assert!(transport.requests_to("10.0.0.7").is_empty());

        assert_eq!(registry.plugs()[0].snapshot().await.name, "Lamp");
        let heater = registry.plugs()[2].snapshot().await;
        assert!(heater.name.is_empty());
        assert!(heater.model.is_empty());
    }
}
