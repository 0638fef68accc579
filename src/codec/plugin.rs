//! Plugin command payloads
//!
//! ```text
//! Plugin control  [action] or [action, target plugin]
//! Plugin orders   [first, second, third]
//! Plugin list     [N, e0, e1, ..., eN-1]
//! ```
//!
//! The target plugin byte of plugin control only exists on camera
//! generations that can start a plugin by index.

use super::enums::{decode_enum, ByteEnum, PluginPowerStatus};
use super::values::require_len;
use crate::error::{ProtocolError, ThetaBleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginControl {
    pub action: PluginPowerStatus,
    pub target_plugin: Option<u8>,
}

impl PluginControl {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let action = decode_enum::<PluginPowerStatus>(bytes)?;
        let target_plugin = bytes.get(1).copied();
        Ok(Self {
            action,
            target_plugin,
        })
    }

    /// `None` when `action` is the `Unknown` sentinel.
    pub fn encode(&self) -> Option<Vec<u8>> {
        let mut bytes = vec![self.action.to_byte()?];
        if let Some(target) = self.target_plugin {
            bytes.push(target);
        }
        Some(bytes)
    }
}

/// Boot order of the three plugin slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginOrders {
    pub first: u8,
    pub second: u8,
    pub third: u8,
}

impl PluginOrders {
    const LEN: usize = 3;

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        require_len("plugin orders", bytes, Self::LEN)?;
        Ok(Self {
            first: bytes[0],
            second: bytes[1],
            third: bytes[2],
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![self.first, self.second, self.third]
    }
}

/// Installed plugins, in camera order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginList {
    plugins: Vec<u8>,
}

impl PluginList {
    pub const MAX_LEN: usize = u8::MAX as usize;

    pub fn new(plugins: Vec<u8>) -> Result<Self, ThetaBleError> {
        if plugins.len() > Self::MAX_LEN {
            return Err(ThetaBleError::InvalidArgument(format!(
                "plugin list holds at most {} entries, got {}",
                Self::MAX_LEN,
                plugins.len()
            )));
        }
        Ok(Self { plugins })
    }

    pub fn plugins(&self) -> &[u8] {
        &self.plugins
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        require_len("plugin list", bytes, 1)?;
        let count = bytes[0] as usize;
        require_len("plugin list", bytes, count + 1)?;
        Ok(Self {
            plugins: bytes[1..=count].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.plugins.len() + 1);
        // `new` caps the length at u8::MAX
        bytes.push(self.plugins.len() as u8);
        bytes.extend_from_slice(&self.plugins);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_orders_round_trip() {
        for (first, second, third) in [(0, 0, 0), (1, 2, 3), (255, 128, 0), (7, 255, 255)] {
            let orders = PluginOrders {
                first,
                second,
                third,
            };
            assert_eq!(PluginOrders::decode(&orders.encode()), Ok(orders));
        }
    }

    #[test]
    fn test_plugin_orders_too_short() {
        assert_eq!(
            PluginOrders::decode(&[1, 2]),
            Err(ProtocolError::TooShort {
                what: "plugin orders",
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            PluginOrders::decode(&[]),
            Err(ProtocolError::Empty {
                what: "plugin orders"
            })
        );
    }

    #[test]
    fn test_plugin_list_round_trip() {
        for len in [0usize, 1, 3, 255] {
            let list = PluginList::new((0..len).map(|i| i as u8).collect()).unwrap();
            let bytes = list.encode();
            assert_eq!(bytes[0] as usize, len);
            assert_eq!(PluginList::decode(&bytes), Ok(list));
        }
    }

    #[test]
    fn test_plugin_list_requires_count_plus_one_bytes() {
        assert_eq!(
            PluginList::decode(&[3, 1, 2]),
            Err(ProtocolError::TooShort {
                what: "plugin list",
                expected: 4,
                actual: 3
            })
        );
        // trailing bytes past the count are ignored
        let list = PluginList::decode(&[1, 9, 8]).unwrap();
        assert_eq!(list.plugins(), &[9]);
    }

    #[test]
    fn test_plugin_list_rejects_oversized_input() {
        assert!(matches!(
            PluginList::new(vec![0; 256]),
            Err(ThetaBleError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_plugin_control_optional_target() {
        assert_eq!(
            PluginControl::decode(&[]),
            Err(ProtocolError::Empty {
                what: "plugin power status"
            })
        );
        assert_eq!(
            PluginControl::decode(&[0x01]),
            Ok(PluginControl {
                action: PluginPowerStatus::Running,
                target_plugin: None
            })
        );
        assert_eq!(
            PluginControl::decode(&[0x01, 0x02]),
            Ok(PluginControl {
                action: PluginPowerStatus::Running,
                target_plugin: Some(2)
            })
        );
    }

    #[test]
    fn test_plugin_control_encode_length() {
        let stop = PluginControl {
            action: PluginPowerStatus::Stop,
            target_plugin: None,
        };
        assert_eq!(stop.encode(), Some(vec![0x00]));

        let start = PluginControl {
            action: PluginPowerStatus::Running,
            target_plugin: Some(1),
        };
        assert_eq!(start.encode(), Some(vec![0x01, 0x01]));

        let unknown = PluginControl {
            action: PluginPowerStatus::Unknown,
            target_plugin: None,
        };
        assert_eq!(unknown.encode(), None);
    }
}
