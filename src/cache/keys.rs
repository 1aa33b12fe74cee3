//! Cache key definitions
//!
//! One key per upstream resource. The file name doubles as the storage key.

use std::fmt;

use crate::protocol::kinds;

/// Resource addressed by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// Node list of the account
    NodeList,
    /// Devices attached to one node
    DeviceList { node_id: u64 },
    /// Parameter dump of one device
    DeviceDump { node_id: u64, did: u64 },
}

impl ResourceKey {
    /// Protocol discriminator of the request that fetches this resource
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeList => kinds::NODE_LIST,
            Self::DeviceList { .. } => kinds::DEVICE_LIST,
            Self::DeviceDump { .. } => kinds::DEVICE_DUMP,
        }
    }

    /// Convert to storage file name
    /// Format: node_list.json, devx_list_{node}.json, dump_devm_{node}_{did}.json
    pub fn file_name(&self) -> String {
        match self {
            Self::NodeList => format!("{}.json", kinds::NODE_LIST),
            Self::DeviceList { node_id } => format!("{}_{}.json", kinds::DEVICE_LIST, node_id),
            Self::DeviceDump { node_id, did } => {
                format!("{}_{}_{}.json", kinds::DEVICE_DUMP, node_id, did)
            }
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeList => write!(f, "{}", self.kind()),
            Self::DeviceList { node_id } => write!(f, "{}[node={}]", self.kind(), node_id),
            Self::DeviceDump { node_id, did } => {
                write!(f, "{}[node={},did={}]", self.kind(), node_id, did)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(ResourceKey::NodeList.file_name(), "node_list.json");
        assert_eq!(
            ResourceKey::DeviceList { node_id: 12345 }.file_name(),
            "devx_list_12345.json"
        );
        assert_eq!(
            ResourceKey::DeviceDump { node_id: 12345, did: 17693 }.file_name(),
            "dump_devm_12345_17693.json"
        );
    }

    #[test]
    fn test_display() {
        let key = ResourceKey::DeviceDump { node_id: 5, did: 9 };
        assert_eq!(key.to_string(), "dump_devm[node=5,did=9]");
        assert_eq!(key.kind(), "dump_devm");
    }
}
