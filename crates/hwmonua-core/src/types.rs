//! Information model types.
//!
//! These are the building blocks shared by the address space, the service
//! handlers and the request transport:
//! - [`NodeId`] identifies a node (`ns=1;s=coretemp-isa-0000_temp1_input`)
//! - [`StatusCode`] carries OPC UA status semantics
//! - [`AccessLevel`] is the per-node / per-user access bitmask
//! - [`DataValue`] is a value plus its status and timestamps

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Well-known numeric identifiers in namespace 0.
pub mod ns0 {
    pub const BASE_DATA_TYPE: u32 = 24;
    pub const DOUBLE: u32 = 11;
    pub const ORGANIZES: u32 = 35;
    pub const HAS_TYPE_DEFINITION: u32 = 40;
    pub const FOLDER_TYPE: u32 = 61;
    pub const BASE_DATA_VARIABLE_TYPE: u32 = 63;
    pub const OBJECTS_FOLDER: u32 = 85;
}

/// Value rank of a scalar variable.
pub const VALUE_RANK_SCALAR: i32 = -1;

/// Value rank of a variable that may hold scalars or arrays.
pub const VALUE_RANK_ANY: i32 = -2;

// ============================================================================
// NodeId
// ============================================================================

/// Identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(u32),
    String(String),
}

/// Node identity: namespace index plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    /// Create a numeric node id.
    pub fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// Create a string node id.
    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// Create a numeric node id in namespace 0.
    pub fn ns0(value: u32) -> Self {
        Self::numeric(0, value)
    }

    /// The Objects folder, root container for application nodes.
    pub fn objects_folder() -> Self {
        Self::ns0(ns0::OBJECTS_FOLDER)
    }

    /// String identifier, if this is a string node id.
    pub fn as_str(&self) -> Option<&str> {
        match &self.identifier {
            Identifier::String(s) => Some(s),
            Identifier::Numeric(_) => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(n) => write!(f, "i={}", n),
            Identifier::String(s) => write!(f, "s={}", s),
        }
    }
}

/// Error returned when a node id string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid node id: {0}")]
pub struct NodeIdParseError(pub String);

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    /// Accepts `ns=<n>;i=<n>`, `ns=<n>;s=<text>`, `i=<n>`, `s=<text>` and the
    /// compact `<n>:<text>` form (always a string identifier).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NodeIdParseError(s.to_string());
        let input = s.trim();

        let (namespace, rest) = if let Some(rest) = input.strip_prefix("ns=") {
            let (ns, rest) = rest.split_once(';').ok_or_else(invalid)?;
            (ns.parse::<u16>().map_err(|_| invalid())?, rest)
        } else if input.starts_with("i=") || input.starts_with("s=") {
            (0, input)
        } else {
            let (ns, text) = input.split_once(':').ok_or_else(invalid)?;
            let namespace = ns.parse::<u16>().map_err(|_| invalid())?;
            if text.is_empty() {
                return Err(invalid());
            }
            return Ok(NodeId::string(namespace, text));
        };

        if let Some(value) = rest.strip_prefix("i=") {
            let value = value.parse::<u32>().map_err(|_| invalid())?;
            Ok(NodeId::numeric(namespace, value))
        } else if let Some(value) = rest.strip_prefix("s=") {
            if value.is_empty() {
                return Err(invalid());
            }
            Ok(NodeId::string(namespace, value))
        } else {
            Err(invalid())
        }
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Names
// ============================================================================

/// Browse name: namespace-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QualifiedName {
    pub namespace: u16,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: u16, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Human readable text with a locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalizedText {
    pub locale: String,
    pub text: String,
}

impl LocalizedText {
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            text: text.into(),
        }
    }

    /// Text in the `en-US` locale.
    pub fn en_us(text: impl Into<String>) -> Self {
        Self::new("en-US", text)
    }
}

// ============================================================================
// StatusCode
// ============================================================================

/// OPC UA status code. The top two bits carry severity, bits 16..28 the
/// sub-code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u32);

impl StatusCode {
    pub const GOOD: Self = Self(0x0000_0000);
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    pub const BAD_OUT_OF_MEMORY: Self = Self(0x8003_0000);
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);
    pub const BAD_SHUTDOWN: Self = Self(0x800C_0000);
    pub const BAD_USER_ACCESS_DENIED: Self = Self(0x801F_0000);
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    pub const BAD_ATTRIBUTE_ID_INVALID: Self = Self(0x8035_0000);
    pub const BAD_INDEX_RANGE_INVALID: Self = Self(0x8036_0000);
    pub const BAD_NOT_READABLE: Self = Self(0x803A_0000);
    pub const BAD_NOT_WRITABLE: Self = Self(0x803B_0000);
    pub const BAD_PARENT_NODE_ID_INVALID: Self = Self(0x805B_0000);
    pub const BAD_NODE_ID_EXISTS: Self = Self(0x805E_0000);
    pub const BAD_TYPE_MISMATCH: Self = Self(0x8074_0000);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    pub const fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Symbolic name, `"Unknown"` for codes not modeled here.
    pub fn name(self) -> &'static str {
        match self {
            Self::GOOD => "Good",
            Self::BAD_INTERNAL_ERROR => "BadInternalError",
            Self::BAD_OUT_OF_MEMORY => "BadOutOfMemory",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_SHUTDOWN => "BadShutdown",
            Self::BAD_USER_ACCESS_DENIED => "BadUserAccessDenied",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_ATTRIBUTE_ID_INVALID => "BadAttributeIdInvalid",
            Self::BAD_INDEX_RANGE_INVALID => "BadIndexRangeInvalid",
            Self::BAD_NOT_READABLE => "BadNotReadable",
            Self::BAD_NOT_WRITABLE => "BadNotWritable",
            Self::BAD_PARENT_NODE_ID_INVALID => "BadParentNodeIdInvalid",
            Self::BAD_NODE_ID_EXISTS => "BadNodeIdExists",
            Self::BAD_TYPE_MISMATCH => "BadTypeMismatch",
            _ => "Unknown",
        }
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::GOOD
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// ============================================================================
// AccessLevel
// ============================================================================

bitflags::bitflags! {
    /// Access level bitmask of a variable node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessLevel: u8 {
        const CURRENT_READ = 0x01;
        const CURRENT_WRITE = 0x02;
        const HISTORY_READ = 0x04;
        const HISTORY_WRITE = 0x08;
        const SEMANTIC_CHANGE = 0x10;
        const STATUS_WRITE = 0x20;
        const TIMESTAMP_WRITE = 0x40;
    }
}

impl AccessLevel {
    pub const NONE: Self = Self::empty();
    /// Every bit set, including the ones without a name.
    pub const ALL: Self = Self::from_bits_retain(0xFF);
}

impl Default for AccessLevel {
    fn default() -> Self {
        Self::NONE
    }
}

impl Serialize for AccessLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

// ============================================================================
// Values
// ============================================================================

/// Scalar payload of a [`DataValue`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
#[non_exhaustive]
pub enum Variant {
    Byte(u8),
    Int32(i32),
    Double(f64),
    String(String),
    NodeId(NodeId),
    QualifiedName(QualifiedName),
    LocalizedText(LocalizedText),
}

impl Variant {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}

/// A value together with its quality and timestamps.
///
/// Every field is optional: a data value without `value` is "absent", a data
/// value without `status` is implicitly Good.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Variant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// A data value with no payload and no status.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A data value carrying only a status.
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Effective status; an unset status means Good.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::GOOD)
    }
}

impl From<Variant> for DataValue {
    fn from(value: Variant) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }
}

// ============================================================================
// Request parameters
// ============================================================================

/// Parsed index range (`"2"`, `"1:3"`, `"0:1,2:3"`), one `(low, high)` pair
/// per dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericRange {
    dimensions: Vec<(u32, u32)>,
}

impl NumericRange {
    /// Parse an index range string. An empty string means "no range".
    pub fn parse(s: &str) -> Result<Option<Self>, StatusCode> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }

        let mut dimensions = Vec::new();
        for part in s.split(',') {
            let bound = |v: &str| {
                v.parse::<u32>()
                    .map_err(|_| StatusCode::BAD_INDEX_RANGE_INVALID)
            };
            let dimension = match part.split_once(':') {
                Some((low, high)) => {
                    let (low, high) = (bound(low)?, bound(high)?);
                    if low >= high {
                        return Err(StatusCode::BAD_INDEX_RANGE_INVALID);
                    }
                    (low, high)
                }
                None => {
                    let index = bound(part)?;
                    (index, index)
                }
            };
            dimensions.push(dimension);
        }

        Ok(Some(Self { dimensions }))
    }

    pub fn dimensions(&self) -> &[(u32, u32)] {
        &self.dimensions
    }
}

impl fmt::Display for NumericRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (low, high)) in self.dimensions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if low == high {
                write!(f, "{}", low)?;
            } else {
                write!(f, "{}:{}", low, high)?;
            }
        }
        Ok(())
    }
}

/// Which timestamps a read should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampsToReturn {
    Source,
    Server,
    #[default]
    Both,
    Neither,
}

impl TimestampsToReturn {
    pub fn includes_source(self) -> bool {
        matches!(self, Self::Source | Self::Both)
    }

    pub fn includes_server(self) -> bool {
        matches!(self, Self::Server | Self::Both)
    }
}

/// Node attributes exposed by the read service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    NodeId,
    BrowseName,
    DisplayName,
    Description,
    #[default]
    Value,
    DataType,
    ValueRank,
    AccessLevel,
    UserAccessLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        assert_eq!(
            NodeId::string(1, "coretemp-isa-0000_temp1_input").to_string(),
            "ns=1;s=coretemp-isa-0000_temp1_input"
        );
        assert_eq!(NodeId::numeric(1, 1337).to_string(), "ns=1;i=1337");
        assert_eq!(NodeId::objects_folder().to_string(), "i=85");
    }

    #[test]
    fn test_node_id_parse() {
        let id: NodeId = "ns=1;s=coretemp-isa-0000_temp1_input".parse().unwrap();
        assert_eq!(id, NodeId::string(1, "coretemp-isa-0000_temp1_input"));

        let id: NodeId = "ns=1;i=1337".parse().unwrap();
        assert_eq!(id, NodeId::numeric(1, 1337));

        let id: NodeId = "i=85".parse().unwrap();
        assert_eq!(id, NodeId::objects_folder());

        // Compact form is always a string identifier
        let id: NodeId = "1:coretemp-isa-0000_temp1_input".parse().unwrap();
        assert_eq!(id.namespace, 1);
        assert_eq!(id.as_str(), Some("coretemp-isa-0000_temp1_input"));
    }

    #[test]
    fn test_node_id_parse_invalid() {
        for input in ["", "ns=x;i=1", "ns=1;i=abc", "ns=1;s=", "ns=1", "nonsense", "1:"] {
            assert!(input.parse::<NodeId>().is_err(), "accepted {:?}", input);
        }
    }

    #[test]
    fn test_status_code_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::GOOD.is_bad());
        assert!(StatusCode::BAD_INDEX_RANGE_INVALID.is_bad());
        assert_eq!(StatusCode::BAD_NODE_ID_UNKNOWN.name(), "BadNodeIdUnknown");
        assert_eq!(StatusCode::from_bits(0x8123_0000).name(), "Unknown");
    }

    #[test]
    fn test_access_level_ops() {
        let read_write = AccessLevel::CURRENT_READ | AccessLevel::CURRENT_WRITE;
        assert!(read_write.contains(AccessLevel::CURRENT_READ));
        assert!(!AccessLevel::CURRENT_READ.contains(read_write));
        assert_eq!(AccessLevel::ALL & AccessLevel::CURRENT_READ, AccessLevel::CURRENT_READ);
        assert!((AccessLevel::NONE & AccessLevel::ALL).is_empty());
        assert_eq!(AccessLevel::ALL.bits(), 0xFF);
        assert_eq!(AccessLevel::NONE.bits(), 0x00);
    }

    #[test]
    fn test_access_level_serializes_as_bits() {
        let level = AccessLevel::CURRENT_READ | AccessLevel::HISTORY_READ;
        assert_eq!(serde_json::to_value(level).unwrap(), serde_json::json!(5));
        assert_eq!(serde_json::to_value(AccessLevel::ALL).unwrap(), serde_json::json!(255));
    }

    #[test]
    fn test_numeric_range_parse() {
        assert_eq!(NumericRange::parse("").unwrap(), None);
        assert_eq!(NumericRange::parse("  ").unwrap(), None);

        let range = NumericRange::parse("2").unwrap().unwrap();
        assert_eq!(range.dimensions(), &[(2, 2)]);

        let range = NumericRange::parse("1:3,0:1").unwrap().unwrap();
        assert_eq!(range.dimensions(), &[(1, 3), (0, 1)]);
        assert_eq!(range.to_string(), "1:3,0:1");
    }

    #[test]
    fn test_numeric_range_invalid() {
        for input in ["3:1", "2:2", "a", "1:", ",", "-1"] {
            assert_eq!(
                NumericRange::parse(input),
                Err(StatusCode::BAD_INDEX_RANGE_INVALID),
                "input {:?}",
                input
            );
        }
    }

    #[test]
    fn test_data_value_serialization() {
        let value = DataValue::from(Variant::Double(45.0));
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["value"]["type"], "Double");
        assert_eq!(json["value"]["value"], 45.0);
        assert!(json.get("status").is_none());

        let json = serde_json::to_value(DataValue::with_status(
            StatusCode::BAD_INDEX_RANGE_INVALID,
        ))
        .unwrap();
        assert_eq!(json["status"], "BadIndexRangeInvalid");
        assert!(json.get("value").is_none());
    }
}
