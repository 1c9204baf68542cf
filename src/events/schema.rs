//! Declarative schemas mapping raw event arguments to typed payload fields.
//!
//! # Data Flow
//! ```text
//! SchemaRegistry::standard()
//!     → one JsonSchema per filterable event kind
//!     → decoder.rs resolves/coerces fields per entry
//!     → registry.export() feeds the schema-stubs generator
//! ```
//!
//! Schemas are allow-lists: a raw argument with no schema field never
//! reaches the output payload.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chain::RawLogEntry;
use crate::events::messages::EventKind;

/// Output payload of one decoded entry.
pub type Payload = Map<String, Value>;

/// Coercion target for one schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
        }
    }
}

/// Post-coercion formatting applied to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    /// Integer-coded GUID rendered as a canonical UUID string.
    Uuid,
    /// 40-hex-digit address, `0x` prefix accepted.
    EthAddr,
}

impl FieldFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldFormat::Uuid => "uuid",
            FieldFormat::EthAddr => "ethaddr",
        }
    }
}

/// Pure transform of the full raw entry, for fields that span multiple raw
/// arguments or need reshaping.
pub type ExtractFn = Arc<dyn Fn(&RawLogEntry) -> Option<Value> + Send + Sync>;

/// Where a field's source value comes from.
#[derive(Clone)]
pub enum FieldSource {
    /// Look the value up under this key in the entry's arguments.
    Key(String),
    /// Compute the value from the full raw entry.
    Extract(ExtractFn),
}

/// Declarative description of one output field.
#[derive(Clone)]
pub struct SchemaDef {
    kind: FieldType,
    format: Option<FieldFormat>,
    one_of: Option<Vec<Value>>,
    items: Option<FieldType>,
    source: Option<FieldSource>,
}

impl SchemaDef {
    fn new(kind: FieldType) -> Self {
        Self {
            kind,
            format: None,
            one_of: None,
            items: None,
            source: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn array(items: FieldType) -> Self {
        let mut def = Self::new(FieldType::Array);
        def.items = Some(items);
        def
    }

    pub fn format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Restrict the field to a closed set of legal values.
    pub fn one_of<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Read the source value from a differently named raw argument.
    pub fn source_key(mut self, key: impl Into<String>) -> Self {
        self.source = Some(FieldSource::Key(key.into()));
        self
    }

    /// Compute the source value from the full raw entry.
    pub fn extract<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawLogEntry) -> Option<Value> + Send + Sync + 'static,
    {
        self.source = Some(FieldSource::Extract(Arc::new(f)));
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.kind
    }

    pub fn field_format(&self) -> Option<FieldFormat> {
        self.format
    }

    pub fn permitted(&self) -> Option<&[Value]> {
        self.one_of.as_deref()
    }

    pub fn items_type(&self) -> Option<FieldType> {
        self.items
    }

    pub fn field_source(&self) -> Option<&FieldSource> {
        self.source.as_ref()
    }

    /// JSONSchema fragment for this definition (introspection surface).
    fn descriptor(&self) -> Value {
        let mut def = Map::new();
        def.insert("type".into(), Value::from(self.kind.as_str()));
        if let Some(format) = self.format {
            def.insert("format".into(), Value::from(format.as_str()));
        }
        if let Some(values) = &self.one_of {
            def.insert("enum".into(), Value::Array(values.clone()));
        }
        if let Some(items) = self.items {
            def.insert("items".into(), Value::from(items.as_str()));
        }
        if let Some(FieldSource::Key(key)) = &self.source {
            def.insert("srckey".into(), Value::from(key.as_str()));
        }
        Value::Object(def)
    }
}

impl std::fmt::Debug for SchemaDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaDef")
            .field("type", &self.kind)
            .field("format", &self.format)
            .field("enum", &self.one_of)
            .field("items", &self.items)
            .finish()
    }
}

/// Mapping from output field name to definition. Partial schemas are legal.
#[derive(Debug, Clone, Default)]
pub struct JsonSchema {
    fields: BTreeMap<String, SchemaDef>,
}

impl JsonSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, def: SchemaDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &SchemaDef)> {
        self.fields.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The JSONSchema document for this schema.
    pub fn descriptor(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, def)| (name.clone(), def.descriptor()))
            .collect();
        let mut doc = Map::new();
        doc.insert("properties".into(), Value::Object(properties));
        Value::Object(doc)
    }
}

// Raw arguments may arrive as JSON numbers or as decimal strings (values
// wider than u64 are stringified at the chain boundary).
pub(crate) fn int_arg(entry: &RawLogEntry, key: &str) -> Option<u128> {
    match entry.args.get(key)? {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Split an integer argument into a boolean array sized by a sibling count
/// argument, most significant bit first.
pub fn bool_vector(bits_key: &str, size_key: &str) -> SchemaDef {
    let bits_key = bits_key.to_string();
    let size_key = size_key.to_string();
    SchemaDef::array(FieldType::Boolean).extract(move |entry| {
        let bits = int_arg(entry, &bits_key)?;
        let size = int_arg(entry, &size_key)? as usize;
        let needed = (128 - bits.leading_zeros()) as usize;
        let width = size.max(needed);
        let vector: Vec<Value> = (0..width)
            .rev()
            .map(|i| Value::Bool((bits >> i) & 1 == 1))
            .collect();
        Some(Value::Array(vector))
    })
}

// Commonly used schema properties.

pub fn uint256() -> SchemaDef {
    SchemaDef::integer()
}

pub fn guid() -> SchemaDef {
    SchemaDef::string().format(FieldFormat::Uuid)
}

pub fn bounty_guid() -> SchemaDef {
    guid().source_key("bountyGuid")
}

pub fn eth_address() -> SchemaDef {
    SchemaDef::string().format(FieldFormat::EthAddr)
}

/// Which configured contract a filterable kind watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractRole {
    BountyRegistry,
    ArtifactRegistry,
}

/// One registered event kind: its contract event and decode schema.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Event name as declared in the contract ABI; `"latest"` for blocks.
    pub contract_event: &'static str,
    /// Contract the filter watches; `None` for the latest-block filter.
    pub contract: Option<ContractRole>,
    pub schema: JsonSchema,
}

/// All schemas known to the daemon, keyed by event kind.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entries: BTreeMap<EventKind, RegistryEntry>,
}

impl SchemaRegistry {
    /// The built-in registry covering every filterable kind.
    pub fn standard() -> Self {
        let mut entries = BTreeMap::new();

        entries.insert(
            EventKind::Block,
            RegistryEntry {
                contract_event: "latest",
                contract: None,
                schema: JsonSchema::new().field("number", uint256()),
            },
        );

        entries.insert(
            EventKind::BountyCreated,
            RegistryEntry {
                contract_event: "NewBounty",
                contract: Some(ContractRole::BountyRegistry),
                schema: JsonSchema::new()
                    .field("guid", guid())
                    .field(
                        "artifact_type",
                        SchemaDef::string()
                            .one_of(["file", "url"])
                            .extract(|entry| {
                                let code = int_arg(entry, "artifactType")?;
                                let name = match code {
                                    0 => "file".to_string(),
                                    1 => "url".to_string(),
                                    other => other.to_string(),
                                };
                                Some(Value::from(name))
                            }),
                    )
                    .field("author", eth_address())
                    .field("amount", SchemaDef::string())
                    .field("uri", SchemaDef::string().source_key("artifactURI"))
                    .field(
                        "expiration",
                        SchemaDef::string().source_key("expirationBlock"),
                    )
                    .field("metadata", SchemaDef::string()),
            },
        );

        entries.insert(
            EventKind::AssertionPosted,
            RegistryEntry {
                contract_event: "NewAssertion",
                contract: Some(ContractRole::BountyRegistry),
                schema: JsonSchema::new()
                    .field("bounty_guid", bounty_guid())
                    .field("author", eth_address())
                    .field("index", uint256())
                    .field("bid", SchemaDef::array(FieldType::String))
                    .field("mask", bool_vector("mask", "numArtifacts"))
                    .field("commitment", SchemaDef::string()),
            },
        );

        entries.insert(
            EventKind::VerdictSettled,
            RegistryEntry {
                contract_event: "SettledBounty",
                contract: Some(ContractRole::BountyRegistry),
                schema: JsonSchema::new()
                    .field("bounty_guid", bounty_guid())
                    .field("settler", eth_address())
                    .field("payout", uint256()),
            },
        );

        entries.insert(
            EventKind::ArtifactUploaded,
            RegistryEntry {
                contract_event: "ArtifactUploaded",
                contract: Some(ContractRole::ArtifactRegistry),
                schema: JsonSchema::new()
                    .field("author", eth_address())
                    .field("uri", SchemaDef::string())
                    .field("index", uint256()),
            },
        );

        Self { entries }
    }

    pub fn get(&self, kind: EventKind) -> Option<&RegistryEntry> {
        self.entries.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.entries.keys().copied()
    }

    /// JSONSchema documents for every registered kind, for stub generation.
    pub fn export(&self) -> Value {
        let docs: Map<String, Value> = self
            .entries
            .iter()
            .map(|(kind, entry)| (kind.as_str().to_string(), entry.schema.descriptor()))
            .collect();
        Value::Object(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_filterable_kinds() {
        let registry = SchemaRegistry::standard();
        for kind in EventKind::FILTERABLE {
            assert!(registry.get(kind).is_some(), "no schema for {kind}");
        }
        assert!(registry.get(EventKind::Error).is_none());
    }

    #[test]
    fn test_export_includes_srckey_and_enum() {
        let registry = SchemaRegistry::standard();
        let export = registry.export();

        let bounty = &export["bounty-created"]["properties"];
        assert_eq!(bounty["uri"]["srckey"], "artifactURI");
        assert_eq!(bounty["artifact_type"]["enum"][0], "file");
        assert_eq!(bounty["guid"]["format"], "uuid");

        let assertion = &export["assertion-posted"]["properties"];
        assert_eq!(assertion["mask"]["type"], "array");
        assert_eq!(assertion["mask"]["items"], "boolean");
        // Extraction functions have no source key to export.
        assert!(assertion["mask"].get("srckey").is_none());
    }

    #[test]
    fn test_bool_vector_width_follows_count_argument() {
        use alloy::primitives::{Address, B256};
        let mut args = Map::new();
        args.insert("mask".into(), Value::from(16u64));
        args.insert("numArtifacts".into(), Value::from(10u64));
        let entry = RawLogEntry {
            event: "NewAssertion".to_string(),
            args,
            log_index: 0,
            transaction_index: 0,
            transaction_hash: B256::ZERO,
            address: Address::ZERO,
            block_hash: B256::ZERO,
            block_number: 1,
        };

        let def = bool_vector("mask", "numArtifacts");
        let Some(FieldSource::Extract(f)) = def.field_source() else {
            panic!("bool_vector must be extraction-sourced");
        };
        let Value::Array(bits) = f(&entry).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(bits.len(), 10);
        // 16 = 0b10000 → one set bit, fifth from the right.
        assert_eq!(bits[5], Value::Bool(true));
        assert_eq!(bits.iter().filter(|b| **b == Value::Bool(true)).count(), 1);
    }
}
