//! Configuration module
//!
//! Loads message schemas from a TOML registry file and dispatches decoding on
//! a message's own header keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::protocol::{
    decode_packet, decode_slice, encode, CodecError, CodecResult, FieldValues, Layout, Message,
    MessageHeader, Schema, WireType,
};
use crate::record::LayoutCache;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid schema '{name}': {source}")]
    Schema {
        name: String,
        #[source]
        source: CodecError,
    },

    #[error("Duplicate message name: {0}")]
    DuplicateName(String),

    #[error("Duplicate message keys: module {module_key:#04x}, message {message_key:#04x}")]
    DuplicateKeys { module_key: u8, message_key: u8 },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// One message type as declared in the registry file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSchema {
    /// Human-readable message name
    pub name: String,
    pub module_key: u8,
    pub message_key: u8,
    /// Fields in wire order
    #[serde(default)]
    pub fields: Schema,
}

impl MessageSchema {
    pub fn header(&self) -> MessageHeader {
        MessageHeader::new(self.module_key, self.message_key)
    }
}

/// On-disk registry format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "message")]
    messages: Vec<MessageSchema>,
}

/// A registered message type with its planned layout
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub schema: MessageSchema,
    pub layout: Arc<Layout>,
}

/// A message decoded through the registry
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage<'r> {
    pub name: &'r str,
    pub header: MessageHeader,
    pub values: FieldValues,
}

/// Message schemas indexed by name and by header keys
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: Vec<RegistryEntry>,
    by_keys: HashMap<MessageHeader, usize>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, planning every layout up front
    pub fn from_schemas(schemas: Vec<MessageSchema>) -> ConfigResult<Self> {
        let mut registry = Self::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, schema: MessageSchema) -> ConfigResult<()> {
        let header = schema.header();
        if self.by_keys.contains_key(&header) {
            return Err(ConfigError::DuplicateKeys {
                module_key: header.module_key,
                message_key: header.message_key,
            });
        }
        if self.by_name.contains_key(&schema.name) {
            return Err(ConfigError::DuplicateName(schema.name));
        }

        let layout = LayoutCache::shared()
            .get_or_plan(&schema.fields)
            .map_err(|source| ConfigError::Schema {
                name: schema.name.clone(),
                source,
            })?;

        debug!(
            name = %schema.name,
            module_key = header.module_key,
            message_key = header.message_key,
            size = layout.size(),
            "Registered message schema"
        );

        let index = self.entries.len();
        self.by_keys.insert(header, index);
        self.by_name.insert(schema.name.clone(), index);
        self.entries.push(RegistryEntry { schema, layout });
        Ok(())
    }

    /// Parse a registry from TOML text
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let file: RegistryFile = toml::from_str(contents)?;
        Self::from_schemas(file.messages)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        let file = RegistryFile {
            messages: self.entries.iter().map(|e| e.schema.clone()).collect(),
        };
        Ok(toml::to_string_pretty(&file)?)
    }

    /// Load a registry from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load the registry from the default locations, or an empty one
    pub fn load_default() -> ConfigResult<Self> {
        let registry_paths = [
            dirs::config_dir().map(|p| p.join("blueberry/schemas.toml")),
            Some(PathBuf::from("./blueberry.toml")),
        ];

        for path in registry_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save the registry to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = self.to_toml_string()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn lookup(&self, module_key: u8, message_key: u8) -> Option<&RegistryEntry> {
        self.by_keys
            .get(&MessageHeader::new(module_key, message_key))
            .map(|&i| &self.entries[i])
    }

    pub fn by_name(&self, name: &str) -> Option<&RegistryEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Encode values as the named message, using its registered keys
    pub fn encode(&self, name: &str, values: &FieldValues) -> CodecResult<Message> {
        let entry = self
            .by_name(name)
            .ok_or_else(|| CodecError::UnknownSchema(name.to_string()))?;
        encode(
            &entry.layout,
            values,
            entry.schema.module_key,
            entry.schema.message_key,
        )
    }

    /// Decode one message slice with the schema its header keys select
    pub fn decode_message(&self, bytes: &[u8]) -> CodecResult<DecodedMessage<'_>> {
        let header = MessageHeader::from_bytes(bytes)?;
        let entry = self
            .lookup(header.module_key, header.message_key)
            .ok_or(CodecError::UnknownMessage {
                module_key: header.module_key,
                message_key: header.message_key,
            })?;

        let (header, values) = decode_slice(bytes, &entry.layout)?;
        Ok(DecodedMessage {
            name: &entry.schema.name,
            header,
            values,
        })
    }

    /// Split a packet and decode every message in it.
    ///
    /// Each slice is decoded independently; the first failure is returned.
    pub fn decode_packet(&self, data: &[u8]) -> CodecResult<Vec<DecodedMessage<'_>>> {
        let (_, slices) = decode_packet(data)?;
        slices
            .into_iter()
            .map(|slice| self.decode_message(slice))
            .collect()
    }
}

/// Generate a sample registry file
pub fn generate_sample_registry() -> ConfigResult<String> {
    let registry = RegistryFile {
        messages: vec![
            MessageSchema {
                name: "SensorReading".to_string(),
                module_key: 0x01,
                message_key: 0x42,
                fields: Schema::builder()
                    .integer("sensor_id")
                    .float("temperature")
                    .integer_as("humidity", WireType::U16)
                    .boolean("alert_high")
                    .boolean("alert_low")
                    .build(),
            },
            MessageSchema {
                name: "Version".to_string(),
                module_key: 0x42,
                message_key: 0x02,
                fields: Schema::builder()
                    .integer("firmware_version")
                    .integer_as("hardware_rev", WireType::U8)
                    .integer_as("mcu_type", WireType::U8)
                    .integer_as("hardware_type", WireType::U16)
                    .build(),
            },
            MessageSchema {
                name: "WhosThere".to_string(),
                module_key: 0x42,
                message_key: 0x03,
                fields: Schema::default(),
            },
        ],
    };

    Ok(toml::to_string_pretty(&registry)?)
}
