//! Typed records and the layout cache
//!
//! A [`Record`] declares its schema once and converts to and from
//! [`FieldValues`]. Layouts are planned on first use and shared through a
//! [`LayoutCache`] for the rest of the process.

use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::protocol::{
    decode, decode_slice, encode, plan, CodecResult, FieldValues, Layout, Message, MessageHeader,
    Schema,
};

/// A record type with a fixed wire schema
pub trait Record: Sized + 'static {
    /// Field declarations in wire order
    fn schema() -> Schema;

    fn to_values(&self) -> FieldValues;

    fn from_values(values: &FieldValues) -> CodecResult<Self>;
}

/// Memoised layouts, planned at most once per distinct schema
#[derive(Default)]
pub struct LayoutCache {
    by_schema: RwLock<HashMap<Schema, Arc<Layout>>>,
    by_type: RwLock<HashMap<TypeId, Arc<Layout>>>,
    plans: AtomicUsize,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache used by [`encode_record`] and [`decode_record`]
    pub fn shared() -> &'static LayoutCache {
        static SHARED: OnceLock<LayoutCache> = OnceLock::new();
        SHARED.get_or_init(LayoutCache::new)
    }

    /// Layout for `schema`, planning it if no equal schema has been seen
    pub fn get_or_plan(&self, schema: &Schema) -> CodecResult<Arc<Layout>> {
        if let Some(layout) = self.by_schema.read().get(schema) {
            return Ok(Arc::clone(layout));
        }

        let mut layouts = self.by_schema.write();
        // Another caller may have planned it between the two locks
        if let Some(layout) = layouts.get(schema) {
            return Ok(Arc::clone(layout));
        }

        let layout = Arc::new(plan(schema)?);
        self.plans.fetch_add(1, Ordering::Relaxed);
        debug!(
            fields = schema.len(),
            size = layout.size(),
            "Cached layout"
        );

        layouts.insert(schema.clone(), Arc::clone(&layout));
        Ok(layout)
    }

    /// Layout for a record type, looked up by type without rebuilding its schema
    pub fn layout_of<R: Record>(&self) -> CodecResult<Arc<Layout>> {
        let type_id = TypeId::of::<R>();
        if let Some(layout) = self.by_type.read().get(&type_id) {
            return Ok(Arc::clone(layout));
        }

        let layout = self.get_or_plan(&R::schema())?;
        let mut by_type = self.by_type.write();
        Ok(Arc::clone(by_type.entry(type_id).or_insert(layout)))
    }

    /// Number of distinct schemas cached
    pub fn len(&self) -> usize {
        self.by_schema.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times the planner has actually run
    pub fn plan_count(&self) -> usize {
        self.plans.load(Ordering::Relaxed)
    }
}

/// Encode a record with its cached layout
pub fn encode_record<R: Record>(record: &R, module_key: u8, message_key: u8) -> CodecResult<Message> {
    let layout = LayoutCache::shared().layout_of::<R>()?;
    encode(&layout, &record.to_values(), module_key, message_key)
}

/// Decode a message into a record with its cached layout
pub fn decode_record<R: Record>(message: &Message) -> CodecResult<(MessageHeader, R)> {
    let layout = LayoutCache::shared().layout_of::<R>()?;
    let (header, values) = decode(message, &layout)?;
    Ok((header, R::from_values(&values)?))
}

/// Decode a borrowed message slice into a record
pub fn decode_record_slice<R: Record>(bytes: &[u8]) -> CodecResult<(MessageHeader, R)> {
    let layout = LayoutCache::shared().layout_of::<R>()?;
    let (header, values) = decode_slice(bytes, &layout)?;
    Ok((header, R::from_values(&values)?))
}
