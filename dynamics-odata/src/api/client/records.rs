//! Record-level operations: schema lookup, mapping and change tracking

use log::{debug, warn};

use super::DynamicsClient;
use crate::api::operations::WriteMode;
use crate::api::query::{ListResult, OrderBy, QueryOptions};
use crate::error::Result;
use crate::mapper::fetchxml;
use crate::model::{Record, RecordRef};
use crate::schema::{EntitySchema, OutboundMapping};

/// Records of one list request with the paging state of the response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub records: Vec<Record>,
    pub count: Option<u64>,
    pub skip_token: Option<String>,
    pub more_records: bool,
    pub total_record_count: Option<i64>,
    pub total_record_count_limit_exceeded: bool,
    pub paging_cookie: Option<String>,
}

impl RecordSet {
    fn new(records: Vec<Record>, page: ListResult) -> Self {
        Self {
            records,
            count: page.count,
            skip_token: page.skip_token,
            more_records: page.more_records,
            total_record_count: page.total_record_count,
            total_record_count_limit_exceeded: page.total_record_count_limit_exceeded,
            paging_cookie: page.paging_cookie,
        }
    }
}

/// Wire name to select, order or filter a logical attribute by
fn wire_field(schema: &EntitySchema, logical: &str) -> Option<String> {
    match schema.outbound_for(logical)? {
        OutboundMapping::Field(wire) => Some(wire.clone()),
        OutboundMapping::Navigation(_) => Some(schema.foreign_key_field(logical)),
    }
}

/// Rewrite `$select` and `$orderby` from logical to wire names, dropping unknown fields
fn to_wire_options(schema: &EntitySchema, options: &QueryOptions) -> QueryOptions {
    let mut wire = options.clone();

    wire.select = options
        .select
        .iter()
        .filter_map(|field| {
            let mapped = wire_field(schema, field);
            if mapped.is_none() {
                warn!("Cannot select unknown field '{}' of '{}'", field, schema.name);
            }
            mapped
        })
        .collect();

    wire.order_by = options
        .order_by
        .iter()
        .filter_map(|order| match wire_field(schema, &order.field) {
            Some(field) => Some(OrderBy {
                field,
                descending: order.descending,
            }),
            None => {
                warn!("Cannot order by unknown field '{}' of '{}'", order.field, schema.name);
                None
            }
        })
        .collect();

    wire
}

impl DynamicsClient {
    /// Fetch a record by reference, selecting `columns` (all when empty)
    pub async fn retrieve(&self, reference: &RecordRef, columns: &[&str]) -> Result<Option<Record>> {
        let mapper = self.mapper().await?;
        let schema = mapper.schema().entity_schema(&reference.logical_name)?;
        let collection = mapper.schema().collection_name(&reference.logical_name)?;
        let key = reference.key_segment()?;

        let options = to_wire_options(schema, &QueryOptions::new().select(columns.iter().copied()));
        let Some(wire) = self.get_record(collection, &key, &options).await? else {
            return Ok(None);
        };

        let mut identity = reference.clone();
        if identity.id.is_none() {
            identity.id = schema
                .key
                .as_deref()
                .and_then(|key| wire.get(key))
                .and_then(|id| id.as_str())
                .map(str::to_string);
        }
        mapper.deserialize(&wire, identity, None).map(Some)
    }

    /// Create `record` from its changed attributes; sets its id and clears the change flags
    pub async fn create_record(&self, record: &mut Record) -> Result<String> {
        let mapper = self.mapper().await?;
        let collection = mapper.schema().collection_name(&record.logical_name)?;
        let payload = mapper.serialize(record)?;

        let id = self.create(collection, payload).await?;
        debug!("Created {}({})", record.logical_name, id);
        record.id = Some(id.clone());
        record.reset_changed();
        Ok(id)
    }

    /// Write the changed attributes of an existing record
    pub async fn update_record(&self, record: &mut Record) -> Result<()> {
        self.write_record(record, WriteMode::UpdateOnly).await?;
        Ok(())
    }

    /// Update `record`, creating it when its id or alternate key is unknown
    pub async fn upsert_record(&self, record: &mut Record) -> Result<Option<String>> {
        let id = self.write_record(record, WriteMode::Upsert).await?;
        if record.id.is_none() {
            record.id = id.clone();
        }
        Ok(id)
    }

    async fn write_record(&self, record: &mut Record, mode: WriteMode) -> Result<Option<String>> {
        let key = record.to_reference().key_segment()?;
        if !record.has_changes() {
            debug!("{} has no changes to write", record.to_reference());
            return Ok(record.id.clone());
        }

        let mapper = self.mapper().await?;
        let collection = mapper.schema().collection_name(&record.logical_name)?;
        let payload = mapper.serialize(record)?;

        let id = self.update(collection, &key, payload, mode).await?;
        record.reset_changed();
        Ok(id)
    }

    pub async fn delete_record(&self, reference: &RecordRef) -> Result<()> {
        let collection = self.collection_name(&reference.logical_name).await?;
        self.delete(&collection, &reference.key_segment()?).await
    }

    /// Link two records through a navigation property of `from`
    pub async fn associate_records(
        &self,
        from: &RecordRef,
        navigation: &str,
        to: &RecordRef,
    ) -> Result<()> {
        let schema = self.get_schema().await?;
        let collection = schema.collection_name(&from.logical_name)?;
        let target = format!(
            "{}({})",
            schema.collection_name(&to.logical_name)?,
            to.key_segment()?
        );
        self.associate(collection, &from.key_segment()?, navigation, &target)
            .await
    }

    pub async fn disassociate_records(
        &self,
        from: &RecordRef,
        navigation: &str,
        to: Option<&RecordRef>,
    ) -> Result<()> {
        let collection = self.collection_name(&from.logical_name).await?;
        let target_key = to.map(RecordRef::key_segment).transpose()?;
        self.disassociate(
            &collection,
            &from.key_segment()?,
            navigation,
            target_key.as_deref(),
        )
        .await
    }

    /// Query records of `entity`; select and order fields use logical names
    pub async fn retrieve_multiple(&self, entity: &str, options: &QueryOptions) -> Result<RecordSet> {
        let mapper = self.mapper().await?;
        let schema = mapper.schema().entity_schema(entity)?;
        let collection = mapper.schema().collection_name(entity)?;

        let mut page = self
            .list(collection, &to_wire_options(schema, options))
            .await?;
        let records = std::mem::take(&mut page.records)
            .iter()
            .map(|wire| mapper.deserialize_wire(entity, wire, None))
            .collect::<Result<Vec<_>>>()?;

        Ok(RecordSet::new(records, page))
    }

    /// Run a FetchXML query against its root entity's collection
    pub async fn retrieve_fetchxml(&self, fetch_xml: &str) -> Result<RecordSet> {
        let entity = fetchxml::root_entity_name(fetch_xml)?;
        let mapper = self.mapper().await?;
        let collection = mapper.schema().collection_name(&entity)?;
        let aliases = mapper.alias_type_map(fetch_xml)?;

        let mut page = self
            .list(collection, &QueryOptions::new().fetch_xml(fetch_xml))
            .await?;
        let records = std::mem::take(&mut page.records)
            .iter()
            .map(|wire| mapper.deserialize_wire(&entity, wire, Some(&aliases)))
            .collect::<Result<Vec<_>>>()?;

        Ok(RecordSet::new(records, page))
    }
}
