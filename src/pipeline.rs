use serde_json::Value;
use tracing::debug;

use crate::domain::{SourceDescriptor, URN_FIELD};
use crate::error::PhenolinkError;
use crate::identity::{IdMapping, IdMappingBuilder, normalize};
use crate::links::LinkResolver;
use crate::store::{BATCH_SIZE, DataIndex};

/// Emit a debug checkpoint every this many normalized records.
const CHECKPOINT_EVERY: usize = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub records: usize,
    pub links_rewritten: usize,
}

/// Normalize a stream of decoded `(entity type, record)` pairs and write the
/// records by URN in batches, accumulating the identifier mapping fragments.
/// Returns the still-open mapping builder; sealing it is the caller's phase
/// transition into [`link_pass`]. On error the in-flight batch is rolled
/// back, leaving the index at its committed prefix.
pub fn normalize_pass<I>(
    source: &SourceDescriptor,
    records: I,
    index: &mut dyn DataIndex,
) -> Result<(usize, IdMappingBuilder), PhenolinkError>
where
    I: IntoIterator<Item = (String, Value)>,
{
    let mut builder = IdMappingBuilder::new();

    index.begin()?;
    match write_batches(source, records, index, &mut builder) {
        Ok(records_written) => {
            debug!(records = records_written, "normalization pass complete");
            Ok((records_written, builder))
        }
        Err(err) => {
            index.rollback()?;
            Err(err)
        }
    }
}

fn write_batches<I>(
    source: &SourceDescriptor,
    records: I,
    index: &mut dyn DataIndex,
    builder: &mut IdMappingBuilder,
) -> Result<usize, PhenolinkError>
where
    I: IntoIterator<Item = (String, Value)>,
{
    let mut records_written = 0usize;
    let mut batch_len = 0usize;

    for (entity, raw) in records {
        let (record, fragment) = normalize(source, &entity, raw)?;
        builder.insert(fragment)?;

        let urn = record
            .get(URN_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PhenolinkError::MalformedRecord(format!("normalized {entity} record has no URN"))
            })?;
        index.set(&urn, record)?;

        records_written += 1;
        batch_len += 1;
        if records_written % CHECKPOINT_EVERY == 0 {
            debug!(records = records_written, "normalization checkpoint");
        }
        if batch_len == BATCH_SIZE {
            index.commit()?;
            index.begin()?;
            batch_len = 0;
        }
    }
    index.commit()?;
    Ok(records_written)
}

/// Rewrite the reference fields of every stored record through the sealed
/// mapping, in batches. Requires the mapping to be complete; re-running over
/// an already linked index is a no-op. On error the in-flight batch is
/// rolled back; earlier batches stay committed.
pub fn link_pass(
    index: &mut dyn DataIndex,
    mapping: &IdMapping,
) -> Result<usize, PhenolinkError> {
    let resolver = LinkResolver::new(mapping);
    let mut links_rewritten = 0usize;

    let keys = index.keys();
    for batch in keys.chunks(BATCH_SIZE) {
        index.begin()?;
        match rewrite_batch(index, &resolver, batch) {
            Ok(written) => links_rewritten += written,
            Err(err) => {
                index.rollback()?;
                return Err(err);
            }
        }
        index.commit()?;
    }
    debug!(links = links_rewritten, "link resolution pass complete");
    Ok(links_rewritten)
}

fn rewrite_batch(
    index: &mut dyn DataIndex,
    resolver: &LinkResolver<'_>,
    batch: &[String],
) -> Result<usize, PhenolinkError> {
    let mut written = 0usize;
    for key in batch {
        let mut record = index
            .get(key)
            .cloned()
            .ok_or_else(|| PhenolinkError::UnresolvedKey(key.clone()))?;
        written += resolver.rewrite(&mut record)?;
        index.set(key, record)?;
    }
    Ok(written)
}

/// Full ingestion: normalization pass, mapping seal, link pass. The two
/// passes never interleave; the sealed mapping is the ordering boundary.
pub fn load_index<I>(
    source: &SourceDescriptor,
    records: I,
    index: &mut dyn DataIndex,
) -> Result<LoadSummary, PhenolinkError>
where
    I: IntoIterator<Item = (String, Value)>,
{
    let (records_written, builder) = normalize_pass(source, records, index)?;
    let mapping = builder.seal();
    let links_rewritten = link_pass(index, &mapping)?;
    Ok(LoadSummary {
        records: records_written,
        links_rewritten,
    })
}
