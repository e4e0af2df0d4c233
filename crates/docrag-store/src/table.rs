use anyhow::Result;
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, Table};
use std::sync::Arc;

use crate::schema::{build_meta_schema, column};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

/// Open `name`, creating it empty with `schema` first if it does not exist.
pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<Table> {
    let names = conn.table_names().execute().await?;
    if !names.iter().any(|n| n == name) {
        // create empty table with 0 rows
        let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
        conn.create_table(name, Box::new(iter)).execute().await?;
    }
    Ok(conn.open_table(name).execute().await?)
}

pub async fn append(table: &Table, batch: RecordBatch) -> Result<()> {
    if batch.num_rows() == 0 {
        return Ok(());
    }
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    table.add(reader).execute().await?;
    Ok(())
}

/// Every batch matching `filter` (all rows when `None`), optionally projected.
pub async fn scan(table: &Table, filter: Option<&str>, columns: Option<&[&str]>) -> Result<Vec<RecordBatch>> {
    let mut query = table.query();
    if let Some(filter) = filter {
        query = query.only_if(filter);
    }
    if let Some(columns) = columns {
        query = query.select(Select::columns(columns));
    }
    let stream = query.execute().await?;
    Ok(stream.try_collect::<Vec<_>>().await?)
}

/// SQL `IN` list for integer ids.
pub fn id_list(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
}

// Key/value rows used for the id counters
pub async fn set_meta(table: &Table, key: &str, value: &str) -> Result<()> {
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    // Upsert behavior via merge_insert: key is unique
    let mut mi = table.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await?;
    Ok(())
}

pub async fn get_meta(table: &Table, key: &str) -> Result<Option<String>> {
    let filter = format!("key = '{}'", key.replace('\'', "''"));
    for batch in scan(table, Some(&filter), None).await? {
        if batch.num_rows() == 0 {
            continue;
        }
        let val = column::<StringArray>(&batch, "value")?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}
