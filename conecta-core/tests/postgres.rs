//! Runs only when `CONECTA_TEST_POSTGRES_URL` points at a writable database.

use std::collections::HashMap;

use anyhow::Result;
use arrow_schema::{DataType, TimeUnit};
use conecta_core::{read_sql, PartitionRequest};

fn postgres_url() -> Option<String> {
    std::env::var("CONECTA_TEST_POSTGRES_URL").ok()
}

#[test]
fn reads_typed_columns_in_partitions() -> Result<()> {
    let Some(url) = postgres_url() else {
        eprintln!("CONECTA_TEST_POSTGRES_URL not set, skipping");
        return Ok(());
    };

    let mut client = postgres::Client::connect(&url, postgres::NoTls)?;
    client.batch_execute(
        "DROP TABLE IF EXISTS conecta_events;
         CREATE TABLE conecta_events AS
         SELECT g::bigint AS id,
                (g % 3 = 0) AS flag,
                'event ' || g AS label,
                DATE '2024-01-01' + g AS day,
                TIMESTAMPTZ '2024-01-01 00:00:00+00' + g * INTERVAL '1 minute' AS at,
                decode(md5(g::text), 'hex') AS digest
         FROM generate_series(1, 1000) AS g;
         INSERT INTO conecta_events (id) VALUES (NULL);",
    )?;

    let mut extra = HashMap::new();
    extra.insert("max_pool_size".to_string(), "3".to_string());
    let table = read_sql(
        &url,
        PartitionRequest::new("select * from conecta_events")
            .partition_on("id")
            .partition_num(3),
        "arrow",
        &extra,
    )?
    .into_table()
    .ok_or_else(|| anyhow::anyhow!("expected an arrow table"))?;

    // The row with a NULL partition column falls outside every range.
    assert_eq!(table.num_rows(), 1000);
    let schema = table.schema();
    assert_eq!(schema.field_with_name("flag")?.data_type(), &DataType::Boolean);
    assert_eq!(schema.field_with_name("label")?.data_type(), &DataType::Utf8);
    assert_eq!(schema.field_with_name("day")?.data_type(), &DataType::Date32);
    assert_eq!(
        schema.field_with_name("at")?.data_type(),
        &DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
    );
    assert_eq!(schema.field_with_name("digest")?.data_type(), &DataType::Binary);

    client.batch_execute("DROP TABLE conecta_events;")?;
    Ok(())
}
