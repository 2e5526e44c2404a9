//! Write policy and codecs
//!
//! `asd1` denies two fields; `asd2` allows only two and stores `name` as JSON
//! text. Neither table has `x` or `y` columns, so the saves only succeed
//! because the policy drops them.
//!
//! Run with: cargo run --example codecs

use rust_active_record::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,rust_active_record=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config: DriverConfig =
        serde_json::from_str(r#"{ "backend": "sqlite3", "connection_string": ":memory:" }"#)?;
    let db = config.open().await?;

    for table in ["asd1", "asd2"] {
        db.execute(
            &format!(
                "create table {} (id integer primary key autoincrement, age int, name text)",
                table
            ),
            &[],
        )
        .await?;
    }

    let asd1 = RecordClass::builder("asd1", Arc::clone(&db))
        .deny(["x", "y"])
        .build();
    let asd2 = RecordClass::builder("asd2", db)
        .allow(["name", "age"])
        .codec("name", Codec::json())
        .build();

    let mut foo = asd1.new_record(fields! { "name" => "foo", "age" => 10, "x" => 1, "y" => 2 });
    let foo_id = foo.save().await?;
    println!("foo = {}", foo);
    if let Some(stored) = asd1.find_by_key(foo_id).await? {
        println!("foo from db: {}", stored);
    }

    let mut bar = asd2.new_record(Vec::<(String, DatabaseValue)>::new());
    bar.set("name", json!({"first": "bar", "last": "smith"}));
    bar.set("age", 11);
    bar.set("x", 1);
    bar.set("y", 2);
    let bar_id = bar.save().await?;
    println!("bar = {}, bar.name = {:?}", bar, bar.get("name"));

    if let Some(stored) = asd2.find_by_key(bar_id).await? {
        println!("bar from db: {}", stored);
    }

    Ok(())
}
