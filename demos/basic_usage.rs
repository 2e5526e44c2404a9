//! Basic record usage example
//!
//! This example walks one record class through its whole life cycle:
//! - Declaring a class over a table
//! - Inserting and saving records
//! - Updating, selecting and counting
//! - Deleting a record
//!
//! Run with: RUST_LOG=debug cargo run --example basic_usage

use rust_active_record::prelude::*;
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

    println!("=== Rust Active Record - Basic Usage Example ===\n");

    println!("1. Connecting to database...");
    let db = rust_active_record::backends::connect("sqlite3", ":memory:").await?;
    db.execute(
        "create table asd (id integer primary key autoincrement, age int, name text)",
        &[],
    )
    .await?;
    println!("   ✓ Connected, table created\n");

    let asd = RecordClass::builder("asd", db).build();

    println!("2. Inserting records...");
    let foo = asd.insert(fields! { "name" => "foo", "age" => 10 }).await?;
    println!("   ✓ {}", foo);

    let mut bar = asd.new_record(fields! { "name" => "bar" });
    bar.set("age", 11);
    let bar_id = bar.save().await?;
    println!("   ✓ {} (id {})\n", bar, bar_id);

    println!("3. Counting...");
    println!("   {} records\n", asd.count(None).await?);

    println!("4. Updating foo's age...");
    let affected = asd
        .update(fields! { "age" => 20 }, Some(Where::new("name=?", ["foo"])))
        .await?;
    println!("   ✓ {} row(s) updated", affected);

    if let Some(foo) = asd
        .find_first(SelectOptions::new().where_("name=?", ["foo"]))
        .await?
    {
        println!("   foo is now {}\n", foo.get("age"));
    }

    println!("5. Deleting bar...");
    let removed = bar.delete().await?;
    println!("   ✓ removed id {}, persisted={}\n", removed, bar.is_persisted());

    println!("6. Remaining records:");
    for record in asd.all().await? {
        println!("   - {}", record);
    }

    println!("\n=== Example completed successfully ===");
    Ok(())
}
