//! Records as foreign keys
//!
//! Seeds two tables with batch inserts, then passes a phone record wherever a
//! phone id is expected.
//!
//! Run with: cargo run --example foreign_keys

use rust_active_record::prelude::*;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn setup(db: &Arc<dyn Database>) -> Result<()> {
    db.execute(
        "create table users (id integer primary key autoincrement, name text, phone integer)",
        &[],
    )
    .await?;
    db.execute(
        "create table phones (id integer primary key autoincrement, model text, features text)",
        &[],
    )
    .await?;

    db.execute_batch(
        "insert into phones (model, features) values (?, ?)",
        &[
            vec!["iPhone".into(), "A".into()],
            vec!["Android".into(), "B".into()],
            vec!["Blackberry".into(), "C".into()],
        ],
    )
    .await?;

    let users: Vec<Vec<DatabaseValue>> = [
        ("tuna1", 1),
        ("tuna2", 2),
        ("tuna3", 3),
        ("aldrA", 1),
        ("aldrB", 2),
        ("cassX", 3),
    ]
    .into_iter()
    .map(|(name, phone)| vec![name.into(), phone.into()])
    .collect();
    db.execute_batch("insert into users (name, phone) values (?, ?)", &users)
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,rust_active_record=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = rust_active_record::backends::connect("sqlite3", ":memory:").await?;
    setup(&db).await?;

    let phones = RecordClass::builder("phones", Arc::clone(&db)).build();
    let users = RecordClass::builder("users", db).build();

    let iphone = phones
        .find_first(SelectOptions::new().where_("model=?", ["iPhone"]))
        .await?
        .ok_or_else(|| DatabaseError::other("iPhone row missing"))?;
    println!("iphone = {:?}", iphone);

    let newuser = users
        .insert([
            ("name", DatabaseValue::from("foobar")),
            ("phone", DatabaseValue::from(&iphone)),
        ])
        .await?;
    println!("new user = {:?}", newuser);

    println!("{} users found", users.count(None).await?);

    let iphone_users = users
        .find(SelectOptions::new().filter(Where::raw("phone=?").arg(&iphone)))
        .await?;
    for user in iphone_users.into_records() {
        println!("{}", user);
    }

    Ok(())
}
