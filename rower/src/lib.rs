//! Asynchronous Postgres Driver with Row Loaders
//!
//! Rows are streamed straight from the socket into a destination, a [`Loader`].
//! Columns are received in text format and decoded with [`Decode`].
//!
//! # Examples
//!
//! Single connection:
//!
//! ```no_run
//! use rower::Connection;
//!
//! #[derive(Default, rower::Record)]
//! struct Post {
//!     id: i32,
//!     #[sql("title")]
//!     name: String,
//! }
//!
//! # async fn app() -> rower::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//!
//! let posts = rower::query("SELECT id, title FROM post WHERE id > $1", &mut conn)
//!     .bind(4)
//!     .fetch_all::<Post>()
//!     .await?;
//!
//! rower::query("SELECT id, title FROM post", &mut conn)
//!     .rower(|id: i32, title: String| println!("{id}: {title}"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Database Pooling:
//!
//! ```no_run
//! use rower::Pool;
//!
//! # async fn app() -> rower::Result<()> {
//! let pool = Pool::connect_env().await?;
//!
//! rower::query("CREATE TEMP TABLE foo(id int)", &pool)
//!     .execute()
//!     .await?;
//!
//! let mut handles = vec![];
//!
//! for i in 0..14 {
//!     let pool = pool.clone();
//!     let t = tokio::spawn(async move {
//!         rower::query("INSERT INTO foo(id) VALUES($1)", &pool)
//!             .bind(i)
//!             .execute()
//!             .await
//!     });
//!     handles.push(t);
//! }
//!
//! for h in handles {
//!     h.await.unwrap();
//! }
//!
//! let mut ids = rower::loader::Ints::default();
//! rower::query("SELECT id FROM foo", &pool)
//!     .load(&mut ids)
//!     .await?;
//!
//! assert_eq!(ids.0.len(), 14);
//!
//! # Ok(())
//! # }
//! # mod tokio { pub fn spawn<F>(_: F) -> F { todo!() } }
//! ```
extern crate self as rower;

pub mod common;
mod io;
mod net;
mod ext;

// Protocol
pub mod postgres;

// Encoding
mod value;
pub mod encode;
pub mod decode;

// Component
mod statement;
pub mod sql;
pub mod row;
pub mod mapper;
pub mod loader;

// Operation
pub mod transport;
pub mod executor;
mod engine;
pub mod query;
pub mod transaction;

// Connection
pub mod connection;
pub mod pool;

pub mod types;
pub mod error;

#[cfg(test)]
mod test_util;

pub use encode::Encode;
pub use decode::{Decode, DecodeError};
pub use row::{Column, RowResult};
pub use mapper::Record;
pub use loader::Loader;
pub use sql::SqlExt;

pub use executor::Executor;
pub use connection::{Connection, Config};
pub use pool::{Pool, PoolConfig};
pub use statement::{Statement, StatementInfo, prepare};
pub use transaction::{Transaction, begin, run_in_transaction};
#[doc(inline)]
pub use query::query;
pub use error::{Error, Result};

#[cfg(feature = "macros")]
pub use rower_macros::{Decode, Record};
