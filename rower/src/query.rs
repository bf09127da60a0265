//! Query API types.
//!
//! Queries built with [`query`] are sent with the simple query protocol, bound parameters
//! are rendered as sql literal into the query string.
//!
//! For the extended query protocol, see [`prepare`][crate::statement::prepare].
use crate::{
    Result,
    encode::{Encode, Encoded},
    engine,
    executor::Executor,
    loader::{Arguments, Callback, Discard, IntoCallbackResult, Loader, RecordCallback, RowFn, Single},
    mapper::Record,
    postgres::frontend,
    row::{RowNotFound, RowResult, RowsAffected},
    sql::{Sql, bind_sql},
    transport::PgTransport,
};

/// Entrypoint of the query API.
///
/// # Example
///
/// ```no_run
/// # async fn app(mut conn: rower::Connection) -> rower::Result<()> {
/// let names = rower::query("SELECT name FROM post WHERE id > $1", &mut conn)
///     .bind(10)
///     .load(&mut rower::loader::Strings::default())
///     .await?;
/// # Ok(())
/// # }
/// ```
pub fn query<'val, SQL, Exe>(sql: SQL, exe: Exe) -> Query<'val, SQL, Exe> {
    Query { sql, exe, params: Vec::new() }
}

/// The query API.
#[derive(Debug)]
#[must_use = "query does nothing unless one of its terminal method is awaited"]
pub struct Query<'val, SQL, Exe> {
    sql: SQL,
    exe: Exe,
    params: Vec<Encoded<'val>>,
}

impl<'val, SQL, Exe> Query<'val, SQL, Exe> {
    /// Bind query parameter, `$1` is the first bound value.
    pub fn bind<V: Encode<'val>>(mut self, value: V) -> Self {
        self.params.push(value.encode());
        self
    }
}

impl<SQL, Exe> Query<'_, SQL, Exe>
where
    SQL: Sql,
    Exe: Executor,
{
    /// Send the query and run the response loop.
    ///
    /// Parameters are substituted before the transport is acquired,
    /// so a parameter error performs no io.
    async fn run<L: Loader + ?Sized>(self, loader: &mut L) -> Result<RowResult> {
        let sql = bind_sql(self.sql.sql(), &self.params)?;
        let mut io = self.exe.connection().await?;
        io.send(frontend::Query { sql: &sql });
        let result = engine::drive(&mut io, loader).await;
        if let Err(err) = &result {
            io.report(err);
        }
        result
    }

    /// Execute the statement, discarding returned rows.
    pub async fn execute(self) -> Result<RowResult> {
        self.run(&mut Discard).await
    }

    /// Execute the statement, which must affect exactly one row.
    pub async fn execute_one(self) -> Result<RowResult> {
        assert_one(self.run(&mut Discard).await?)
    }

    /// Load rows into `loader`.
    pub async fn load<L: Loader + ?Sized>(self, loader: &mut L) -> Result<RowResult> {
        self.run(loader).await
    }

    /// Load exactly one row into `record`.
    pub async fn load_one<T: Record>(self, record: &mut T) -> Result<RowResult> {
        assert_one(self.run(&mut Single(record)).await?)
    }

    /// Fetch all rows as records.
    pub async fn fetch_all<T: Record + Default>(self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        self.run(&mut records).await?;
        Ok(records)
    }

    /// Fetch exactly one row as record.
    ///
    /// Returns [`RowNotFound`] if there is no row.
    pub async fn fetch_one<T: Record + Default>(self) -> Result<T> {
        let mut record = T::default();
        match self.run(&mut Single(&mut record)).await?.rows_affected {
            0 => Err(RowNotFound.into()),
            1 => Ok(record),
            found => Err(RowsAffected { expect: 1, found }.into()),
        }
    }

    /// Call `f` for each row with columns decoded positionally into its arguments.
    ///
    /// The number of arguments must equal the number of returned columns.
    ///
    /// ```no_run
    /// # async fn app(mut conn: rower::Connection) -> rower::Result<()> {
    /// rower::query("SELECT id, name FROM post", &mut conn)
    ///     .rower(|id: i32, name: String| println!("{id}: {name}"))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn rower<F, Args>(self, f: F) -> Result<RowResult>
    where
        F: RowFn<Args>,
        Args: Arguments,
    {
        self.run(&mut Callback::new(f)).await
    }

    /// Call `f` for each row decoded as record.
    pub async fn rower_record<T, F, R>(self, f: F) -> Result<RowResult>
    where
        T: Record + Default,
        F: FnMut(&T) -> R,
        R: IntoCallbackResult,
    {
        self.run(&mut RecordCallback::new(f)).await
    }
}

pub(crate) fn assert_one(result: RowResult) -> Result<RowResult> {
    match result.rows_affected {
        1 => Ok(result),
        found => Err(RowsAffected { expect: 1, found }.into()),
    }
}
