//! Prepared statement, using the extended query protocol.
//!
//! <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-EXT-QUERY>
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::{Arc, atomic::Ordering},
};

use crate::{
    Result,
    common::verbose,
    encode::Encoded,
    engine::{self, DrainGuard},
    executor::Executor,
    loader::{Discard, Loader, Single},
    mapper::Record,
    postgres::{BackendMessage, Oid, frontend::{self, Target}},
    query::assert_one,
    row::{ColumnInfo, RowNotFound, RowResult, RowsAffected},
    sql::{ParamError, Sql},
    transport::{PgTransport, PgTransportExt},
};

type AtomicId = std::sync::atomic::AtomicU16;

#[derive(Clone, PartialEq, Eq)]
pub struct Id([u8; 6]);

impl Id {
    pub(crate) fn unnamed() -> Self {
        Self([b'?'; 6])
    }

    pub(crate) fn next(atomic: &AtomicId) -> Self {
        let id = atomic.fetch_add(1, Ordering::SeqCst);
        let mut buf = [b'r', b'0',b'0',b'0',b'0',b'0'];
        let len = buf.len();

        let mut b = itoa::Buffer::new();
        let id = b.format(id);
        let i = id.as_bytes();
        buf[len - i.len()..].copy_from_slice(i);

        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        if self.is_unnamed() {
            return "";
        }
        // SAFETY: string only construction and is immutable
        unsafe { std::str::from_utf8_unchecked(&self.0[..]) }
    }

    pub fn is_unnamed(&self) -> bool {
        self.0[0] == b'?'
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.as_str()).finish()
    }
}

macro_rules! delegate {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name(Id);

        impl $name {
            pub(crate) fn unnamed() -> Self {
                Self(Id::unnamed())
            }

            pub(crate) fn next() -> Self {
                static ID: AtomicId = AtomicId::new(0);
                Self(Id::next(&ID))
            }
        }

        impl std::ops::Deref for $name {
            type Target = Id;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.as_str()).finish()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

delegate!(StatementName);

/// Server side description of a prepared statement.
#[derive(Debug)]
pub struct StatementInfo {
    pub(crate) name: StatementName,
    sqlid: u64,
    params: Vec<Oid>,
    columns: Vec<ColumnInfo>,
}

impl StatementInfo {
    pub fn name(&self) -> &StatementName {
        &self.name
    }

    /// Parameter types inferred by the server.
    pub fn params(&self) -> &[Oid] {
        &self.params
    }

    /// Result columns, empty if the statement returns no rows.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }
}

/// Prepare a statement.
///
/// Persistent [`Sql`] is prepared as named statement and cached in the connection,
/// preparing the same sql again on the same connection performs no io.
///
/// # Example
///
/// ```no_run
/// # async fn app(mut conn: rower::Connection) -> rower::Result<()> {
/// let mut stmt = rower::prepare("SELECT name FROM post WHERE id = $1", &mut conn).await?;
/// let mut names = rower::loader::Strings::default();
/// stmt.load(&mut names, rower::params![4]).await?;
/// stmt.load(&mut names, rower::params![2]).await?;
/// # Ok(())
/// # }
/// ```
pub async fn prepare<SQL, Exe>(sql: SQL, exe: Exe) -> Result<Statement<Exe::Transport>>
where
    SQL: Sql,
    Exe: Executor,
{
    let mut io = exe.connection().await?;
    let result = prepare_info(&sql, &mut io).await;
    match result {
        Ok(info) => Ok(Statement { io, info, persistent: sql.persistent() }),
        Err(err) => {
            io.report(&err);
            Err(err)
        }
    }
}

async fn prepare_info<IO: PgTransport>(sql: &impl Sql, io: &mut IO) -> Result<Arc<StatementInfo>> {
    let persist = sql.persistent();
    let sql = sql.sql().trim();

    let sqlid = {
        let mut buf = DefaultHasher::new();
        sql.hash(&mut buf);
        buf.finish()
    };

    if persist {
        if let Some(info) = io.get_stmt(sqlid) {
            verbose!(name = info.name.as_str(), "statement cache hit");
            return Ok(info);
        }
    }

    let name = match persist {
        true => StatementName::next(),
        false => StatementName::unnamed(),
    };

    io.send(frontend::Parse { name: name.as_str(), sql });
    io.send(frontend::Describe { target: Target::Statement, name: name.as_str() });
    io.send(frontend::Sync);

    let mut guard = DrainGuard::new(&mut *io);
    let described = describe(&mut *guard.io).await;
    let (params, columns) = guard.finish(described)?;
    let info = Arc::new(StatementInfo { name, sqlid, params, columns });

    if persist {
        io.add_stmt(sqlid, info.clone());
    }

    Ok(info)
}

/// Read the response of Parse, Describe statement and Sync.
async fn describe<IO: PgTransport>(io: &mut IO) -> Result<(Vec<Oid>, Vec<ColumnInfo>)> {
    let mut pending = None;
    let mut params = vec![];
    let mut columns = vec![];

    loop {
        let message = match io.recv::<BackendMessage>().await {
            Ok(ok) => ok,
            Err(err) if err.is_database() && !err.is_fatal() => {
                pending.get_or_insert(err);
                continue;
            }
            Err(err) => {
                io.poison();
                return Err(pending.unwrap_or(err));
            }
        };

        use BackendMessage::*;
        match message {
            ParseComplete(_) | NoData(_) => { }
            ParameterDescription(desc) => match desc.to_oids() {
                Ok(ok) => params = ok,
                Err(err) => {
                    io.poison();
                    return Err(err.into());
                }
            },
            RowDescription(rd) => match ColumnInfo::parse(rd) {
                Ok(ok) => columns = ok,
                Err(err) => {
                    io.poison();
                    return Err(err.into());
                }
            },
            ReadyForQuery(_) => break,
            f => {
                io.poison();
                return Err(pending.unwrap_or_else(|| f.unexpected("describe statement").into()));
            }
        }
    }

    match pending {
        Some(err) => Err(err),
        None => Ok((params, columns)),
    }
}

/// Check that bind parameters, each prefixed with its length, fit in a message.
///
/// A message length is a signed 32 bit integer in the protocol.
fn check_bind_size(lengths: impl Iterator<Item = usize>) -> Result<(), ParamError> {
    let mut total = 0u32;
    for (i, len) in lengths.enumerate() {
        total = i32::try_from(len)
            .ok()
            .and_then(|len| total.checked_add(4 + len as u32))
            .filter(|&total| total <= i32::MAX as u32)
            .ok_or(ParamError::TooLarge { index: i + 1 })?;
    }
    Ok(())
}

/// A prepared statement bound to its transport.
///
/// Parameters are sent in text format, created with [`params!`][crate::params].
#[derive(Debug)]
pub struct Statement<IO: PgTransport> {
    io: IO,
    info: Arc<StatementInfo>,
    persistent: bool,
}

impl<IO: PgTransport> Statement<IO> {
    pub fn info(&self) -> &StatementInfo {
        &self.info
    }

    async fn run<L: Loader + ?Sized>(&mut self, loader: &mut L, params: Vec<Encoded<'_>>) -> Result<RowResult> {
        if params.len() != self.info.params.len() {
            return Err(ParamError::Count { expect: self.info.params.len(), found: params.len() }.into());
        }

        check_bind_size(params.iter().map(|e| e.as_slice().len()))?;

        self.io.send(frontend::Bind {
            portal: "",
            stmt: self.info.name.as_str(),
            params: params.into_iter(),
        });
        self.io.send(frontend::Describe { target: Target::Portal, name: "" });
        self.io.send(frontend::Execute { portal: "", max_row: 0 });
        self.io.send(frontend::Sync);

        let result = engine::drive(&mut self.io, loader).await;
        if let Err(err) = &result {
            self.io.report(err);
        }
        result
    }

    /// Execute the statement, discarding returned rows.
    pub async fn execute(&mut self, params: Vec<Encoded<'_>>) -> Result<RowResult> {
        self.run(&mut Discard, params).await
    }

    /// Execute the statement, which must affect exactly one row.
    pub async fn execute_one(&mut self, params: Vec<Encoded<'_>>) -> Result<RowResult> {
        assert_one(self.run(&mut Discard, params).await?)
    }

    /// Load rows into `loader`.
    pub async fn load<L: Loader + ?Sized>(&mut self, loader: &mut L, params: Vec<Encoded<'_>>) -> Result<RowResult> {
        self.run(loader, params).await
    }

    /// Fetch all rows as records.
    pub async fn fetch_all<T: Record + Default>(&mut self, params: Vec<Encoded<'_>>) -> Result<Vec<T>> {
        let mut records = Vec::new();
        self.run(&mut records, params).await?;
        Ok(records)
    }

    /// Fetch exactly one row as record.
    pub async fn fetch_one<T: Record + Default>(&mut self, params: Vec<Encoded<'_>>) -> Result<T> {
        let mut record = T::default();
        match self.run(&mut Single(&mut record), params).await?.rows_affected {
            0 => Err(RowNotFound.into()),
            1 => Ok(record),
            found => Err(RowsAffected { expect: 1, found }.into()),
        }
    }

    /// Close the statement on the server and remove it from the connection cache.
    pub async fn close(mut self) -> Result<()> {
        if self.info.name.is_unnamed() {
            return Ok(());
        }
        if self.persistent {
            self.io.remove_stmt(self.info.sqlid);
        }
        self.io.send(frontend::Close { target: Target::Statement, name: self.info.name.as_str() });
        self.io.send(frontend::Sync);
        engine::drive(&mut self.io, &mut Discard).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{encode::Encode, error::ErrorKind, loader::Ints, test_util::mock};

    #[test]
    fn statement_name() {
        let a = StatementName::next();
        let b = StatementName::next();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 6);
        assert!(a.as_str().starts_with('r'));
        assert_eq!(StatementName::unnamed().as_str(), "");
    }

    #[tokio::test]
    async fn prepare_and_execute() {
        let (mut conn, mut backend) = mock();
        backend.parse_complete();
        backend.parameter_description(&[23]);
        backend.row_description(&["n"]);
        backend.ready();
        // execute
        backend.bind_complete();
        backend.row_description(&["n"]);
        backend.data_row(&[Some("10")]);
        backend.command_complete("SELECT 1");
        backend.ready();
        backend.flush().await;

        let mut stmt = prepare("SELECT $1::int4 * 10 AS n", &mut conn).await.unwrap();
        assert_eq!(stmt.info().params(), [23]);
        assert_eq!(stmt.info().columns()[0].name(), "n");

        let mut ints = Ints::default();
        stmt.load(&mut ints, vec![1.encode()]).await.unwrap();
        assert_eq!(ints.0, [10]);

        let err = stmt.execute(vec![]).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Param(ParamError::Count { expect: 1, found: 0 })));
        drop(stmt);

        // cached, no io
        let stmt = prepare("SELECT $1::int4 * 10 AS n", &mut conn).await.unwrap();
        assert_eq!(stmt.info().params(), [23]);
    }

    #[test]
    fn bind_size_limit() {
        assert!(check_bind_size([2, 0].into_iter()).is_ok());
        let too_large = i32::MAX as usize;
        assert!(matches!(check_bind_size([1, too_large].into_iter()), Err(ParamError::TooLarge { index: 2 })));
        let half = i32::MAX as usize / 2;
        assert!(matches!(check_bind_size([half, half].into_iter()), Err(ParamError::TooLarge { index: 2 })));
    }

    #[tokio::test]
    async fn prepare_error() {
        let (mut conn, mut backend) = mock();
        backend.error_response("ERROR", "42601", "syntax error");
        backend.ready();
        backend.flush().await;

        let err = prepare("SELEC 1", &mut conn).await.unwrap_err();
        assert_eq!(err.as_database().unwrap().code(), "42601");
        assert!(!conn.is_broken());
    }

    #[tokio::test]
    async fn execute_and_close() {
        let (mut conn, mut backend) = mock();
        backend.parse_complete();
        backend.parameter_description(&[25]);
        backend.no_data();
        backend.ready();
        // execute
        backend.bind_complete();
        backend.no_data();
        backend.command_complete("INSERT 0 1");
        backend.ready();
        // close
        backend.close_complete();
        backend.ready();
        backend.flush().await;

        let mut stmt = prepare("INSERT INTO post(name) VALUES($1)", &mut conn).await.unwrap();
        assert!(stmt.info().columns().is_empty());

        let result = stmt.execute_one(vec!["deez".encode()]).await.unwrap();
        assert_eq!(result.rows_affected, 1);
        stmt.close().await.unwrap();
        assert!(!conn.is_broken());
    }
}
