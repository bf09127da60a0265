//! Scripted in-memory backend.
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::{Connection, connection::Config, net::Socket, postgres::PgType};

/// Connection over an in-memory pipe, startup phase is skipped.
pub(crate) fn mock() -> (Connection, Backend) {
    let config = Config::parse_static("postgres://test@localhost/test").expect("valid url");
    mock_with(&config)
}

pub(crate) fn mock_with(config: &Config) -> (Connection, Backend) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let conn = Connection::new(Socket::from_stream(client), config);
    (conn, Backend { io: server, buf: BytesMut::new() })
}

/// Server side of the pipe, messages are buffered until [`Backend::flush`].
pub(crate) struct Backend {
    io: DuplexStream,
    buf: BytesMut,
}

impl Backend {
    pub fn raw(&mut self, msgtype: u8, body: &[u8]) {
        self.buf.put_u8(msgtype);
        self.buf.put_u32(4 + body.len() as u32);
        self.buf.put_slice(body);
    }

    pub fn raw_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Text columns.
    pub fn row_description(&mut self, names: &[&str]) {
        let columns: Vec<_> = names.iter().map(|name|(*name, <str as PgType>::OID)).collect();
        self.row_description_typed(&columns);
    }

    pub fn row_description_typed(&mut self, columns: &[(&str, u32)]) {
        let mut body = BytesMut::new();
        body.put_u16(columns.len() as u16);
        for (name, oid) in columns {
            body.put_slice(name.as_bytes());
            body.put_u8(0);
            body.put_u32(0);
            body.put_i16(0);
            body.put_u32(*oid);
            body.put_i16(-1);
            body.put_i32(-1);
            body.put_i16(0);
        }
        self.raw(b'T', &body);
    }

    pub fn data_row(&mut self, values: &[Option<&str>]) {
        let mut body = BytesMut::new();
        body.put_u16(values.len() as u16);
        for value in values {
            match value {
                Some(value) => {
                    body.put_i32(value.len() as i32);
                    body.put_slice(value.as_bytes());
                }
                None => body.put_i32(-1),
            }
        }
        self.raw(b'D', &body);
    }

    pub fn command_complete(&mut self, tag: &str) {
        self.raw(b'C', &nul(&[tag]));
    }

    pub fn ready(&mut self) {
        self.raw(b'Z', b"I");
    }

    pub fn error_response(&mut self, severity: &str, code: &str, message: &str) {
        self.raw(b'E', &fields(severity, code, message));
    }

    pub fn notice(&mut self, severity: &str, message: &str) {
        self.raw(b'N', &fields(severity, "00000", message));
    }

    pub fn parameter_status(&mut self, name: &str, value: &str) {
        self.raw(b'S', &nul(&[name, value]));
    }

    pub fn parse_complete(&mut self) {
        self.raw(b'1', &[]);
    }

    pub fn bind_complete(&mut self) {
        self.raw(b'2', &[]);
    }

    pub fn close_complete(&mut self) {
        self.raw(b'3', &[]);
    }

    pub fn no_data(&mut self) {
        self.raw(b'n', &[]);
    }

    pub fn parameter_description(&mut self, oids: &[u32]) {
        let mut body = BytesMut::new();
        body.put_u16(oids.len() as u16);
        for oid in oids {
            body.put_u32(*oid);
        }
        self.raw(b't', &body);
    }

    pub async fn flush(&mut self) {
        let buf = self.buf.split();
        self.io.write_all(&buf).await.expect("pipe open");
    }

    /// Read what the client has sent so far.
    pub async fn received(&mut self) -> Vec<u8> {
        let mut buf = vec![0; 64 * 1024];
        let n = self.io.read(&mut buf).await.expect("pipe open");
        buf.truncate(n);
        buf
    }
}

fn nul(strings: &[&str]) -> Vec<u8> {
    let mut body = vec![];
    for s in strings {
        body.extend_from_slice(s.as_bytes());
        body.push(0);
    }
    body
}

fn fields(severity: &str, code: &str, message: &str) -> Vec<u8> {
    let mut body = vec![];
    for (field, value) in [(b'S', severity), (b'V', severity), (b'C', code), (b'M', message)] {
        body.push(field);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
    }
    body.push(0);
    body
}
