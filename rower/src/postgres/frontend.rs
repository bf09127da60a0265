//! Postgres Frontend Messages
//!
//! Only the messages of the text format query flow are provided,
//! parameters and results are always in text format.
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{BufMut, BytesMut};

use crate::ext::{BindParams, BufMutExt, UsizeExt};

/// Protocol version 3.0, major version in the most significant 16 bits.
const PROTOCOL_VERSION: u32 = 3 << 16;

/// Write a frontend message to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    buf.put_u8(F::MSGTYPE);
    with_length(buf, |buf| msg.encode(buf));
}

/// Write a length prefixed body, the length includes itself.
fn with_length(buf: &mut BytesMut, body: impl FnOnce(&mut BytesMut)) {
    let offset = buf.len();
    buf.put_u32(0);
    body(buf);
    let len = (buf.len() - offset).to_u32();
    buf[offset..offset + 4].copy_from_slice(&len.to_be_bytes());
}

/// A type which can be encoded into postgres frontend message
pub trait FrontendProtocol {
    /// Message type.
    const MSGTYPE: u8;

    /// Write the message body, without the type and the length.
    fn encode(self, buf: &mut BytesMut);
}

/// The first message of a connection.
///
/// It has no message type byte, thus it is not a [`FrontendProtocol`].
#[derive(Debug)]
pub struct Startup<'a> {
    pub user: &'a str,
    /// Defaults to the user name.
    pub database: Option<&'a str>,
}

impl Startup<'_> {
    pub fn write(self, buf: &mut BytesMut) {
        with_length(buf, |buf| {
            buf.put_u32(PROTOCOL_VERSION);

            buf.put_nul_string("user");
            buf.put_nul_string(self.user);

            if let Some(db) = self.database {
                buf.put_nul_string("database");
                buf.put_nul_string(db);
            }

            // text values are decoded as utf8
            buf.put_nul_string("client_encoding");
            buf.put_nul_string("UTF8");

            buf.put_u8(0);
        });
    }
}

/// Cleartext password response.
#[derive(Debug)]
pub struct PasswordMessage<'a> {
    pub password: &'a str,
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.password);
    }
}

/// Simple query, may contain multiple statements.
#[derive(Debug)]
pub struct Query<'a> {
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.sql);
    }
}

/// Parse a statement, parameter types are inferred by the server.
#[derive(Debug)]
pub struct Parse<'a> {
    /// Empty string is the unnamed statement.
    pub name: &'a str,
    pub sql: &'a str,
}

impl FrontendProtocol for Parse<'_> {
    const MSGTYPE: u8 = b'P';

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.name);
        buf.put_nul_string(self.sql);
        buf.put_u16(0);
    }
}

/// Bind text parameters to a statement, results are requested in text format.
pub struct Bind<'a, P> {
    /// Empty string is the unnamed portal.
    pub portal: &'a str,
    pub stmt: &'a str,
    pub params: P,
}

impl<P> FrontendProtocol for Bind<'_, P>
where
    P: ExactSizeIterator,
    P::Item: BindParams,
{
    const MSGTYPE: u8 = b'B';

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.portal);
        buf.put_nul_string(self.stmt);

        // zero format codes, all parameters are text
        buf.put_u16(0);

        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            // -1 is NULL, no value follows
            buf.put_i32(param.size());
            buf.put(param);
        }

        buf.put_u16(0);
    }
}

/// Execute a portal.
#[derive(Debug)]
pub struct Execute<'a> {
    pub portal: &'a str,
    /// Zero is no limit.
    pub max_row: u32,
}

impl FrontendProtocol for Execute<'_> {
    const MSGTYPE: u8 = b'E';

    fn encode(self, buf: &mut BytesMut) {
        buf.put_nul_string(self.portal);
        buf.put_u32(self.max_row);
    }
}

/// Target of [`Describe`] and [`Close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Statement,
    Portal,
}

impl Target {
    fn code(self) -> u8 {
        match self {
            Target::Statement => b'S',
            Target::Portal => b'P',
        }
    }
}

#[derive(Debug)]
pub struct Describe<'a> {
    pub target: Target,
    pub name: &'a str,
}

impl FrontendProtocol for Describe<'_> {
    const MSGTYPE: u8 = b'D';

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u8(self.target.code());
        buf.put_nul_string(self.name);
    }
}

#[derive(Debug)]
pub struct Close<'a> {
    pub target: Target,
    pub name: &'a str,
}

impl FrontendProtocol for Close<'_> {
    const MSGTYPE: u8 = b'C';

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u8(self.target.code());
        buf.put_nul_string(self.name);
    }
}

macro_rules! empty_msg {
    ($($(#[$doc:meta])* $name:ident = $ty:literal;)*) => {$(
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name;

        impl FrontendProtocol for $name {
            const MSGTYPE: u8 = $ty;

            fn encode(self, _: &mut BytesMut) { }
        }
    )*};
}

empty_msg! {
    /// End of an extended query, the server responds with `ReadyForQuery`.
    Sync = b'S';
    Terminate = b'X';
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::Encode;

    #[test]
    fn query_framing() {
        let mut buf = BytesMut::new();
        write(Query { sql: "SELECT 1" }, &mut buf);
        // tag, length includes itself and the nul terminator
        assert_eq!(&buf[..], b"Q\0\0\0\x0dSELECT 1\0");

        buf.clear();
        write(Sync, &mut buf);
        assert_eq!(&buf[..], b"S\0\0\0\x04");
    }

    #[test]
    fn startup_length() {
        let mut buf = BytesMut::new();
        Startup { user: "postgres", database: None }.write(&mut buf);
        let len = u32::from_be_bytes(buf[..4].try_into().unwrap());
        assert_eq!(len as usize, buf.len());
        assert_eq!(&buf[4..8], &196_608u32.to_be_bytes());
        assert!(buf.ends_with(b"UTF8\0\0"));
    }

    #[test]
    fn bind_text_params() {
        let mut buf = BytesMut::new();
        let params = vec![7i32.encode(), None::<i32>.encode()];
        write(Bind { portal: "", stmt: "r00001", params: params.into_iter() }, &mut buf);

        let mut expect = vec![b'B', 0, 0, 0, 0];
        expect.extend_from_slice(b"\0r00001\0");
        expect.extend_from_slice(&[0, 0, 0, 2]);
        expect.extend_from_slice(&[0, 0, 0, 1, b'7']);
        expect.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        expect.extend_from_slice(&[0, 0]);
        let len = (expect.len() - 1) as u32;
        expect[1..5].copy_from_slice(&len.to_be_bytes());
        assert_eq!(&buf[..], &expect[..]);
    }
}
