//! Postgres startup phase.
//!
//! <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-START-UP>
use std::fmt;

use super::Config;
use crate::{
    Result,
    common::verbose,
    postgres::{
        BackendMessage,
        backend::{Authentication, BackendKeyData},
        frontend,
    },
    transport::{PgTransport, PgTransportExt},
};

/// Perform the startup phase, returns the cancellation key data if the server sent one.
///
/// `ParameterStatus` and `NoticeResponse` are consumed by the transport.
pub(crate) async fn startup<IO: PgTransport>(config: &Config, io: &mut IO) -> Result<Option<BackendKeyData>> {
    io.send_startup(frontend::Startup {
        user: &config.user,
        database: Some(&config.dbname),
    });
    io.flush().await?;

    // cleartext password is one request and one response
    loop {
        match io.recv::<Authentication>().await? {
            Authentication::Ok => break,
            Authentication::CleartextPassword => {
                io.send(frontend::PasswordMessage { password: &config.pass });
                io.flush().await?;
            }
            auth => return Err(UnsupportedAuth { method: auth.method() }.into()),
        }
    }

    verbose!("authenticated");

    // In the normal case the backend will send some ParameterStatus messages,
    // BackendKeyData, and finally ReadyForQuery.
    let mut key_data = None;

    loop {
        match io.recv().await? {
            BackendMessage::ReadyForQuery(_) => break,
            BackendMessage::BackendKeyData(data) => key_data = Some(data),
            BackendMessage::NegotiateProtocolVersion(_) => { }
            f => {
                io.poison();
                return Err(f.unexpected("startup phase").into());
            }
        }
    }

    Ok(key_data)
}

/// Server requested authentication method that is not supported.
#[derive(Clone, Copy)]
pub struct UnsupportedAuth {
    method: &'static str,
}

impl UnsupportedAuth {
    pub fn method(&self) -> &'static str {
        self.method
    }
}

impl std::error::Error for UnsupportedAuth { }

impl fmt::Display for UnsupportedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported authentication method: {}", self.method)
    }
}

impl fmt::Debug for UnsupportedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
