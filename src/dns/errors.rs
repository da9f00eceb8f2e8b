//! Crate-wide error type
//!
//! Every fallible component (`RecordStore`, `HealthChecker`, `GeoLookup`,
//! `UpstreamResolver`, `DnssecSigner`, `RateLimiter`, `QueryPipeline`) folds its
//! errors into `Z42Error` at its public boundary, following the same
//! `derive_more`-based pattern the teacher uses for `AuthorityError`/
//! `ClientError`/`ResolveError`/`ServerError`. The pipeline then maps each
//! variant onto a `ResultCode` (spec §7) rather than letting callers match on
//! transport-level causes.

use derive_more::{Display, Error, From};

use crate::dns::protocol::ResultCode;

#[derive(Debug, Display, From, Error)]
pub enum Z42Error {
    #[display(fmt = "malformed client request")]
    ClientProtocolError,

    #[display(fmt = "no zone or record store is authoritative for this name")]
    NotAuthoritative,

    #[display(fmt = "rate limit exceeded for this client")]
    RateLimited,

    #[display(fmt = "name does not exist")]
    NameError,

    #[display(fmt = "name exists but has no data of the requested type")]
    NoData,

    #[display(fmt = "upstream server did not respond in time")]
    UpstreamTimeout,

    #[display(fmt = "upstream server returned a failure")]
    UpstreamFailure,

    #[display(fmt = "zone store is unavailable")]
    StoreUnavailable,

    #[display(fmt = "DNSSEC signer failed to produce a signature")]
    SignerFailure,

    #[display(fmt = "geo lookup is disabled or its database is unavailable")]
    GeoDisabled,

    #[display(fmt = "geo database could not be read")]
    BadDb,

    #[display(fmt = "buffer error: {}", _0)]
    Buffer(crate::dns::buffer::BufferError),

    #[display(fmt = "protocol error: {}", _0)]
    Protocol(crate::dns::protocol::ProtocolError),

    #[display(fmt = "io error: {}", _0)]
    Io(std::io::Error),
}

impl Z42Error {
    /// Maps an internal failure onto the RCODE the pipeline puts on the wire.
    pub fn to_rcode(&self) -> ResultCode {
        match self {
            Z42Error::ClientProtocolError => ResultCode::FORMERR,
            Z42Error::NotAuthoritative => ResultCode::NOTAUTH,
            Z42Error::RateLimited => ResultCode::REFUSED,
            Z42Error::NameError => ResultCode::NXDOMAIN,
            Z42Error::NoData => ResultCode::NOERROR,
            Z42Error::UpstreamTimeout
            | Z42Error::UpstreamFailure
            | Z42Error::StoreUnavailable
            | Z42Error::SignerFailure
            | Z42Error::GeoDisabled
            | Z42Error::BadDb
            | Z42Error::Buffer(_)
            | Z42Error::Protocol(_)
            | Z42Error::Io(_) => ResultCode::SERVFAIL,
        }
    }
}

pub type Result<T> = std::result::Result<T, Z42Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_name_error_to_nxdomain() {
        assert_eq!(Z42Error::NameError.to_rcode(), ResultCode::NXDOMAIN);
    }

    #[test]
    fn maps_store_unavailable_to_servfail() {
        assert_eq!(Z42Error::StoreUnavailable.to_rcode(), ResultCode::SERVFAIL);
    }

    #[test]
    fn maps_rate_limited_to_refused() {
        assert_eq!(Z42Error::RateLimited.to_rcode(), ResultCode::REFUSED);
    }
}
