//! DNS wire transport.
//!
//! [`DnsTransport`] issues a single A or AAAA question to one server and
//! classifies the answer into a [`QueryOutcome`]. It never retries; that is
//! the engine's job. [`UdpTransport`] is the standard implementation: plain
//! DNS over UDP, falling back to TCP when the answer is truncated.

use super::resolve::{AddressRecord, Name};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{self, RData};
use std::{
    fmt,
    future::Future,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    pin::Pin,
    time::Duration,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::Instant;

/// Maximum UDP DNS response size we accept.
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Address record types this crate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Aaaa,
}

impl From<RecordType> for rr::RecordType {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => rr::RecordType::A,
            RecordType::Aaaa => rr::RecordType::AAAA,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => f.write_str("A"),
            RecordType::Aaaa => f.write_str("AAAA"),
        }
    }
}

/// Classified result of one query attempt against one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// At least one record of the requested type, in answer order.
    Success(Vec<AddressRecord>),
    /// NXDOMAIN: the name does not exist.
    NotFound,
    /// The name exists but has no record of this type (NODATA).
    TypeNotFound,
    /// No answer within the attempt deadline.
    Timeout,
    /// Transport failure, malformed answer, or an error response code.
    ServerError(String),
}

impl QueryOutcome {
    /// The records or the error this outcome stands for.
    ///
    /// NODATA is an empty `Ok`; NXDOMAIN is [`NetError::NameNotFound`],
    /// which is never retried.
    pub fn into_result(
        self,
        server: SocketAddr,
        name: &Name,
    ) -> Result<Vec<AddressRecord>, NetError> {
        match self {
            QueryOutcome::Success(records) => Ok(records),
            QueryOutcome::TypeNotFound => Ok(Vec::new()),
            QueryOutcome::NotFound => Err(NetError::NameNotFound {
                domain: name.to_string(),
            }),
            QueryOutcome::Timeout => Err(NetError::ServerTimeout {
                server: server.to_string(),
            }),
            QueryOutcome::ServerError(detail) => Err(NetError::ServerError {
                server: server.to_string(),
                detail,
            }),
        }
    }
}

impl From<NetError> for QueryOutcome {
    fn from(err: NetError) -> Self {
        match err {
            NetError::ServerTimeout { .. } => QueryOutcome::Timeout,
            other => QueryOutcome::ServerError(other.to_string()),
        }
    }
}

/// Alias for the `Future` type returned by a transport.
pub type Querying<'a> = Pin<Box<dyn Future<Output = QueryOutcome> + Send + 'a>>;

/// A way of asking one DNS server one question.
///
/// Implementations must honor `timeout` themselves; the engine additionally
/// bounds every attempt with the same deadline.
pub trait DnsTransport: Send + Sync {
    fn query<'a>(
        &'a self,
        server: SocketAddr,
        name: &'a Name,
        record_type: RecordType,
        timeout: Duration,
    ) -> Querying<'a>;
}

impl<T: DnsTransport + ?Sized> DnsTransport for std::sync::Arc<T> {
    fn query<'a>(
        &'a self,
        server: SocketAddr,
        name: &'a Name,
        record_type: RecordType,
        timeout: Duration,
    ) -> Querying<'a> {
        (**self).query(server, name, record_type, timeout)
    }
}

/// Standard DNS over UDP with TCP fallback on truncation.
#[derive(Debug, Clone, Default)]
pub struct UdpTransport;

impl UdpTransport {
    pub fn new() -> Self {
        Self
    }

    async fn exchange(
        server: SocketAddr,
        name: &Name,
        record_type: RecordType,
        timeout: Duration,
    ) -> Result<QueryOutcome, NetError> {
        let deadline = Instant::now() + timeout;
        let (id, request) = build_query(name, record_type, server)?;

        let response = exchange_udp(server, id, &request, deadline).await?;
        let response = if response.truncated() {
            tracing::debug!(%server, domain = %name, "truncated UDP answer, retrying over TCP");
            exchange_tcp(server, id, &request, deadline).await?
        } else {
            response
        };

        Ok(classify_response(&response, record_type, server))
    }
}

impl DnsTransport for UdpTransport {
    fn query<'a>(
        &'a self,
        server: SocketAddr,
        name: &'a Name,
        record_type: RecordType,
        timeout: Duration,
    ) -> Querying<'a> {
        Box::pin(async move {
            match Self::exchange(server, name, record_type, timeout).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::debug!(
                        %server,
                        domain = %name,
                        %record_type,
                        error = %e,
                        "DNS exchange failed"
                    );
                    e.into()
                }
            }
        })
    }
}

fn build_query(
    name: &Name,
    record_type: RecordType,
    server: SocketAddr,
) -> Result<(u16, Vec<u8>), NetError> {
    let rejected = || NetError::invalid_hostname(name.as_str(), "rejected by DNS encoder");
    let mut qname = rr::Name::from_ascii(name.as_str()).map_err(|_| rejected())?;
    qname.set_fqdn(true);

    let id: u16 = rand::random();
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(qname, record_type.into()));

    let bytes = message.to_vec().map_err(|e| NetError::MalformedResponse {
        server: server.to_string(),
        detail: format!("failed to encode query: {e}"),
    })?;
    Ok((id, bytes))
}

async fn with_deadline<T>(
    deadline: Instant,
    server: SocketAddr,
    fut: impl Future<Output = std::io::Result<T>>,
) -> Result<T, NetError> {
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result.server_context(server),
        Err(_) => Err(NetError::ServerTimeout {
            server: server.to_string(),
        }),
    }
}

fn is_response_to(message: &Message, id: u16) -> bool {
    message.id() == id && message.message_type() == MessageType::Response
}

async fn exchange_udp(
    server: SocketAddr,
    id: u16,
    request: &[u8],
    deadline: Instant,
) -> Result<Message, NetError> {
    let bind: SocketAddr = if server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(bind).await.server_context(server)?;
    socket.connect(server).await.server_context(server)?;
    socket.send(request).await.server_context(server)?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    loop {
        let len = with_deadline(deadline, server, socket.recv(&mut buf)).await?;
        match Message::from_vec(&buf[..len]) {
            Ok(message) if is_response_to(&message, id) => {
                return Ok(message);
            }
            Ok(message) => {
                tracing::trace!(%server, expected = id, got = message.id(), "stray datagram");
            }
            Err(e) => {
                tracing::trace!(%server, error = %e, "ignoring unparseable DNS datagram");
            }
        }
    }
}

async fn exchange_tcp(
    server: SocketAddr,
    id: u16,
    request: &[u8],
    deadline: Instant,
) -> Result<Message, NetError> {
    let len = u16::try_from(request.len()).map_err(|_| NetError::MalformedResponse {
        server: server.to_string(),
        detail: "query too large for TCP framing".into(),
    })?;

    let mut stream = with_deadline(deadline, server, TcpStream::connect(server)).await?;

    let mut framed = Vec::with_capacity(request.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(request);
    with_deadline(deadline, server, stream.write_all(&framed)).await?;

    let mut len_buf = [0u8; 2];
    with_deadline(deadline, server, stream.read_exact(&mut len_buf)).await?;
    let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    with_deadline(deadline, server, stream.read_exact(&mut buf)).await?;

    let message = Message::from_vec(&buf).map_err(|e| NetError::MalformedResponse {
        server: server.to_string(),
        detail: e.to_string(),
    })?;
    if message.id() != id {
        return Err(NetError::MalformedResponse {
            server: server.to_string(),
            detail: format!("response id {} does not match query id {id}", message.id()),
        });
    }
    Ok(message)
}

/// Maps a response message onto a [`QueryOutcome`].
///
/// Only records of the requested type survive; CNAMEs and anything else in
/// the answer section are dropped here.
pub(crate) fn classify_response(
    response: &Message,
    record_type: RecordType,
    server: SocketAddr,
) -> QueryOutcome {
    match response.response_code() {
        ResponseCode::NoError => {}
        ResponseCode::NXDomain => return QueryOutcome::NotFound,
        code => {
            return QueryOutcome::ServerError(format!("{server} answered {code}"));
        }
    }

    let records: Vec<AddressRecord> = response
        .answers()
        .iter()
        .filter_map(|record| match (record.data(), record_type) {
            (RData::A(a), RecordType::A) => Some(AddressRecord::V4(a.0)),
            (RData::AAAA(aaaa), RecordType::Aaaa) => Some(AddressRecord::V6(aaaa.0)),
            _ => None,
        })
        .collect();

    if records.is_empty() {
        QueryOutcome::TypeNotFound
    } else {
        QueryOutcome::Success(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata::{A, AAAA, CNAME};
    use hickory_proto::rr::Record;

    fn server() -> SocketAddr {
        "192.0.2.53:53".parse().unwrap()
    }

    fn response(code: ResponseCode, answers: Vec<Record>) -> Message {
        let mut message = Message::new();
        message
            .set_message_type(MessageType::Response)
            .set_response_code(code);
        for answer in answers {
            message.add_answer(answer);
        }
        message
    }

    fn owner() -> rr::Name {
        rr::Name::from_ascii("example.test.").unwrap()
    }

    #[test]
    fn test_classify_success_keeps_order_and_type() {
        let v6: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let answers = vec![
            Record::from_rdata(owner(), 60, RData::CNAME(CNAME(owner()))),
            Record::from_rdata(owner(), 60, RData::A(A::new(93, 184, 216, 34))),
            Record::from_rdata(owner(), 60, RData::AAAA(AAAA(v6))),
            Record::from_rdata(owner(), 60, RData::A(A::new(93, 184, 216, 35))),
        ];
        let message = response(ResponseCode::NoError, answers);
        let outcome = classify_response(&message, RecordType::A, server());

        assert_eq!(
            outcome,
            QueryOutcome::Success(vec![
                AddressRecord::V4(Ipv4Addr::new(93, 184, 216, 34)),
                AddressRecord::V4(Ipv4Addr::new(93, 184, 216, 35)),
            ])
        );
    }

    #[test]
    fn test_classify_nodata() {
        let record = Record::from_rdata(owner(), 60, RData::A(A::new(10, 0, 0, 1)));
        let message = response(ResponseCode::NoError, vec![record]);
        let outcome = classify_response(&message, RecordType::Aaaa, server());
        assert_eq!(outcome, QueryOutcome::TypeNotFound);
    }

    #[test]
    fn test_classify_nxdomain() {
        let message = response(ResponseCode::NXDomain, vec![]);
        let outcome = classify_response(&message, RecordType::A, server());
        assert_eq!(outcome, QueryOutcome::NotFound);

        let name = Name::new("gone.test");
        let err = outcome.into_result(server(), &name).unwrap_err();
        assert!(matches!(err, NetError::NameNotFound { .. }), "{err:?}");
        assert!(!err.is_retryable());
        assert_eq!(err.as_i32(), -105);
    }

    #[test]
    fn test_classify_servfail() {
        let message = response(ResponseCode::ServFail, vec![]);
        let outcome = classify_response(&message, RecordType::A, server());
        assert!(matches!(outcome, QueryOutcome::ServerError(_)));

        let name = Name::new("flaky.test");
        let err = outcome.into_result(server(), &name).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_nodata_is_empty_answer() {
        let records = QueryOutcome::TypeNotFound
            .into_result(server(), &Name::new("v4-only.test"))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_build_query_roundtrips_question() {
        let name = Name::new("example.test");
        let (id, bytes) = build_query(&name, RecordType::Aaaa, server()).unwrap();
        let parsed = Message::from_vec(&bytes).unwrap();

        assert_eq!(parsed.id(), id);
        assert!(parsed.recursion_desired());
        assert_eq!(parsed.queries().len(), 1);
        assert_eq!(parsed.queries()[0].query_type(), rr::RecordType::AAAA);
        assert_eq!(parsed.queries()[0].name().to_ascii(), "example.test.");
    }

    #[test]
    fn test_error_to_outcome() {
        let timeout: QueryOutcome = NetError::ServerTimeout {
            server: "s".into(),
        }
        .into();
        assert_eq!(timeout, QueryOutcome::Timeout);

        let other: QueryOutcome = NetError::ServerError {
            server: "s".into(),
            detail: "refused".into(),
        }
        .into();
        assert!(matches!(other, QueryOutcome::ServerError(_)));
    }

    #[tokio::test]
    async fn test_udp_transport_against_local_server() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server_socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, peer) = server_socket.recv_from(&mut buf).await.unwrap();
            let query = Message::from_vec(&buf[..len]).unwrap();

            let mut reply = Message::new();
            reply
                .set_id(query.id())
                .set_message_type(MessageType::Response)
                .set_response_code(ResponseCode::NoError)
                .add_query(query.queries()[0].clone())
                .add_answer(Record::from_rdata(
                    query.queries()[0].name().clone(),
                    60,
                    RData::A(A::new(93, 184, 216, 34)),
                ));
            let bytes = reply.to_vec().unwrap();
            server_socket.send_to(&bytes, peer).await.unwrap();
        });

        let name = Name::new("example.test");
        let outcome = UdpTransport::new()
            .query(addr, &name, RecordType::A, Duration::from_secs(2))
            .await;
        let expected = vec![AddressRecord::V4(Ipv4Addr::new(93, 184, 216, 34))];
        assert_eq!(outcome, QueryOutcome::Success(expected));
    }

    #[tokio::test]
    async fn test_udp_transport_times_out() {
        // Bound but never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let name = Name::new("example.test");
        let outcome = UdpTransport::new()
            .query(addr, &name, RecordType::A, Duration::from_millis(50))
            .await;
        assert_eq!(outcome, QueryOutcome::Timeout);
    }
}
