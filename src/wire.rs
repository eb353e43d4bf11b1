//! DNS wire format handling.
//!
//! This module builds and parses DNS messages directly as bytes: question
//! parsing, response building with a compression pointer back to the
//! question name, and the EDNS OPT record echoed to clients that sent one.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str;

/// TTL in seconds carried on every answer record.
pub const ANSWER_TTL: u32 = 60;

/// The query types this server gives specialized handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// IPv4 host address (type 1).
    A,
    /// IPv6 host address (type 28).
    Aaaa,
    /// Start of authority (type 6).
    Soa,
    /// Authoritative nameserver (type 2).
    Ns,
    /// Any other query type, kept as its wire value.
    Other(u16),
}

impl QueryKind {
    /// Map a wire QTYPE to a `QueryKind`.
    pub fn from_qtype(qtype: u16) -> Self {
        match qtype {
            1 => QueryKind::A,
            2 => QueryKind::Ns,
            6 => QueryKind::Soa,
            28 => QueryKind::Aaaa,
            other => QueryKind::Other(other),
        }
    }

    /// The wire QTYPE value for this kind.
    pub fn qtype(&self) -> u16 {
        match self {
            QueryKind::A => 1,
            QueryKind::Ns => 2,
            QueryKind::Soa => 6,
            QueryKind::Aaaa => 28,
            QueryKind::Other(other) => *other,
        }
    }
}

/// Response codes this server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// No error condition.
    NoError = 0,
    /// The queried name does not exist in the zone.
    NxDomain = 3,
    /// The request is not supported.
    NotImplemented = 4,
}

/// A parsed question section.
#[derive(Debug, Clone)]
pub struct Question {
    /// The queried name, lower-cased, labels joined with dots, no
    /// trailing dot.
    pub name: String,
    /// The query type.
    pub kind: QueryKind,
    /// Offset one past the question section, for echoing it into the
    /// response.
    pub end: usize,
}

impl Question {
    /// Parse the question section of a query packet.
    ///
    /// The name is normalized here, once, on the way in; every later
    /// comparison works on the normalized form.
    ///
    /// # Arguments
    /// * `packet` - The raw DNS query packet.
    ///
    /// # Returns
    /// An `Option` containing the parsed `Question`, or `None` for
    /// packets too short or malformed to answer.
    pub fn parse(packet: &[u8]) -> Option<Question> {
        if packet.len() < 12 {
            return None; // DNS header is 12 bytes
        }

        let mut pos = 12;
        let mut name = String::new();

        // Extract QNAME
        loop {
            let &len = packet.get(pos)?;
            if len == 0 {
                pos += 1;
                break;
            }
            let len = len as usize;
            if len > 63 {
                return None; // Compression pointers do not occur in queries
            }
            pos += 1;
            let label = str::from_utf8(packet.get(pos..pos + len)?).ok()?;
            if !name.is_empty() {
                name.push('.');
            }
            name.push_str(&label.to_ascii_lowercase());
            pos += len;
        }

        // QTYPE and QCLASS (4 bytes) close the question section
        let qtype = u16::from_be_bytes([*packet.get(pos)?, *packet.get(pos + 1)?]);
        let end = pos + 4;
        if end > packet.len() {
            return None;
        }

        Some(Question {
            name,
            kind: QueryKind::from_qtype(qtype),
            end,
        })
    }
}

/// EDNS parameters extracted from a query's OPT record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdnsInfo {
    /// The client's advertised UDP payload size.
    pub payload_size: u16,
    /// Whether the DO (DNSSEC OK) bit was set.
    pub dnssec_ok: bool,
}

/// Skip over a wire-format name starting at `pos`.
///
/// Returns the offset one past the name, handling label sequences,
/// compression pointers and the root name.
fn skip_name(packet: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let &len = packet.get(pos)?;
        if len == 0 {
            return Some(pos + 1);
        }
        if (len & 0xc0) == 0xc0 {
            return Some(pos + 2);
        }
        pos += len as usize + 1;
    }
}

/// Find the OPT record in a query, if any.
///
/// Walks the message once: question section, then answer and authority
/// records, then scans the additional section for a root-named OPT
/// record.
///
/// # Arguments
/// * `query` - The raw DNS query packet.
///
/// # Returns
/// An `Option` containing the EDNS parameters when an OPT record is
/// present.
pub fn find_edns(query: &[u8]) -> Option<EdnsInfo> {
    if query.len() < 12 {
        return None;
    }

    let qdcount = u16::from_be_bytes([query[4], query[5]]);
    let ancount = u16::from_be_bytes([query[6], query[7]]);
    let nscount = u16::from_be_bytes([query[8], query[9]]);
    let arcount = u16::from_be_bytes([query[10], query[11]]);
    if arcount == 0 {
        return None;
    }

    let mut pos = 12;

    // Skip the question section
    for _ in 0..qdcount {
        pos = skip_name(query, pos)?;
        pos += 4; // QTYPE and QCLASS
    }

    // Skip answer and authority records
    for _ in 0..(ancount as u32 + nscount as u32) {
        pos = skip_name(query, pos)?;
        if pos + 10 > query.len() {
            return None;
        }
        let rdlength = u16::from_be_bytes([query[pos + 8], query[pos + 9]]) as usize;
        pos += 10 + rdlength;
    }

    // Scan the additional records; an OPT record carries the root name
    for _ in 0..arcount {
        if *query.get(pos)? == 0 && pos + 11 <= query.len() {
            let rtype = u16::from_be_bytes([query[pos + 1], query[pos + 2]]);
            if rtype == 41 {
                return Some(EdnsInfo {
                    // The UDP payload size lives in the CLASS field
                    payload_size: u16::from_be_bytes([query[pos + 3], query[pos + 4]]),
                    // DO is the top bit of the flags half of the TTL field
                    dnssec_ok: (query[pos + 7] & 0x80) != 0,
                });
            }
        }
        pos = skip_name(query, pos)?;
        if pos + 10 > query.len() {
            return None;
        }
        let rdlength = u16::from_be_bytes([query[pos + 8], query[pos + 9]]) as usize;
        pos += 10 + rdlength;
    }

    None
}

/// The fields of a SOA record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoaData {
    /// Primary nameserver name.
    pub mname: String,
    /// Zone contact mailbox in DNS name form.
    pub rname: String,
    /// Zone serial number.
    pub serial: u32,
    /// Secondary refresh interval in seconds.
    pub refresh: u32,
    /// Retry interval after a failed refresh, in seconds.
    pub retry: u32,
    /// Zone expiry for secondaries, in seconds.
    pub expire: u32,
    /// Minimum / negative-answer TTL in seconds.
    pub minimum: u32,
}

/// The RDATA payload of an answer record.
#[derive(Debug, Clone)]
pub enum RData {
    /// IPv4 host address.
    A(Ipv4Addr),
    /// IPv6 host address.
    Aaaa(Ipv6Addr),
    /// Nameserver name.
    Ns(String),
    /// Start-of-authority parameters.
    Soa(SoaData),
}

impl RData {
    /// The wire TYPE value for this record.
    pub fn rtype(&self) -> u16 {
        match self {
            RData::A(_) => 1,
            RData::Ns(_) => 2,
            RData::Soa(_) => 6,
            RData::Aaaa(_) => 28,
        }
    }

    /// Encode the RDATA payload as wire bytes.
    fn encode(&self) -> Vec<u8> {
        match self {
            RData::A(addr) => addr.octets().to_vec(),
            RData::Aaaa(addr) => addr.octets().to_vec(),
            RData::Ns(name) => encode_name(name),
            RData::Soa(soa) => {
                let mut rdata = encode_name(&soa.mname);
                rdata.extend_from_slice(&encode_name(&soa.rname));
                rdata.extend_from_slice(&soa.serial.to_be_bytes());
                rdata.extend_from_slice(&soa.refresh.to_be_bytes());
                rdata.extend_from_slice(&soa.retry.to_be_bytes());
                rdata.extend_from_slice(&soa.expire.to_be_bytes());
                rdata.extend_from_slice(&soa.minimum.to_be_bytes());
                rdata
            }
        }
    }
}

/// A single record destined for the answer section.
#[derive(Debug, Clone)]
pub struct Answer {
    /// The record payload.
    pub rdata: RData,
    /// TTL in seconds.
    pub ttl: u32,
}

impl Answer {
    /// An answer carrying `rdata` with the standard answer TTL.
    pub fn new(rdata: RData) -> Self {
        Self {
            rdata,
            ttl: ANSWER_TTL,
        }
    }
}

/// Encode a domain name in DNS wire format.
///
/// # Arguments
/// * `name` - The domain name to encode.
///
/// # Returns
/// A vector of bytes containing the encoded domain name.
pub fn encode_name(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() || label.len() > 63 {
            continue; // Skip invalid labels
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0); // Null terminator
    out
}

/// Build a DNS response for a parsed query.
///
/// One builder covers every outcome: it copies the transaction ID and
/// question from the query, writes the answer records with a compression
/// pointer back to the question name, and echoes an OPT record when the
/// client sent one.
///
/// # Arguments
/// * `query` - The raw DNS query packet.
/// * `question` - The question parsed from `query`.
/// * `answers` - The records for the answer section, possibly empty.
/// * `rcode` - The response code.
/// * `authoritative` - Whether to set the AA flag.
///
/// # Returns
/// The response packet bytes.
pub fn build_response(
    query: &[u8],
    question: &Question,
    answers: &[Answer],
    rcode: ResponseCode,
    authoritative: bool,
) -> Vec<u8> {
    let mut response = Vec::with_capacity(512);

    // Copy transaction ID from query
    response.extend_from_slice(&query[..2]);

    // Set flags
    // QR = 1 (response)
    // OPCODE, RD = copy from query
    // AA = 1 if authoritative
    // TC = 0, RA = 0 (no recursion offered), Z = 0
    let mut flags = 0x80 | (query[2] & 0x79);
    if authoritative {
        flags |= 0x04;
    }
    response.push(flags);
    response.push(rcode as u8);

    // Copy QDCOUNT from query
    response.extend_from_slice(&query[4..6]);

    // ANCOUNT
    response.extend_from_slice(&(answers.len() as u16).to_be_bytes());

    // NSCOUNT
    response.extend_from_slice(&[0x00, 0x00]);

    // ARCOUNT (1 when echoing an OPT record)
    let edns = find_edns(query);
    response.extend_from_slice(&[0x00, if edns.is_some() { 0x01 } else { 0x00 }]);

    // Copy question section from query
    response.extend_from_slice(&query[12..question.end]);

    // Answer section
    for answer in answers {
        // Name pointer to the question name
        response.extend_from_slice(&[0xc0, 0x0c]);
        response.extend_from_slice(&answer.rdata.rtype().to_be_bytes());
        // Class IN
        response.extend_from_slice(&[0x00, 0x01]);
        response.extend_from_slice(&answer.ttl.to_be_bytes());
        let rdata = answer.rdata.encode();
        response.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        response.extend_from_slice(&rdata);
    }

    // Echo EDNS back if the client sent it
    if let Some(edns) = edns {
        response.push(0x00); // Root domain
        response.extend_from_slice(&[0x00, 0x29]); // TYPE OPT
        response.extend_from_slice(&edns.payload_size.to_be_bytes()); // UDP payload size
        response.extend_from_slice(&[0x00, 0x00]); // Extended RCODE, EDNS version
        if edns.dnssec_ok {
            response.extend_from_slice(&[0x80, 0x00]); // Flags with DO bit set
        } else {
            response.extend_from_slice(&[0x00, 0x00]);
        }
        response.extend_from_slice(&[0x00, 0x00]); // RDATA length
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_query(id: u16, name: &str, qtype: u16, edns: Option<(u16, bool)>) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&id.to_be_bytes());
        packet.extend_from_slice(&[0x01, 0x00]); // RD set
        packet.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
        packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // ANCOUNT, NSCOUNT
        packet.extend_from_slice(&[0x00, if edns.is_some() { 0x01 } else { 0x00 }]);
        packet.extend_from_slice(&encode_name(name));
        packet.extend_from_slice(&qtype.to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x01]); // QCLASS IN
        if let Some((payload_size, dnssec_ok)) = edns {
            packet.push(0x00);
            packet.extend_from_slice(&[0x00, 0x29]);
            packet.extend_from_slice(&payload_size.to_be_bytes());
            packet.extend_from_slice(&[0x00, 0x00]);
            packet.extend_from_slice(if dnssec_ok { &[0x80, 0x00] } else { &[0x00, 0x00] });
            packet.extend_from_slice(&[0x00, 0x00]);
        }
        packet
    }

    #[test]
    fn parse_normalizes_the_name() {
        let query = build_query(7, "WWW.Example.COM", 1, None);
        let question = Question::parse(&query).unwrap();
        assert_eq!(question.name, "www.example.com");
        assert_eq!(question.kind, QueryKind::A);
        assert_eq!(question.end, 12 + 17 + 4);
    }

    #[test]
    fn parse_rejects_truncated_packets() {
        let query = build_query(7, "www.example.com", 1, None);
        assert!(Question::parse(&query[..10]).is_none());
        assert!(Question::parse(&query[..query.len() - 3]).is_none());
    }

    #[test]
    fn query_kind_maps_wire_types() {
        assert_eq!(QueryKind::from_qtype(1), QueryKind::A);
        assert_eq!(QueryKind::from_qtype(28), QueryKind::Aaaa);
        assert_eq!(QueryKind::from_qtype(6), QueryKind::Soa);
        assert_eq!(QueryKind::from_qtype(2), QueryKind::Ns);
        assert_eq!(QueryKind::from_qtype(15), QueryKind::Other(15));
        assert_eq!(QueryKind::Other(15).qtype(), 15);
    }

    #[test]
    fn response_echoes_id_and_question() {
        let query = build_query(0x1234, "host.example.com", 1, None);
        let question = Question::parse(&query).unwrap();
        let answers = [Answer::new(RData::A("203.0.113.7".parse().unwrap()))];
        let response = build_response(&query, &question, &answers, ResponseCode::NoError, true);

        assert_eq!(&response[..2], &[0x12, 0x34]);
        assert_eq!(response[2] & 0x80, 0x80); // QR
        assert_eq!(response[2] & 0x04, 0x04); // AA
        assert_eq!(response[2] & 0x01, 0x01); // RD preserved
        assert_eq!(response[3], 0x00); // no RA, RCODE 0
        assert_eq!(u16::from_be_bytes([response[6], response[7]]), 1); // ANCOUNT
        assert_eq!(&response[12..question.end], &query[12..question.end]);

        // Answer: pointer, type, class, TTL, RDLENGTH, RDATA
        let answer = &response[question.end..];
        assert_eq!(&answer[..2], &[0xc0, 0x0c]);
        assert_eq!(u16::from_be_bytes([answer[2], answer[3]]), 1);
        assert_eq!(u16::from_be_bytes([answer[4], answer[5]]), 1);
        assert_eq!(
            u32::from_be_bytes([answer[6], answer[7], answer[8], answer[9]]),
            ANSWER_TTL
        );
        assert_eq!(u16::from_be_bytes([answer[10], answer[11]]), 4);
        assert_eq!(&answer[12..16], &[203, 0, 113, 7]);
    }

    #[test]
    fn nxdomain_response_has_no_answers() {
        let query = build_query(9, "missing.example.com", 1, None);
        let question = Question::parse(&query).unwrap();
        let response = build_response(&query, &question, &[], ResponseCode::NxDomain, true);
        assert_eq!(response[3] & 0x0f, 3);
        assert_eq!(u16::from_be_bytes([response[6], response[7]]), 0);
        assert_eq!(response.len(), question.end); // header and question only
    }

    #[test]
    fn non_authoritative_responses_clear_aa() {
        let query = build_query(9, "host.example.com", 1, None);
        let question = Question::parse(&query).unwrap();
        let response = build_response(&query, &question, &[], ResponseCode::NoError, false);
        assert_eq!(response[2] & 0x04, 0x00);
    }

    #[test]
    fn edns_is_echoed_with_payload_and_do_bit() {
        let query = build_query(3, "host.example.com", 28, Some((1232, true)));
        let question = Question::parse(&query).unwrap();

        let edns = find_edns(&query).unwrap();
        assert_eq!(edns.payload_size, 1232);
        assert!(edns.dnssec_ok);

        let response = build_response(&query, &question, &[], ResponseCode::NoError, true);
        assert_eq!(u16::from_be_bytes([response[10], response[11]]), 1); // ARCOUNT
        let opt = &response[question.end..];
        assert_eq!(opt[0], 0x00);
        assert_eq!(u16::from_be_bytes([opt[1], opt[2]]), 41);
        assert_eq!(u16::from_be_bytes([opt[3], opt[4]]), 1232);
        assert_eq!(opt[7] & 0x80, 0x80);
        assert_eq!(opt.len(), 11);
    }

    #[test]
    fn queries_without_edns_get_none() {
        let query = build_query(3, "host.example.com", 1, None);
        assert!(find_edns(&query).is_none());
    }

    #[test]
    fn soa_rdata_layout() {
        let soa = SoaData {
            mname: "ns1.example.com.".into(),
            rname: "hostmaster.example.com.".into(),
            serial: 2025082301,
            refresh: 3600,
            retry: 600,
            expire: 1_209_600,
            minimum: 300,
        };
        let rdata = RData::Soa(soa).encode();
        let mname = encode_name("ns1.example.com.");
        let rname = encode_name("hostmaster.example.com.");
        assert_eq!(&rdata[..mname.len()], &mname[..]);
        let ints = &rdata[mname.len() + rname.len()..];
        assert_eq!(
            u32::from_be_bytes([ints[0], ints[1], ints[2], ints[3]]),
            2025082301
        );
        assert_eq!(rdata.len(), mname.len() + rname.len() + 20);
    }

    #[test]
    fn encode_name_wire_form() {
        assert_eq!(encode_name("ns1.example.com."), encode_name("ns1.example.com"));
        assert_eq!(encode_name("a.bc"), vec![1, b'a', 2, b'b', b'c', 0]);
    }
}
