//! Query resolution.
//!
//! One classify-then-resolve pass per question: backname names decode
//! the address embedded in their labels, tunnel names answer with the
//! configured endpoints, and everything else goes through the cache and
//! the record store. SOA and NS questions additionally consult the zone
//! authority, which decides their final response code. Per-query
//! failures never escape; every path produces a definite response.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use log::warn;
use tokio::task;

use crate::{
    authority::ZoneAuthority,
    cache::ResponseCache,
    codec,
    config::ServerConfig,
    stats::QueryStats,
    store::RecordStore,
    wire::{Answer, QueryKind, Question, RData, ResponseCode},
};

/// The outcome of resolving one question.
#[derive(Debug)]
pub struct Resolution {
    /// Answer records, possibly empty.
    pub answers: Vec<Answer>,
    /// Final response code.
    pub rcode: ResponseCode,
    /// Whether the response carries the AA flag.
    pub authoritative: bool,
}

/// Resolves questions against the codec, cache, store and zone authority.
pub struct Resolver {
    store: RecordStore,
    cache: ResponseCache,
    authority: ZoneAuthority,
    stats: Arc<QueryStats>,
    tunnel_ipv4: Ipv4Addr,
    tunnel_ipv6: Ipv6Addr,
    backname_suffix: String,
    tunnel_marker: String,
    authoritative: bool,
}

impl Resolver {
    /// Wire up a resolver from configuration and shared components.
    pub fn new(
        config: &ServerConfig,
        store: RecordStore,
        cache: ResponseCache,
        stats: Arc<QueryStats>,
    ) -> Self {
        let zone = config.zone.trim_end_matches('.').to_ascii_lowercase();
        Self {
            store,
            cache,
            authority: ZoneAuthority::new(&zone, &config.nameserver, &config.mailbox),
            stats,
            tunnel_ipv4: config.tunnel_ipv4,
            tunnel_ipv6: config.tunnel_ipv6,
            backname_suffix: format!(".backname.{}", zone),
            tunnel_marker: format!("tunnel.{}", zone),
            authoritative: config.authoritative,
        }
    }

    /// Whether responses carry the AA flag.
    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    /// Resolve one question from a client.
    ///
    /// Classification happens in order: a name ending in the backname
    /// marker decodes its own labels, a name containing the tunnel
    /// marker answers the tunnel endpoints, and anything else is looked
    /// up as a stored record. SOA/NS questions then overlay the zone
    /// authority's answer on whatever the branch produced.
    ///
    /// # Arguments
    /// * `question` - The parsed question.
    /// * `client` - The client address, for the durable tally.
    ///
    /// # Returns
    /// The resolution; this function does not fail.
    pub async fn resolve(&self, question: &Question, client: IpAddr) -> Resolution {
        self.stats.record_query(question.kind);
        let name = question.name.as_str();

        let (mut answers, mut rcode) =
            if let Some(prefix) = name.strip_suffix(&self.backname_suffix) {
                self.resolve_backname(prefix, question.kind)
            } else if name.contains(&self.tunnel_marker) {
                self.resolve_tunnel(question.kind)
            } else {
                self.resolve_stored(name, question.kind, client).await
            };

        // SOA and NS questions are answered by the zone authority no
        // matter which branch ran, and the authority decides their
        // response code.
        match question.kind {
            QueryKind::Soa => match self.authority.soa(name) {
                Some(soa) => {
                    answers.push(Answer::new(RData::Soa(soa)));
                    rcode = ResponseCode::NoError;
                }
                None => rcode = ResponseCode::NxDomain,
            },
            QueryKind::Ns => match self.authority.ns(name) {
                Some(nameserver) => {
                    answers.push(Answer::new(RData::Ns(nameserver)));
                    rcode = ResponseCode::NoError;
                }
                None => rcode = ResponseCode::NxDomain,
            },
            _ => {}
        }

        self.stats.record_outcome(rcode == ResponseCode::NoError);
        Resolution {
            answers,
            rcode,
            authoritative: self.authoritative,
        }
    }

    /// Answer a backname question from the address embedded in its
    /// labels.
    ///
    /// A prefix that does not decode is an empty success, never
    /// NXDOMAIN; types other than A/AAAA have no meaning here and miss
    /// the zone.
    fn resolve_backname(&self, prefix: &str, kind: QueryKind) -> (Vec<Answer>, ResponseCode) {
        let labels: Vec<&str> = prefix.split('.').collect();
        match kind {
            QueryKind::A => match codec::decode_ipv4(&labels) {
                Some(addr) => (vec![Answer::new(RData::A(addr))], ResponseCode::NoError),
                None => (Vec::new(), ResponseCode::NoError),
            },
            QueryKind::Aaaa => match codec::decode_ipv6(&labels) {
                Some(addr) => (vec![Answer::new(RData::Aaaa(addr))], ResponseCode::NoError),
                None => (Vec::new(), ResponseCode::NoError),
            },
            _ => (Vec::new(), ResponseCode::NxDomain),
        }
    }

    /// Answer a tunnel question with the configured tunnel endpoints.
    fn resolve_tunnel(&self, kind: QueryKind) -> (Vec<Answer>, ResponseCode) {
        match kind {
            QueryKind::A => (
                vec![Answer::new(RData::A(self.tunnel_ipv4))],
                ResponseCode::NoError,
            ),
            QueryKind::Aaaa => (
                vec![Answer::new(RData::Aaaa(self.tunnel_ipv6))],
                ResponseCode::NoError,
            ),
            _ => (Vec::new(), ResponseCode::NxDomain),
        }
    }

    /// Answer from the cache or the record store.
    ///
    /// A store miss, a missing address family and a store error all look
    /// the same to the client: success with no answers. Every question
    /// that reaches this branch is folded into the durable tally.
    async fn resolve_stored(
        &self,
        name: &str,
        kind: QueryKind,
        client: IpAddr,
    ) -> (Vec<Answer>, ResponseCode) {
        let cached = self.cache.get(name).filter(|entry| entry.is_fresh());
        let record = match cached {
            Some(entry) => Some(entry.record),
            None => {
                let store = self.store.clone();
                let lookup = name.to_string();
                match task::spawn_blocking(move || store.find_by_domain(&lookup)).await {
                    Ok(Ok(found)) => {
                        if let Some(record) = &found {
                            self.cache.put(name, record.clone());
                        }
                        found
                    }
                    Ok(Err(e)) => {
                        warn!("Record lookup failed for {}: {}", name, e);
                        None
                    }
                    Err(e) => {
                        warn!("Record lookup task failed for {}: {}", name, e);
                        None
                    }
                }
            }
        };

        let mut answers = Vec::new();
        if let Some(record) = &record {
            match kind {
                QueryKind::A => {
                    if let Some(addr) = record
                        .ipv4
                        .as_deref()
                        .and_then(|s| s.parse::<Ipv4Addr>().ok())
                    {
                        answers.push(Answer::new(RData::A(addr)));
                    }
                }
                QueryKind::Aaaa => {
                    if let Some(addr) = record
                        .ipv6
                        .as_deref()
                        .and_then(|s| s.parse::<Ipv6Addr>().ok())
                    {
                        answers.push(Answer::new(RData::Aaaa(addr)));
                    }
                }
                _ => {}
            }
        }

        let found = !answers.is_empty();
        self.log_tally(client, kind.qtype(), found).await;
        (answers, ResponseCode::NoError)
    }

    /// Fold the query into the durable per-client tally; failures are
    /// logged and swallowed so they never alter the response.
    async fn log_tally(&self, client: IpAddr, query_type: u16, found: bool) {
        let store = self.store.clone();
        let ip_address = client.to_string();
        match task::spawn_blocking(move || store.upsert_tally(&ip_address, query_type, found)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Query tally update failed for {}: {}", client, e),
            Err(e) => warn!("Query tally task failed for {}: {}", client, e),
        }
    }
}
