//! The iterative resolution engine: walk the authority chain from a
//! root nameserver down to a server that can answer the question,
//! without ever setting RD.

use async_recursion::async_recursion;
use rand::Rng;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use dns_types::protocol::types::*;

use crate::cache::SharedCache;
use crate::util::net::Transport;
use crate::util::types::{ResolutionError, ResolveOptions};
use crate::{MAX_CNAME_CHAIN, MAX_NS_CHAIN};

/// Iteratively resolve a question, starting from the given root
/// nameserver.
///
/// Referrals are followed until a server returns an answer or an
/// error: glue addresses from the additional section are used
/// directly, nameservers given without glue are resolved with a
/// sub-query, and CNAMEs are chased (keeping the original query
/// type).  Positive answers of the requested type go into the cache,
/// under the name and type of the answer record.
///
/// Three independent bounds guarantee termination: the per-call hop
/// count limits referral chains, a visited-server set (plus the
/// `MAX_NS_CHAIN` depth) limits glueless nameserver sub-resolution,
/// and the `MAX_CNAME_CHAIN` depth limits alias following.
///
/// # Errors
///
/// See `ResolutionError`.  Every failure is fatal for the call: there
/// are no retries.
pub async fn resolve<T: Transport>(
    transport: &T,
    cache: &SharedCache,
    root: SocketAddr,
    question: &Question,
    options: ResolveOptions,
) -> Result<Vec<ResourceRecord>, ResolutionError> {
    resolve_inner(
        transport,
        cache,
        root,
        question,
        options,
        &mut HashSet::new(),
        MAX_NS_CHAIN,
        MAX_CNAME_CHAIN,
    )
    .await
}

/// `resolve` with the loop-break state made explicit.
///
/// `glueless_referrers` holds the servers whose glueless referrals
/// are still being resolved, shared across the whole sub-resolution
/// chain: a second glueless referral from the same server while the
/// first is in flight can never complete.  `ns_chain` and
/// `cname_chain` are independent depth allowances for glueless
/// nameserver sub-resolution and alias following.
#[async_recursion]
#[allow(clippy::too_many_arguments)]
async fn resolve_inner<T: Transport>(
    transport: &T,
    cache: &SharedCache,
    root: SocketAddr,
    question: &Question,
    options: ResolveOptions,
    glueless_referrers: &mut HashSet<IpAddr>,
    ns_chain: usize,
    cname_chain: usize,
) -> Result<Vec<ResourceRecord>, ResolutionError> {
    if options.use_cache {
        let cached = cache.get(&question.name, question.qtype);
        if !cached.is_empty() {
            tracing::trace!(%question, "cache hit");
            return Ok(cached);
        }
    }

    let mut server = root;
    let mut queried = HashSet::<IpAddr>::new();

    for _ in 0..options.max_hops {
        if !queried.insert(server.ip()) {
            tracing::debug!(%question, %server, "referral loop");
            return Err(ResolutionError::LoopDetected {
                question: question.clone(),
            });
        }

        let response = query_server(transport, server, question).await?;

        // dispatch on the response, in fixed order: status, QR,
        // answers, glue, delegation
        match response.header.rcode {
            Rcode::NoError => (),
            Rcode::NameError => {
                return Err(ResolutionError::NameError {
                    question: question.clone(),
                })
            }
            rcode => return Err(ResolutionError::ServerError { rcode }),
        }

        if !response.header.is_response {
            return Err(ResolutionError::NotAResponse);
        }

        if !response.answers.is_empty() {
            return dispatch_answers(
                transport,
                cache,
                root,
                question,
                options,
                ns_chain,
                cname_chain,
                response.answers,
            )
            .await;
        }

        if let Some(address) = first_glue_address(&response.additional) {
            tracing::trace!(%question, %address, "referral with glue");
            server = SocketAddr::new(IpAddr::V4(address), server.port());
            continue;
        }

        if let Some(nsdname) = first_nameserver(&response.authority) {
            if ns_chain == 0 {
                tracing::debug!(%question, "glueless referral chain too deep");
                return Err(ResolutionError::LoopDetected {
                    question: question.clone(),
                });
            }

            // a server whose earlier glueless referral is still being
            // resolved cannot be waiting on itself
            if !glueless_referrers.insert(server.ip()) {
                tracing::debug!(%question, %server, "glueless referral recursion loop");
                return Err(ResolutionError::LoopDetected {
                    question: question.clone(),
                });
            }

            tracing::trace!(%question, %nsdname, "referral without glue");
            let ns_question = Question {
                name: nsdname.clone(),
                qtype: QueryType::Record(RecordType::A),
                qclass: question.qclass,
            };
            let ns_rrs = resolve_inner(
                transport,
                cache,
                root,
                &ns_question,
                options,
                glueless_referrers,
                ns_chain - 1,
                cname_chain,
            )
            .await?;
            match first_address(&ns_rrs) {
                Some(address) => {
                    server = SocketAddr::new(IpAddr::V4(address), server.port());
                    continue;
                }
                None => {
                    return Err(ResolutionError::NoAnswer {
                        question: question.clone(),
                    })
                }
            }
        }

        return Err(ResolutionError::NoAnswer {
            question: question.clone(),
        });
    }

    tracing::debug!(%question, max_hops = %options.max_hops, "hop limit reached");
    Err(ResolutionError::LoopDetected {
        question: question.clone(),
    })
}

/// Handle a response with a non-empty answer section: either an alias
/// to chase or the records we were after.
#[allow(clippy::too_many_arguments)]
async fn dispatch_answers<T: Transport>(
    transport: &T,
    cache: &SharedCache,
    root: SocketAddr,
    question: &Question,
    options: ResolveOptions,
    ns_chain: usize,
    cname_chain: usize,
    answers: Vec<ResourceRecord>,
) -> Result<Vec<ResourceRecord>, ResolutionError> {
    if let RecordTypeWithData::CNAME { cname } = &answers[0].rtype_with_data {
        if !answers[0].matches(question.qtype) {
            if cname_chain == 0 {
                tracing::debug!(%question, %cname, "alias chain too long");
                return Err(ResolutionError::LoopDetected {
                    question: question.clone(),
                });
            }

            tracing::trace!(%question, %cname, "following alias");
            let cname_question = Question {
                name: cname.clone(),
                qtype: question.qtype,
                qclass: question.qclass,
            };
            // the chase walks from the root again for the new name,
            // with one less alias link allowed
            let mut rrs = vec![answers[0].clone()];
            let mut rest = resolve_inner(
                transport,
                cache,
                root,
                &cname_question,
                options,
                &mut HashSet::new(),
                ns_chain,
                cname_chain - 1,
            )
            .await?;
            rrs.append(&mut rest);
            return Ok(rrs);
        }
    }

    let matching: Vec<ResourceRecord> = answers
        .into_iter()
        .filter(|rr| rr.matches(question.qtype))
        .collect();

    if matching.is_empty() {
        return Err(ResolutionError::NoAnswer {
            question: question.clone(),
        });
    }

    // only terminal answers of the requested type are cached, keyed
    // by the name and type of the answer record itself
    for rr in &matching {
        cache.insert(rr);
    }

    Ok(matching)
}

/// Send one query to one server and decode the reply.  The
/// transaction ID is freshly randomised for every query.
async fn query_server<T: Transport>(
    transport: &T,
    server: SocketAddr,
    question: &Question,
) -> Result<Message, ResolutionError> {
    let request = Message::from_question(rand::thread_rng().gen(), question.clone());

    tracing::trace!(%question, %server, "querying nameserver");

    let serialised = request.to_octets()?;
    let response_octets = transport.exchange(server, &serialised).await?;
    Ok(Message::from_octets(&response_octets)?)
}

/// The first A record in a referral's additional section, if any.
fn first_glue_address(additional: &[ResourceRecord]) -> Option<Ipv4Addr> {
    additional.iter().find_map(|rr| match rr.rtype_with_data {
        RecordTypeWithData::A { address } => Some(address),
        _ => None,
    })
}

/// The first NS record in a referral's authority section, if any.
fn first_nameserver(authority: &[ResourceRecord]) -> Option<&DomainName> {
    authority.iter().find_map(|rr| match &rr.rtype_with_data {
        RecordTypeWithData::NS { nsdname } => Some(nsdname),
        _ => None,
    })
}

/// The first A record in a set of resolved records, if any.
fn first_address(rrs: &[ResourceRecord]) -> Option<Ipv4Addr> {
    rrs.iter().find_map(|rr| match rr.rtype_with_data {
        RecordTypeWithData::A { address } => Some(address),
        _ => None,
    })
}
