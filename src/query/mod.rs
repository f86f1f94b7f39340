// Copyright 2024 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The query engine: answering questions against the namespace tree.
//!
//! [`answer`] implements the lookup algorithm of [RFC 1034 § 4.3.2]
//! over a [`ZoneTree`], covering referral generation, wildcard
//! synthesis ([RFC 4592]), CNAME and DNAME chasing ([RFC 6672]),
//! additional-section processing, forwarder fall-through, and DNSSEC
//! proof attachment. It returns `None` when this server holds no
//! enclosing zone for the question (or the zone is disabled), so that
//! an embedding resolver may answer instead.
//!
//! [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2
//! [RFC 4592]: https://datatracker.ietf.org/doc/html/rfc4592
//! [RFC 6672]: https://datatracker.ietf.org/doc/html/rfc6672

use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::class::Class;
use crate::dnssec::{self, DnssecStatus, Nsec3Params};
use crate::message::{Rcode, Request, Response};
use crate::name::Name;
use crate::rr::{helpers, Record, Ttl, Type};
use crate::tree::{ApexMatch, FindResult, ZoneNode, ZoneTree};
use crate::zone::ZoneKind;

/// The maximum number of links in a CNAME (or DNAME-synthesized CNAME)
/// chain that we will follow before giving up and returning SERVFAIL.
pub const MAX_CNAME_HOPS: usize = 16;

/// A fixed-capacity list of the owners already visited while following
/// a CNAME chain, used both to bound the chain length and to detect
/// loops.
type OwnersSeen = ArrayVec<Box<Name>, MAX_CNAME_HOPS>;

////////////////////////////////////////////////////////////////////////
// ENTRY POINTS                                                       //
////////////////////////////////////////////////////////////////////////

/// Answers a question against the tree.
///
/// Returns `None` when no enclosing apex exists or the enclosing zone
/// is administratively disabled; the caller (typically a recursive
/// shim) may then answer from elsewhere.
pub fn answer(tree: &ZoneTree, request: &Request, recursion_allowed: bool) -> Option<Response> {
    let question = &request.question;
    if question.qclass != Class::IN {
        return None;
    }

    let result = tree.find(&question.qname);
    let apex = result.apex.clone()?;
    if apex.zone.is_disabled() {
        return None;
    }

    // An expired secondary is still ours to answer for, but all we can
    // say is SERVFAIL until a refresh succeeds.
    if apex.zone.is_expired() {
        return Some(Response::with_rcode(Rcode::SERVFAIL, recursion_allowed));
    }

    let dnssec_ok = request.dnssec_ok && apex.zone.is_signed();
    let mut response = Response::new(recursion_allowed);

    // Stub zones short-circuit everything: they exist to hand out
    // referrals to the real name servers.
    if apex.zone.kind() == ZoneKind::Stub {
        add_referral(tree, &apex.node, apex.node.name(), &mut response, false);
        return Some(response);
    }

    answer_in_zone(tree, request, result, &apex, dnssec_ok, &mut response);
    Some(response)
}

/// Returns a referral response when the queried name sits below a
/// delegation in a hosted zone, and `None` otherwise. This is the thin
/// variant used by recursive-server shims that only want to know about
/// delegations.
pub fn closest_delegation(
    tree: &ZoneTree,
    request: &Request,
    recursion_allowed: bool,
) -> Option<Response> {
    let question = &request.question;
    if question.qclass != Class::IN {
        return None;
    }
    let result = tree.find(&question.qname);
    let apex = result.apex?;
    if apex.zone.is_disabled() || apex.zone.is_expired() {
        return None;
    }
    let cut = result.delegation?;
    let mut response = Response::new(recursion_allowed);
    add_referral(tree, &cut, cut.name(), &mut response, false);
    Some(response)
}

////////////////////////////////////////////////////////////////////////
// THE DECISION TREE                                                  //
////////////////////////////////////////////////////////////////////////

fn answer_in_zone(
    tree: &ZoneTree,
    request: &Request,
    result: FindResult,
    apex: &ApexMatch,
    dnssec_ok: bool,
    response: &mut Response,
) {
    let question = &request.question;
    let qname = &question.qname;
    let qtype = question.qtype;

    // DS queries at a zone cut are the parent's to answer
    // (RFC 4035 § 3.1.4.1), so shift to the parent side before
    // anything else.
    if qtype == Type::DS {
        if let Some(node) = &result.node {
            if !result.is_synthesized() && node.apex().is_some() && !node.name().is_root() {
                answer_ds_at_cut(tree, request, node, response);
                return;
            }
        }
    }

    match &result.node {
        Some(node) if !result.is_synthesized() => {
            // An NS cut at or above the matched node takes us out of
            // authoritative data, except that the cut node itself
            // answers DS queries from the parent zone's data.
            if let Some(cut) = &result.delegation {
                let at_cut_for_ds = Arc::ptr_eq(cut, node) && qtype == Type::DS;
                if !at_cut_for_ds {
                    add_referral(tree, cut, cut.name(), response, dnssec_ok);
                    return;
                }
            }
            answer_node(tree, request, node, None, apex, dnssec_ok, response);
        }
        Some(wildcard) => {
            // Delegations win over wildcard synthesis, both when a cut
            // was crossed on the descent and when the wildcard node
            // itself owns NS records.
            if let Some(cut) = &result.delegation {
                add_referral(tree, cut, cut.name(), response, dnssec_ok);
                return;
            }
            if wildcard.has_active_rrset(Type::NS) {
                add_referral(tree, wildcard, qname, response, dnssec_ok);
                return;
            }
            answer_node(
                tree,
                request,
                wildcard,
                Some(qname.as_ref()),
                apex,
                dnssec_ok,
                response,
            );
        }
        None => {
            if let Some(cut) = &result.delegation {
                add_referral(tree, cut, cut.name(), response, dnssec_ok);
                return;
            }
            // Try DNAME substitution at the closest encloser and its
            // ancestors up to the apex.
            if let Some(dname_node) = find_dname(tree, &result, apex, qname) {
                do_dname(tree, request, &dname_node, apex, dnssec_ok, response);
                return;
            }
            if apex.zone.kind() == ZoneKind::Forwarder {
                add_forwarders(tree, &result, apex, response);
                return;
            }
            response.rcode = Rcode::NXDOMAIN;
            response.authoritative = true;
            add_negative_caching_soa(apex, response);
            if dnssec_ok {
                response
                    .authority
                    .extend(proof_of_nxdomain(tree, apex, qname));
            }
        }
    }
}

/// Produces the answer once the node to search has been determined.
/// `synthesized_owner` carries the query name when the node was matched
/// through a wildcard, in which case owner names are rewritten and a
/// wildcard proof is attached.
fn answer_node(
    tree: &ZoneTree,
    request: &Request,
    node: &Arc<ZoneNode>,
    synthesized_owner: Option<&Name>,
    apex: &ApexMatch,
    dnssec_ok: bool,
    response: &mut Response,
) {
    let question = &request.question;
    let qtype = question.qtype;

    if qtype == Type::ANY {
        answer_any(node, synthesized_owner, apex, response);
        return;
    }

    let mut records = apex.zone.query_records(node, qtype, dnssec_ok);
    if records.is_empty() {
        // No data of the requested type. A CNAME at the node restarts
        // the query with its target (RFC 1034 § 3.4.2); otherwise this
        // is a NODATA answer, with forwarder zones falling through to
        // their FWD set.
        if qtype != Type::CNAME {
            let cname = apex.zone.query_records(node, Type::CNAME, dnssec_ok);
            if !cname.is_empty() {
                do_cname_chain(tree, request, cname, synthesized_owner, apex, dnssec_ok, response);
                return;
            }
        }
        if apex.zone.kind() == ZoneKind::Forwarder && !node.has_active_rrset(Type::NS) {
            let result = tree.find(&question.qname);
            add_forwarders(tree, &result, apex, response);
            return;
        }
        response.authoritative = true;
        add_negative_caching_soa(apex, response);
        if dnssec_ok {
            match synthesized_owner {
                Some(qname) => {
                    response
                        .authority
                        .extend(proof_of_wildcard(tree, apex, qname));
                    response.authority.extend(proof_of_nodata(tree, apex, node));
                }
                None => response.authority.extend(proof_of_nodata(tree, apex, node)),
            }
        }
        return;
    }

    if let Some(qname) = synthesized_owner {
        rewrite_owners(&mut records, qname);
        if dnssec_ok {
            response
                .authority
                .extend(proof_of_wildcard(tree, apex, qname));
        }
    }

    response.authoritative = true;
    response.answer.extend(records.iter().cloned());
    do_additional_section_processing(tree, &records, response);
}

/// Answers a QTYPE * (ANY) query with every RRset at the node.
fn answer_any(
    node: &Arc<ZoneNode>,
    synthesized_owner: Option<&Name>,
    apex: &ApexMatch,
    response: &mut Response,
) {
    let mut records = Vec::new();
    for rrset in node.rrsets() {
        records.extend(rrset.to_active_records(node.name(), apex.zone.class()));
    }
    if let Some(qname) = synthesized_owner {
        rewrite_owners(&mut records, qname);
    }
    response.authoritative = true;
    if records.is_empty() {
        add_negative_caching_soa(apex, response);
    } else {
        response.answer.extend(records);
    }
}

////////////////////////////////////////////////////////////////////////
// CNAME AND DNAME CHASING                                            //
////////////////////////////////////////////////////////////////////////

/// Follows a CNAME chain to produce an answer when a CNAME RRset is
/// present at the queried name (and another type was asked for).
///
/// At most [`MAX_CNAME_HOPS`] links are processed before this gives up
/// with SERVFAIL. Loops are detected both by owner equality and by
/// having already seen the target, and also trigger SERVFAIL. Each hop
/// restarts the search from the tree root, so chains may cross into
/// other hosted zones; the final lookup's outcome determines the RCODE
/// (RFC 6604 § 3).
fn do_cname_chain(
    tree: &ZoneTree,
    request: &Request,
    mut cname_records: Vec<Record>,
    synthesized_owner: Option<&Name>,
    apex: &ApexMatch,
    dnssec_ok: bool,
    response: &mut Response,
) {
    // RFC 6604 § 2.1 reiterates RFC 1035: the AA bit is set based on
    // the first owner name in the answer section, which is ours.
    response.authoritative = true;

    let qname = &request.question.qname;
    if let Some(owner) = synthesized_owner {
        rewrite_owners(&mut cname_records, owner);
        if dnssec_ok {
            response.authority.extend(proof_of_wildcard(tree, apex, owner));
        }
    }

    let mut owners_seen = OwnersSeen::new();
    owners_seen.push(qname.clone());
    let mut current = cname_records;

    loop {
        let Some(target) = current
            .iter()
            .find(|record| record.rr_type == Type::CNAME)
            .and_then(|record| helpers::read_name(&record.rdata, 0))
        else {
            *response = Response::with_rcode(Rcode::SERVFAIL, response.recursion_available);
            return;
        };
        response.answer.extend(current.iter().cloned());

        if owners_seen.iter().any(|seen| seen.as_ref() == target.as_ref()) {
            // The chain contains a loop.
            *response = Response::with_rcode(Rcode::SERVFAIL, response.recursion_available);
            return;
        }
        if owners_seen.try_push(target.clone()).is_err() {
            // The chain is too long.
            *response = Response::with_rcode(Rcode::SERVFAIL, response.recursion_available);
            return;
        }

        let result = tree.find(&target);
        let Some(target_apex) = result.apex.clone() else {
            // The chain leaves our namespace; the resolver takes over
            // from what we have so far.
            return;
        };
        if target_apex.zone.is_disabled() || target_apex.zone.is_expired() {
            return;
        }
        let target_dnssec_ok = request.dnssec_ok && target_apex.zone.is_signed();

        match &result.node {
            Some(node) => {
                let mut records =
                    target_apex
                        .zone
                        .query_records(node, request.question.qtype, target_dnssec_ok);
                if records.is_empty() {
                    let next = target_apex
                        .zone
                        .query_records(node, Type::CNAME, target_dnssec_ok);
                    if !next.is_empty() {
                        let mut next = next;
                        if result.is_synthesized() {
                            rewrite_owners(&mut next, &target);
                        }
                        current = next;
                        continue;
                    }
                    // NODATA at the end of the chain.
                    add_negative_caching_soa(&target_apex, response);
                    return;
                }
                if result.is_synthesized() {
                    rewrite_owners(&mut records, &target);
                }
                response.answer.extend(records.iter().cloned());
                do_additional_section_processing(tree, &records, response);
                return;
            }
            None => {
                // Per RFC 6604 § 3, the RCODE is set based on the last
                // query cycle.
                response.rcode = Rcode::NXDOMAIN;
                add_negative_caching_soa(&target_apex, response);
                return;
            }
        }
    }
}

/// Searches for an active DNAME RRset at the closest encloser of the
/// query name and its ancestors up to (and including) the apex.
fn find_dname(
    tree: &ZoneTree,
    result: &FindResult,
    apex: &ApexMatch,
    qname: &Name,
) -> Option<Arc<ZoneNode>> {
    let deepest = result
        .closest_subdomain
        .as_ref()
        .unwrap_or(&apex.node)
        .name()
        .to_owned();
    let apex_len = apex.node.name().len();
    for skip in (qname.len() - deepest.len())..=(qname.len() - apex_len) {
        let ancestor = qname.superdomain(skip)?;
        if let Some(node) = tree.get(&ancestor) {
            if node.has_active_rrset(Type::DNAME) {
                return Some(node);
            }
        }
    }
    None
}

/// Substitutes the query name under a DNAME (RFC 6672 § 2.2),
/// synthesizes the corresponding CNAME, and continues with CNAME
/// chasing.
fn do_dname(
    tree: &ZoneTree,
    request: &Request,
    dname_node: &Arc<ZoneNode>,
    apex: &ApexMatch,
    dnssec_ok: bool,
    response: &mut Response,
) {
    let qname = &request.question.qname;
    let dname_records = apex.zone.query_records(dname_node, Type::DNAME, dnssec_ok);
    let Some(target) = dname_records
        .iter()
        .find(|record| record.rr_type == Type::DNAME)
        .and_then(|record| helpers::read_name(&record.rdata, 0))
    else {
        *response = Response::with_rcode(Rcode::SERVFAIL, response.recursion_available);
        return;
    };
    let keep = qname.len() - dname_node.name().len();
    let Ok(substituted) = qname.with_suffix(keep, &target) else {
        // The substituted name would exceed the length limit; RFC 6672
        // § 2.1 makes this a YXDOMAIN for upgraded resolvers, but
        // SERVFAIL is the conservative answer this core produces.
        *response = Response::with_rcode(Rcode::SERVFAIL, response.recursion_available);
        return;
    };

    let dname_ttl = dname_records
        .first()
        .map(|record| record.ttl)
        .unwrap_or(Ttl::from(0));
    response.answer.extend(dname_records.iter().cloned());

    // The synthesized CNAME (RFC 6672 § 3.2).
    let cname = Record::new(
        qname.clone(),
        Type::CNAME,
        apex.zone.class(),
        dname_ttl,
        helpers::name_rdata(&substituted),
    );
    do_cname_chain(
        tree,
        request,
        vec![cname],
        None,
        apex,
        dnssec_ok,
        response,
    );
}

////////////////////////////////////////////////////////////////////////
// REFERRALS AND FORWARDERS                                           //
////////////////////////////////////////////////////////////////////////

/// Creates a referral response from the NS RRset at `cut`.
///
/// The NS RRset goes into the authority section (owned by
/// `owner`: normally the cut name, but the query name for synthesized
/// wildcard referrals). Glue attached to the NS records goes into the
/// additional section; name servers without glue are looked up in the
/// tree. With DNSSEC, the cut's DS RRset (or the NSEC proof that none
/// exists) accompanies the NS RRset (RFC 4035 § 3.1.4).
fn add_referral(
    tree: &ZoneTree,
    cut: &Arc<ZoneNode>,
    owner: &Name,
    response: &mut Response,
    dnssec_ok: bool,
) {
    let class = Class::IN;
    let Some(ns_rrset) = cut.rrset(Type::NS) else {
        return;
    };
    let mut ns_records = ns_rrset.to_active_records(owner, class);
    response.authority.append(&mut ns_records);

    if dnssec_ok {
        let ds = cut.active_records(Type::DS, class);
        if ds.is_empty() {
            let proof = dnssec::nsec_proof_of_nodata(cut, class);
            response.authority.extend(proof);
        } else {
            response.authority.extend(ds);
            response
                .authority
                .extend(cut.rrsig_records_covering(Type::DS, class));
        }
    }

    for (rdata, info) in ns_rrset.iter_active() {
        let glue = info.glue();
        if !glue.is_empty() {
            response
                .additional
                .extend(glue.iter().filter(|record| !record.is_disabled()).cloned());
            continue;
        }
        if let Some(nsdname) = helpers::read_name(rdata, 0) {
            add_additional_addresses(tree, &nsdname, response);
        }
    }
}

/// Builds a forwarder answer: the longest-matching FWD RRset (exact
/// node, then closest enclosing node, then the apex) in the authority
/// section.
fn add_forwarders(tree: &ZoneTree, result: &FindResult, apex: &ApexMatch, response: &mut Response) {
    let mut candidates: Vec<Arc<ZoneNode>> = Vec::new();
    if let Some(node) = &result.node {
        candidates.push(node.clone());
    }
    if let Some(closest) = &result.closest_subdomain {
        // Walk from the closest existing subdomain up to the apex.
        let mut name = closest.name().to_owned();
        loop {
            if let Some(node) = tree.get(&name) {
                candidates.push(node);
            }
            if name.as_ref() == apex.node.name() {
                break;
            }
            match name.superdomain(1) {
                Some(parent) => name = parent,
                None => break,
            }
        }
    }
    candidates.push(apex.node.clone());

    for node in candidates {
        let fwd = node.active_records(Type::FWD, apex.zone.class());
        if !fwd.is_empty() {
            response.authority.extend(fwd);
            return;
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ADDITIONAL SECTION PROCESSING                                      //
////////////////////////////////////////////////////////////////////////

/// Performs additional section processing for the answer records.
///
/// For RR types embedding a domain name whose addresses a resolver
/// will very likely need next (NS, MX, SRV, SVCB/HTTPS), available A
/// and AAAA RRsets for those names are included in the additional
/// section. NS records prefer their attached glue. SVCB AliasMode
/// records have their chain followed; ServiceMode records with an
/// empty target use the owner name (RFC 9460 § 2.4.2).
fn do_additional_section_processing(
    tree: &ZoneTree,
    answer_records: &[Record],
    response: &mut Response,
) {
    for record in answer_records {
        match record.rr_type {
            Type::NS => {
                let glue = record.info.glue();
                if !glue.is_empty() {
                    response
                        .additional
                        .extend(glue.iter().filter(|glue| !glue.is_disabled()).cloned());
                } else if let Some(name) = helpers::read_name(&record.rdata, 0) {
                    add_additional_addresses(tree, &name, response);
                }
            }
            Type::MX | Type::SRV => {
                let offset = helpers::additional_name_offset(record.rr_type).unwrap();
                if let Some(name) = helpers::read_name(&record.rdata, offset) {
                    add_additional_addresses(tree, &name, response);
                }
            }
            Type::SVCB | Type::HTTPS => {
                do_svcb_additional(tree, record, 0, response);
            }
            _ => (),
        }
    }
}

/// Additional processing for one SVCB/HTTPS record. AliasMode chains
/// are followed a few hops; ServiceMode targets resolve to addresses,
/// with the empty target standing for the owner name.
fn do_svcb_additional(tree: &ZoneTree, record: &Record, depth: usize, response: &mut Response) {
    const MAX_ALIAS_HOPS: usize = 4;
    if depth > MAX_ALIAS_HOPS {
        return;
    }
    let Some(priority) = helpers::svcb_priority(&record.rdata) else {
        return;
    };
    let Some(target) = helpers::svcb_target(&record.rdata) else {
        return;
    };

    if priority == 0 {
        // AliasMode: follow the chain through any SVCB records at the
        // target, and include the target's addresses.
        if let Some(node) = tree.get(&target) {
            let aliases = node.active_records(record.rr_type, record.class);
            for alias in &aliases {
                response.additional.push(alias.clone());
                do_svcb_additional(tree, alias, depth + 1, response);
            }
        }
        add_additional_addresses(tree, &target, response);
    } else {
        // ServiceMode: an empty target name means the owner itself.
        let name = if target.is_root() {
            record.owner.clone()
        } else {
            target
        };
        add_additional_addresses(tree, &name, response);
    }
}

/// Looks up `owner` in the tree and adds any A and AAAA RRsets found
/// to the additional section. The lookup is an exact node access: it
/// deliberately ignores zone cuts so that glue below a delegation can
/// be found.
fn add_additional_addresses(tree: &ZoneTree, owner: &Name, response: &mut Response) {
    let Some(node) = tree.get(owner) else {
        return;
    };
    response
        .additional
        .extend(node.active_records(Type::A, Class::IN));
    response
        .additional
        .extend(node.active_records(Type::AAAA, Class::IN));
}

////////////////////////////////////////////////////////////////////////
// NEGATIVE ANSWERS AND PROOFS                                        //
////////////////////////////////////////////////////////////////////////

/// Adds the zone's SOA record to the authority section for negative
/// caching. Per [RFC 2308 § 3], the TTL used is the SOA MINIMUM field,
/// not the TTL of the SOA record itself.
///
/// [RFC 2308 § 3]: https://datatracker.ietf.org/doc/html/rfc2308#section-3
fn add_negative_caching_soa(apex: &ApexMatch, response: &mut Response) {
    let mut soa_records = apex.node.active_records(Type::SOA, apex.zone.class());
    if let Some(fields) = apex.node.soa_fields() {
        let ttl = Ttl::from(fields.minimum);
        for record in &mut soa_records {
            record.ttl = ttl;
        }
    }
    response.authority.append(&mut soa_records);
}

fn proof_of_nxdomain(tree: &ZoneTree, apex: &ApexMatch, qname: &Name) -> Vec<Record> {
    match apex.zone.dnssec_status() {
        DnssecStatus::SignedWithNsec => {
            dnssec::nsec_proof_of_nxdomain(tree, &apex.node, qname, apex.zone.class())
        }
        DnssecStatus::SignedWithNsec3 => match nsec3_params(&apex.node) {
            Some(params) => dnssec::nsec3_proof_of_nxdomain(
                tree,
                &apex.node,
                qname,
                apex.zone.class(),
                &params,
            ),
            None => Vec::new(),
        },
        DnssecStatus::Unsigned => Vec::new(),
    }
}

fn proof_of_nodata(tree: &ZoneTree, apex: &ApexMatch, node: &Arc<ZoneNode>) -> Vec<Record> {
    match apex.zone.dnssec_status() {
        DnssecStatus::SignedWithNsec => dnssec::nsec_proof_of_nodata(node, apex.zone.class()),
        DnssecStatus::SignedWithNsec3 => match nsec3_params(&apex.node) {
            Some(params) => dnssec::nsec3_proof_of_nodata(
                tree,
                &apex.node,
                node.name(),
                apex.zone.class(),
                &params,
            ),
            None => Vec::new(),
        },
        DnssecStatus::Unsigned => Vec::new(),
    }
}

fn proof_of_wildcard(tree: &ZoneTree, apex: &ApexMatch, qname: &Name) -> Vec<Record> {
    match apex.zone.dnssec_status() {
        DnssecStatus::SignedWithNsec => {
            dnssec::nsec_proof_of_wildcard(tree, &apex.node, qname, apex.zone.class())
        }
        DnssecStatus::SignedWithNsec3 => match nsec3_params(&apex.node) {
            Some(params) => dnssec::nsec3_proof_of_wildcard(
                tree,
                &apex.node,
                qname,
                apex.zone.class(),
                &params,
            ),
            None => Vec::new(),
        },
        DnssecStatus::Unsigned => Vec::new(),
    }
}

fn nsec3_params(apex_node: &Arc<ZoneNode>) -> Option<Nsec3Params> {
    let rrset = apex_node.rrset(Type::NSEC3PARAM)?;
    let (rdata, _) = rrset.first()?;
    Nsec3Params::read(rdata)
}

////////////////////////////////////////////////////////////////////////
// DS AT ZONE CUTS                                                    //
////////////////////////////////////////////////////////////////////////

/// Answers a DS query for a name that hosts a zone apex. The DS RRset
/// belongs to the parent zone; it is read from the parent-side record
/// slot of the cut node, and the negative answer carries the parent
/// zone's SOA.
fn answer_ds_at_cut(
    tree: &ZoneTree,
    request: &Request,
    cut_node: &Arc<ZoneNode>,
    response: &mut Response,
) {
    let qname = &request.question.qname;
    let parent_name = match qname.superdomain(1) {
        Some(parent) => parent,
        None => return,
    };
    let parent = tree.find(&parent_name);
    let Some(parent_apex) = parent.apex else {
        // We don't host the parent zone, so the DS is not ours to
        // answer; all we can offer is the delegation itself.
        add_referral(tree, cut_node, cut_node.name(), response, false);
        return;
    };
    if parent_apex.zone.is_disabled() {
        return;
    }

    response.authoritative = true;
    let ds = cut_node
        .parent_rrset(Type::DS)
        .map(|rrset| rrset.to_active_records(cut_node.name(), parent_apex.zone.class()))
        .unwrap_or_default();
    if ds.is_empty() {
        add_negative_caching_soa(&parent_apex, response);
        if request.dnssec_ok && parent_apex.zone.is_signed() {
            response
                .authority
                .extend(dnssec::nsec_proof_of_nodata(cut_node, parent_apex.zone.class()));
        }
    } else {
        response.answer.extend(ds);
        if request.dnssec_ok && parent_apex.zone.is_signed() {
            if let Some(rrsigs) = cut_node.parent_rrset(Type::RRSIG) {
                response.answer.extend(
                    rrsigs
                        .iter_active()
                        .filter(|(rdata, _)| {
                            dnssec::rrsig_type_covered(rdata) == Some(Type::DS)
                        })
                        .map(|(rdata, info)| {
                            Record::with_info(
                                cut_node.name().to_owned(),
                                Type::RRSIG,
                                parent_apex.zone.class(),
                                rrsigs.ttl(),
                                rdata.to_owned(),
                                info.clone(),
                            )
                        }),
                );
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// HELPERS                                                            //
////////////////////////////////////////////////////////////////////////

/// Rewrites the owner of wildcard-synthesized records to the query
/// name (RFC 4592 § 2.1.1).
fn rewrite_owners(records: &mut [Record], qname: &Name) {
    for record in records {
        record.owner = qname.to_owned();
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    use crate::rr::helpers::SoaFields;
    use crate::rr::{NsInfo, RdataBuf, RecordInfo, Rrset, Serial};
    use crate::zone::ApexZone;

    fn boxed_name(from: &str) -> Box<Name> {
        from.parse().unwrap()
    }

    fn put(tree: &ZoneTree, owner: &str, rr_type: Type, rdata: &[u8]) {
        let node = tree.get_or_add(&boxed_name(owner));
        let mut rrset = match node.rrset(rr_type) {
            Some(existing) => (*existing).clone(),
            None => Rrset::new(rr_type, Ttl::from(3600)),
        };
        rrset
            .insert(
                Ttl::from(3600),
                RdataBuf::try_from(rdata).unwrap(),
                RecordInfo::for_type(rr_type),
            )
            .unwrap();
        node.put_rrset(rrset);
    }

    fn put_soa(tree: &ZoneTree, apex: &str) {
        let fields = SoaFields {
            mname: format!("ns1.{}", apex).parse().unwrap(),
            rname: format!("hostmaster.{}", apex).parse().unwrap(),
            serial: Serial::from(42),
            refresh: 900,
            retry: 300,
            expire: 604800,
            minimum: 3600,
        };
        put(tree, apex, Type::SOA, fields.to_rdata().octets());
    }

    fn new_primary(tree: &ZoneTree, apex: &str) -> Arc<ApexZone> {
        let apex_name = boxed_name(apex);
        let node = tree.get_or_add(&apex_name);
        let zone = Arc::new(ApexZone::new_primary(apex_name));
        node.set_apex(zone.clone());
        put_soa(tree, apex);
        zone
    }

    fn query(tree: &ZoneTree, qname: &str, qtype: Type) -> Option<Response> {
        answer(tree, &Request::new(boxed_name(qname), qtype), false)
    }

    #[test]
    fn apex_query_answers_authoritatively() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");
        put(&tree, "example.com.", Type::A, &[192, 0, 2, 1]);

        let response = query(&tree, "example.com.", Type::A).unwrap();
        assert_eq!(response.rcode, Rcode::NOERROR);
        assert!(response.authoritative);
        assert_eq!(response.answer.len(), 1);
        assert_eq!(response.answer[0].rdata.octets(), &[192, 0, 2, 1]);
        assert!(response.authority.is_empty());
        assert!(response.additional.is_empty());
    }

    #[test]
    fn no_enclosing_zone_yields_no_authority() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");
        assert!(query(&tree, "example.org.", Type::A).is_none());
    }

    #[test]
    fn delegation_produces_a_referral_with_glue() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");

        // NS record with attached glue for ns1.sub.example.com.
        let glue = Record::new(
            boxed_name("ns1.sub.example.com."),
            Type::A,
            Class::IN,
            Ttl::from(3600),
            RdataBuf::try_from(&[198u8, 51, 100, 1][..]).unwrap(),
        );
        let mut ns_rrset = Rrset::new(Type::NS, Ttl::from(3600));
        ns_rrset
            .insert(
                Ttl::from(3600),
                RdataBuf::try_from(
                    boxed_name("ns1.sub.example.com.").wire_repr(),
                )
                .unwrap(),
                RecordInfo::Ns(NsInfo {
                    glue: vec![glue],
                    ..NsInfo::default()
                }),
            )
            .unwrap();
        tree.get_or_add(&boxed_name("sub.example.com."))
            .put_rrset(ns_rrset);

        let response = query(&tree, "host.sub.example.com.", Type::A).unwrap();
        assert_eq!(response.rcode, Rcode::NOERROR);
        assert!(!response.authoritative);
        assert!(response.answer.is_empty());
        assert_eq!(response.authority.len(), 1);
        assert_eq!(response.authority[0].rr_type, Type::NS);
        assert_eq!(
            response.authority[0].owner,
            boxed_name("sub.example.com.")
        );
        assert_eq!(response.additional.len(), 1);
        assert_eq!(response.additional[0].rdata.octets(), &[198, 51, 100, 1]);
    }

    #[test]
    fn cname_chains_are_followed_in_order() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");
        put(
            &tree,
            "a.example.com.",
            Type::CNAME,
            boxed_name("b.example.com.").wire_repr(),
        );
        put(&tree, "b.example.com.", Type::A, &[203, 0, 113, 9]);

        let response = query(&tree, "a.example.com.", Type::A).unwrap();
        assert!(response.authoritative);
        assert_eq!(response.answer.len(), 2);
        assert_eq!(response.answer[0].rr_type, Type::CNAME);
        assert_eq!(response.answer[1].rr_type, Type::A);
        assert_eq!(response.answer[1].owner, boxed_name("b.example.com."));
    }

    #[test]
    fn cname_loops_servfail() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");
        put(
            &tree,
            "a.example.com.",
            Type::CNAME,
            boxed_name("b.example.com.").wire_repr(),
        );
        put(
            &tree,
            "b.example.com.",
            Type::CNAME,
            boxed_name("a.example.com.").wire_repr(),
        );

        let response = query(&tree, "a.example.com.", Type::A).unwrap();
        assert_eq!(response.rcode, Rcode::SERVFAIL);
        assert!(response.answer.is_empty());
    }

    #[test]
    fn nxdomain_vs_nodata() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");
        put(&tree, "a.b.example.com.", Type::A, &[192, 0, 2, 1]);

        // The name does not exist at all: NXDOMAIN with the SOA at the
        // MINIMUM TTL.
        let response = query(&tree, "missing.example.com.", Type::A).unwrap();
        assert_eq!(response.rcode, Rcode::NXDOMAIN);
        assert!(response.authoritative);
        assert_eq!(response.authority.len(), 1);
        assert_eq!(response.authority[0].rr_type, Type::SOA);
        assert_eq!(u32::from(response.authority[0].ttl), 3600);

        // The name exists as an empty non-terminal: NODATA.
        let response = query(&tree, "b.example.com.", Type::A).unwrap();
        assert_eq!(response.rcode, Rcode::NOERROR);
        assert!(response.answer.is_empty());
        assert_eq!(response.authority[0].rr_type, Type::SOA);

        // The name exists with other types: NODATA as well.
        let response = query(&tree, "example.com.", Type::MX).unwrap();
        assert_eq!(response.rcode, Rcode::NOERROR);
        assert!(response.answer.is_empty());
    }

    #[test]
    fn wildcard_answers_rewrite_the_owner() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");
        put(&tree, "*.x.example.com.", Type::A, &[192, 0, 2, 5]);

        let response = query(&tree, "foo.x.example.com.", Type::A).unwrap();
        assert!(response.authoritative);
        assert_eq!(response.answer.len(), 1);
        assert_eq!(response.answer[0].owner, boxed_name("foo.x.example.com."));
        assert_eq!(response.answer[0].rdata.octets(), &[192, 0, 2, 5]);

        // An exact match is served identically whether or not the
        // wildcard exists.
        put(&tree, "www.x.example.com.", Type::A, &[192, 0, 2, 7]);
        let response = query(&tree, "www.x.example.com.", Type::A).unwrap();
        assert_eq!(response.answer[0].rdata.octets(), &[192, 0, 2, 7]);
    }

    #[test]
    fn wildcard_with_ns_refers() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");
        put(&tree, "*.example.com.", Type::A, &[192, 0, 2, 5]);
        put(
            &tree,
            "*.example.com.",
            Type::NS,
            boxed_name("ns1.elsewhere.net.").wire_repr(),
        );

        let response = query(&tree, "anything.example.com.", Type::A).unwrap();
        assert!(!response.authoritative);
        assert!(response.answer.is_empty());
        assert_eq!(response.authority[0].rr_type, Type::NS);
    }

    #[test]
    fn dname_substitutes_and_chases() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");
        put(
            &tree,
            "legacy.example.com.",
            Type::DNAME,
            boxed_name("modern.example.com.").wire_repr(),
        );
        put(&tree, "www.modern.example.com.", Type::A, &[192, 0, 2, 9]);

        let response = query(&tree, "www.legacy.example.com.", Type::A).unwrap();
        assert!(response.authoritative);
        let types: Vec<Type> = response.answer.iter().map(|r| r.rr_type).collect();
        assert_eq!(types, [Type::DNAME, Type::CNAME, Type::A]);
        assert_eq!(
            response.answer[1].owner,
            boxed_name("www.legacy.example.com.")
        );
        assert_eq!(
            helpers::read_name(&response.answer[1].rdata, 0).unwrap(),
            boxed_name("www.modern.example.com.")
        );
    }

    #[test]
    fn forwarder_zones_answer_with_the_longest_match() {
        let tree = ZoneTree::new();
        let apex_name = boxed_name("corp.");
        let node = tree.get_or_add(&apex_name);
        node.set_apex(Arc::new(ApexZone::new_forwarder(apex_name)));
        put(
            &tree,
            "corp.",
            Type::FWD,
            helpers::fwd_rdata("192.0.2.53").unwrap().octets(),
        );
        put(
            &tree,
            "lab.corp.",
            Type::FWD,
            helpers::fwd_rdata("198.51.100.53").unwrap().octets(),
        );

        let response = query(&tree, "deep.name.lab.corp.", Type::A).unwrap();
        assert_eq!(response.authority.len(), 1);
        assert_eq!(
            helpers::read_fwd(&response.authority[0].rdata).unwrap(),
            "198.51.100.53"
        );

        let response = query(&tree, "other.corp.", Type::A).unwrap();
        assert_eq!(
            helpers::read_fwd(&response.authority[0].rdata).unwrap(),
            "192.0.2.53"
        );
    }

    #[test]
    fn stub_zones_always_refer() {
        let tree = ZoneTree::new();
        let apex_name = boxed_name("partner.test.");
        let node = tree.get_or_add(&apex_name);
        node.set_apex(Arc::new(ApexZone::new_stub(apex_name, Vec::new())));
        put(
            &tree,
            "partner.test.",
            Type::NS,
            boxed_name("ns1.partner.test.").wire_repr(),
        );

        let response = query(&tree, "anything.partner.test.", Type::A).unwrap();
        assert!(!response.authoritative);
        assert_eq!(response.authority[0].rr_type, Type::NS);
    }

    #[test]
    fn expired_secondaries_servfail() {
        let tree = ZoneTree::new();
        let apex_name = boxed_name("mirror.test.");
        let node = tree.get_or_add(&apex_name);
        let zone = Arc::new(ApexZone::new_secondary(apex_name, Vec::new()));
        node.set_apex(zone.clone());
        put_soa(&tree, "mirror.test.");
        put(&tree, "mirror.test.", Type::A, &[192, 0, 2, 1]);

        let refresh = zone.refresh().unwrap();
        assert!(refresh.begin());
        refresh.complete();
        let response = query(&tree, "mirror.test.", Type::A).unwrap();
        assert_eq!(response.rcode, Rcode::NOERROR);

        // Run the expiry check the refresh driver would run, with the
        // expire interval long since elapsed.
        refresh.check_expiry(
            Duration::from_secs(0),
            SystemTime::now() + Duration::from_secs(604800),
        );
        let response = query(&tree, "mirror.test.", Type::A).unwrap();
        assert_eq!(response.rcode, Rcode::SERVFAIL);
    }

    #[test]
    fn disabled_records_never_answer() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");
        put(&tree, "www.example.com.", Type::A, &[192, 0, 2, 1]);
        let node = tree.get(&boxed_name("www.example.com.")).unwrap();
        node.update_rrset(Type::A, |rrset| {
            rrset
                .info_mut(RdataBuf::try_from(&[192u8, 0, 2, 1][..]).unwrap().as_ref())
                .unwrap()
                .set_disabled(true);
        });

        let response = query(&tree, "www.example.com.", Type::A).unwrap();
        assert!(response.answer.is_empty());
        assert_eq!(response.rcode, Rcode::NOERROR);
    }

    #[test]
    fn mx_answers_carry_additional_addresses() {
        let tree = ZoneTree::new();
        new_primary(&tree, "example.com.");
        let mut mx_rdata = vec![0x00, 0x0a];
        mx_rdata.extend_from_slice(boxed_name("mail.example.com.").wire_repr());
        put(&tree, "example.com.", Type::MX, &mx_rdata);
        put(&tree, "mail.example.com.", Type::A, &[192, 0, 2, 25]);

        let response = query(&tree, "example.com.", Type::MX).unwrap();
        assert_eq!(response.answer.len(), 1);
        assert_eq!(response.additional.len(), 1);
        assert_eq!(response.additional[0].rdata.octets(), &[192, 0, 2, 25]);
    }
}
