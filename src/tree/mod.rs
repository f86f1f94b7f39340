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

//! The namespace tree holding every hosted zone.
//!
//! A single tree, rooted at `.`, mirrors the DNS hierarchy: each node
//! corresponds to one domain name, and the children of a node are kept
//! in a hash map keyed by label, following the data structure suggested
//! by [RFC 1035 § 6.1.2]. Apex zones are attached to the nodes where
//! they begin, so one descent locates both the enclosing zone and the
//! queried name.
//!
//! [`ZoneTree::find`] implements the search step of the lookup
//! algorithm of [RFC 1034 § 4.3.2], with wildcard matching as
//! clarified by [RFC 4592]: it descends as far as labels match exactly,
//! records the deepest enclosing apex and the first NS cut below it,
//! and tries wildcard expansion at the closest encloser when the exact
//! node is absent.
//!
//! [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2
//! [RFC 1035 § 6.1.2]: https://datatracker.ietf.org/doc/html/rfc1035#section-6.1.2
//! [RFC 4592]: https://datatracker.ietf.org/doc/html/rfc4592

use std::sync::Arc;

use crate::name::{Label, Name};
use crate::rr::Type;
use crate::zone::ApexZone;

mod node;

pub use node::ZoneNode;

////////////////////////////////////////////////////////////////////////
// FIND RESULTS                                                       //
////////////////////////////////////////////////////////////////////////

/// The deepest enclosing apex found on a descent.
#[derive(Clone)]
pub struct ApexMatch {
    pub zone: Arc<ApexZone>,
    pub node: Arc<ZoneNode>,
}

/// The result of [`ZoneTree::find`].
pub struct FindResult {
    /// The deepest enclosing apex zone of the queried name, with the
    /// node hosting it.
    pub apex: Option<ApexMatch>,

    /// The node matching the queried name: the exact node if it
    /// exists, else the wildcard source of synthesis if one applies.
    pub node: Option<Arc<ZoneNode>>,

    /// When `node` was matched through a wildcard, the wildcard owner
    /// name (the source of synthesis per RFC 4592).
    pub source_of_synthesis: Option<Box<Name>>,

    /// The first node below the apex owning an enabled NS RRset on the
    /// descent path, i.e. the delegation point whose referral governs
    /// the queried name. A node hosting a deeper apex resets this: the
    /// deeper zone's authority wins.
    pub delegation: Option<Arc<ZoneNode>>,

    /// The deepest existing proper ancestor of the queried name below
    /// the apex, for admin introspection and DNAME processing.
    pub closest_subdomain: Option<Arc<ZoneNode>>,

    /// Whether any names exist below the queried name. Distinguishes
    /// NXDOMAIN (no such subtree) from NODATA (the name is an empty
    /// non-terminal).
    pub has_subdomains: bool,
}

impl FindResult {
    /// Returns whether the matched node was synthesized from a
    /// wildcard.
    pub fn is_synthesized(&self) -> bool {
        self.source_of_synthesis.is_some()
    }
}

////////////////////////////////////////////////////////////////////////
// THE TREE                                                           //
////////////////////////////////////////////////////////////////////////

/// The namespace tree.
#[derive(Debug)]
pub struct ZoneTree {
    root: Arc<ZoneNode>,
}

impl ZoneTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            root: Arc::new(ZoneNode::new(Name::root().to_owned())),
        }
    }

    /// Returns the root node.
    pub fn root(&self) -> &Arc<ZoneNode> {
        &self.root
    }

    /// Searches the tree for `qname`.
    ///
    /// The search proceeds in the priority order of the lookup
    /// algorithm: exact descent first, recording the deepest apex and
    /// the first NS cut below it; wildcard expansion at the closest
    /// encloser when the exact node is absent.
    pub fn find(&self, qname: &Name) -> FindResult {
        let mut node = self.root.clone();
        let mut apex: Option<ApexMatch> = None;
        let mut delegation: Option<Arc<ZoneNode>> = None;
        let mut closest_subdomain: Option<Arc<ZoneNode>> = None;

        visit(&node, &mut apex, &mut delegation);

        // Descend right-to-left over the labels, skipping the null
        // label (which the root node itself represents).
        for level in (0..qname.len() - 1).rev() {
            let child = node.child(&qname[level]);
            match child {
                Some(next) => {
                    visit(&next, &mut apex, &mut delegation);
                    if next.apex().is_some() {
                        // A new zone context: ancestors recorded for
                        // the outer zone no longer apply.
                        closest_subdomain = None;
                    } else if level > 0 && apex.is_some() {
                        closest_subdomain = Some(next.clone());
                    }
                    node = next;
                }
                None => {
                    // `node` is the closest encloser. Try wildcard
                    // expansion there (RFC 4592 § 3.3.1).
                    let (matched, source) = match node.child(Label::asterisk()) {
                        Some(wildcard) => {
                            let source = wildcard.name().to_owned();
                            (Some(wildcard), Some(source))
                        }
                        None => (None, None),
                    };
                    return FindResult {
                        apex,
                        node: matched,
                        source_of_synthesis: source,
                        delegation,
                        closest_subdomain,
                        has_subdomains: false,
                    };
                }
            }
        }

        let has_subdomains = node.has_children();
        FindResult {
            apex,
            node: Some(node),
            source_of_synthesis: None,
            delegation,
            closest_subdomain,
            has_subdomains,
        }
    }

    /// Returns the exact node for `name`, if it exists. This performs
    /// no referral or wildcard processing; it is the primitive used to
    /// look below zone cuts (e.g. for glue addresses) and by the
    /// administrative surface.
    pub fn get(&self, name: &Name) -> Option<Arc<ZoneNode>> {
        let mut node = self.root.clone();
        for level in (0..name.len() - 1).rev() {
            node = node.child(&name[level])?;
        }
        Some(node)
    }

    /// Returns the node for `name`, creating it (and any missing
    /// ancestors) if necessary.
    pub fn get_or_add(&self, name: &Name) -> Arc<ZoneNode> {
        let mut node = self.root.clone();
        for level in (0..name.len() - 1).rev() {
            let child_name = name.superdomain(level).unwrap();
            node = node.get_or_create_child(&name[level], &child_name);
        }
        node
    }

    /// Removes the node for `name` if it holds nothing, then
    /// garbage-collects any ancestors left holding nothing. Returns
    /// whether the target node was removed.
    pub fn try_remove(&self, name: &Name) -> bool {
        let mut path = vec![self.root.clone()];
        for level in (0..name.len() - 1).rev() {
            match path.last().unwrap().child(&name[level]) {
                Some(child) => path.push(child),
                None => return false,
            }
        }

        let mut removed_target = false;
        for depth in (1..path.len()).rev() {
            if !path[depth].is_unused() {
                break;
            }
            let label = &path[depth].name()[0];
            path[depth - 1].remove_child(label);
            if depth == path.len() - 1 {
                removed_target = true;
            }
        }
        removed_target
    }

    /// Returns the names of the immediate children of `name`, sorted
    /// canonically, for admin enumeration.
    pub fn list_children(&self, name: &Name) -> Vec<Box<Name>> {
        self.get(name)
            .map(|node| {
                node.sorted_children()
                    .iter()
                    .map(|child| child.name().to_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Collects the nodes of the zone rooted at `apex_node` in
    /// canonical order. The walk does not descend into hosted child
    /// zones, but it does include their cut nodes (whose parent-side
    /// records belong to the walked zone; see
    /// [`ZoneNode::walk_rrsets`]).
    pub fn walk_zone(&self, apex_node: &Arc<ZoneNode>) -> Vec<Arc<ZoneNode>> {
        let mut nodes = Vec::new();
        collect(apex_node, true, &mut nodes);
        nodes
    }
}

impl Default for ZoneTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Updates the apex and delegation trackers for a node reached during
/// descent. Entering a hosted apex starts a new zone context, so any
/// delegation recorded for the outer zone no longer governs.
fn visit(
    node: &Arc<ZoneNode>,
    apex: &mut Option<ApexMatch>,
    delegation: &mut Option<Arc<ZoneNode>>,
) {
    if let Some(zone) = node.apex() {
        *apex = Some(ApexMatch {
            zone,
            node: node.clone(),
        });
        *delegation = None;
    } else if apex.is_some() && delegation.is_none() && node.has_active_rrset(Type::NS) {
        *delegation = Some(node.clone());
    }
}

fn collect(node: &Arc<ZoneNode>, at_apex: bool, out: &mut Vec<Arc<ZoneNode>>) {
    out.push(node.clone());
    if !at_apex && node.apex().is_some() {
        return;
    }
    for child in node.sorted_children() {
        collect(&child, false, out);
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::rr::{RdataBuf, RecordInfo, Rrset, Ttl};
    use crate::zone::ApexZone;

    fn boxed_name(from: &str) -> Box<Name> {
        from.parse().unwrap()
    }

    fn add_rrset(tree: &ZoneTree, owner: &str, rr_type: Type, rdata: &[u8]) {
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

    fn tree_with_zone(apex: &str) -> ZoneTree {
        let tree = ZoneTree::new();
        let apex_name = boxed_name(apex);
        let node = tree.get_or_add(&apex_name);
        node.set_apex(Arc::new(ApexZone::new_primary(apex_name)));
        tree
    }

    #[test]
    fn find_locates_the_enclosing_apex() {
        let tree = tree_with_zone("example.test.");
        add_rrset(&tree, "www.example.test.", Type::A, &[192, 0, 2, 1]);

        let result = tree.find(&boxed_name("www.example.test."));
        let apex = result.apex.clone().unwrap();
        assert_eq!(apex.zone.name(), boxed_name("example.test.").as_ref());
        assert_eq!(
            result.node.clone().unwrap().name(),
            boxed_name("www.example.test.").as_ref()
        );
        assert!(!result.is_synthesized());
        assert!(result.delegation.is_none());
    }

    #[test]
    fn find_reports_nxdomain_vs_empty_non_terminal() {
        let tree = tree_with_zone("example.test.");
        add_rrset(&tree, "a.b.example.test.", Type::A, &[192, 0, 2, 1]);

        // b.example.test. exists as an (empty) intermediate node.
        let result = tree.find(&boxed_name("b.example.test."));
        let node = result.node.unwrap();
        assert!(node.rrset(Type::A).is_none());
        assert!(result.has_subdomains);

        // missing.example.test. does not exist at all.
        let result = tree.find(&boxed_name("missing.example.test."));
        assert!(result.node.is_none());
        assert!(!result.has_subdomains);
    }

    #[test]
    fn find_synthesizes_from_wildcards() {
        let tree = tree_with_zone("example.test.");
        add_rrset(&tree, "*.x.example.test.", Type::A, &[192, 0, 2, 5]);

        let result = tree.find(&boxed_name("foo.x.example.test."));
        assert_eq!(
            result.source_of_synthesis,
            Some(boxed_name("*.x.example.test."))
        );
        assert!(result.node.is_some());

        // ... and the wildcard matches names more than one label below
        // the closest encloser (RFC 4592 § 2.2.1).
        let result = tree.find(&boxed_name("deep.foo.x.example.test."));
        assert!(result.is_synthesized());

        // But a name *under* the asterisk node treats it as an
        // ordinary label: ghost.*.x.example.test. has the asterisk
        // node itself as its closest encloser, which owns no wildcard
        // child, so the lookup fails (RFC 4592 § 2.2.1).
        add_rrset(&tree, "sub.*.x.example.test.", Type::TXT, b"\x03txt");
        let result = tree.find(&boxed_name("ghost.*.x.example.test."));
        assert!(result.node.is_none());
    }

    #[test]
    fn exact_match_wins_over_wildcard() {
        let tree = tree_with_zone("example.test.");
        add_rrset(&tree, "*.example.test.", Type::A, &[192, 0, 2, 5]);
        add_rrset(&tree, "www.example.test.", Type::A, &[192, 0, 2, 1]);

        let result = tree.find(&boxed_name("www.example.test."));
        assert!(!result.is_synthesized());
        let records = result.node.unwrap().active_records(Type::A, Class::IN);
        assert_eq!(records[0].rdata.octets(), &[192, 0, 2, 1]);
    }

    #[test]
    fn find_records_delegations_below_the_apex() {
        let tree = tree_with_zone("example.test.");
        add_rrset(
            &tree,
            "sub.example.test.",
            Type::NS,
            b"\x03ns1\x03sub\x07example\x04test\x00",
        );

        let result = tree.find(&boxed_name("host.sub.example.test."));
        assert_eq!(
            result.delegation.as_ref().unwrap().name(),
            boxed_name("sub.example.test.").as_ref()
        );
        // The cut governs the cut name itself, too.
        let result = tree.find(&boxed_name("sub.example.test."));
        assert!(result.delegation.is_some());
        // ... but not the apex.
        let result = tree.find(&boxed_name("example.test."));
        assert!(result.delegation.is_none());
    }

    #[test]
    fn hosted_child_apex_resets_the_delegation() {
        let tree = tree_with_zone("example.test.");
        add_rrset(
            &tree,
            "sub.example.test.",
            Type::NS,
            b"\x03ns1\x03sub\x07example\x04test\x00",
        );
        let child_apex = boxed_name("sub.example.test.");
        let node = tree.get_or_add(&child_apex);
        node.set_apex(Arc::new(ApexZone::new_primary(child_apex.clone())));

        let result = tree.find(&boxed_name("host.sub.example.test."));
        let apex = result.apex.unwrap();
        assert_eq!(apex.zone.name(), child_apex.as_ref());
        assert!(result.delegation.is_none());
    }

    #[test]
    fn get_or_add_materializes_ancestors() {
        let tree = ZoneTree::new();
        tree.get_or_add(&boxed_name("a.b.c.test."));
        assert!(tree.get(&boxed_name("b.c.test.")).is_some());
        assert!(tree.get(&boxed_name("c.test.")).is_some());
    }

    #[test]
    fn try_remove_collects_unused_ancestors() {
        let tree = ZoneTree::new();
        tree.get_or_add(&boxed_name("a.b.c.test."));
        assert!(tree.try_remove(&boxed_name("a.b.c.test.")));
        // The intermediate nodes were empty, so they are gone too.
        assert!(tree.get(&boxed_name("b.c.test.")).is_none());
        assert!(tree.get(&boxed_name("c.test.")).is_none());
    }

    #[test]
    fn try_remove_spares_nodes_in_use() {
        let tree = ZoneTree::new();
        add_rrset(&tree, "b.c.test.", Type::A, &[192, 0, 2, 1]);
        tree.get_or_add(&boxed_name("a.b.c.test."));
        assert!(tree.try_remove(&boxed_name("a.b.c.test.")));
        assert!(tree.get(&boxed_name("b.c.test.")).is_some());
    }

    #[test]
    fn walk_zone_is_canonically_ordered_and_stops_at_cuts() {
        let tree = tree_with_zone("example.test.");
        add_rrset(&tree, "z.example.test.", Type::A, &[192, 0, 2, 1]);
        add_rrset(&tree, "a.example.test.", Type::A, &[192, 0, 2, 2]);
        add_rrset(&tree, "www.a.example.test.", Type::A, &[192, 0, 2, 3]);

        let child_apex = boxed_name("child.example.test.");
        let child_node = tree.get_or_add(&child_apex);
        child_node.set_apex(Arc::new(ApexZone::new_primary(child_apex)));
        add_rrset(&tree, "inside.child.example.test.", Type::A, &[192, 0, 2, 4]);

        let apex_node = tree.get(&boxed_name("example.test.")).unwrap();
        let names: Vec<String> = tree
            .walk_zone(&apex_node)
            .iter()
            .map(|node| node.name().to_string())
            .collect();
        assert_eq!(
            names,
            [
                "example.test.",
                "a.example.test.",
                "www.a.example.test.",
                "child.example.test.",
                "z.example.test.",
            ]
        );
    }
}
