//! Fixed text used by the knowledge builder: cross-cutting reference
//! documents, per-category usage templates, and curated example parsing.

use ddi_store::models::{CuratedExample, DocumentCategory};
use ddi_store::schema::slugify;

/// Broad functional area of a resource type, inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectCategory {
    Network,
    Dns,
    Dhcp,
    Infrastructure,
    Other,
}

impl ObjectCategory {
    #[must_use]
    pub fn of(resource_type: &str) -> Self {
        let contains_any = |needles: &[&str]| needles.iter().any(|needle| resource_type.contains(needle));
        if contains_any(&["network", "ipv4", "ipv6", "container"]) {
            Self::Network
        } else if contains_any(&["record:", "zone_", "dns", "view"]) {
            Self::Dns
        } else if contains_any(&["range", "lease", "fixedaddress", "dhcp"]) {
            Self::Dhcp
        } else if contains_any(&["grid", "member", "admin", "permission"]) {
            Self::Infrastructure
        } else {
            Self::Other
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Dns => "dns",
            Self::Dhcp => "dhcp",
            Self::Infrastructure => "infrastructure",
            Self::Other => "other",
        }
    }
}

/// Short description of what a resource type represents.
#[must_use]
pub fn describe_resource_type(resource_type: &str) -> String {
    let known = match resource_type {
        "network" => "IPv4 networks",
        "networkcontainer" => "network containers that organize IP space hierarchically",
        "ipv6network" => "IPv6 networks",
        "record:a" => "DNS A records mapping hostnames to IPv4 addresses",
        "record:aaaa" => "DNS AAAA records mapping hostnames to IPv6 addresses",
        "record:ptr" => "DNS PTR records for reverse lookups",
        "record:cname" => "DNS CNAME records for aliasing",
        "record:mx" => "DNS MX records for mail servers",
        "record:host" => "host records that bundle A, AAAA, and PTR data for one name",
        "zone_auth" => "authoritative DNS zones",
        "range" => "DHCP ranges for dynamic address allocation",
        "fixedaddress" => "DHCP reservations with fixed IP addresses",
        "lease" => "active DHCP leases",
        "grid" => "the grid-wide configuration",
        "member" => "grid members",
        "view" => "DNS views for split DNS",
        _ => return format!("{resource_type} objects"),
    };
    known.to_string()
}

/// Short description of what a field is used for.
#[must_use]
pub fn describe_field_purpose(field: &str) -> String {
    let known = match field {
        "network" => "the IP network in CIDR notation",
        "ipv4addr" => "the IPv4 address",
        "ipv6addr" => "the IPv6 address",
        "name" => "the object name or hostname",
        "comment" => "free-form notes about the object",
        "hardware" | "mac" => "the MAC address",
        "_ref" => "the unique object reference",
        "zone" => "the DNS zone",
        "view" => "the DNS view",
        "network_view" => "the network view the object belongs to",
        "extattrs" => "extensible attribute values attached to the object",
        _ => return format!("the {field} property"),
    };
    known.to_string()
}

/// Usage-pattern document body for a resource type.
#[must_use]
pub fn usage_pattern(resource_type: &str) -> String {
    let t = resource_type;
    match ObjectCategory::of(resource_type) {
        ObjectCategory::Network => format!(
            "Common tasks for {t} (network category):\n\
             1. List networks with chosen fields: List:{t} {{\"projection\": [\"network\", \"comment\"]}}\n\
             2. Find a specific network: Search:{t} {{\"filters\": {{\"network\": \"10.0.0.0/24\"}}}}\n\
             3. Create a network: Create:{t} {{\"payload\": {{\"network\": \"10.50.0.0/24\", \"comment\": \"New network\"}}}}\n\
             4. Check utilization: List:{t} {{\"projection\": [\"network\", \"utilization\"]}}\n\
             5. Find networks tagged with an attribute: Search:{t} {{\"filters\": {{\"*Site\": \"HQ\"}}}}"
        ),
        ObjectCategory::Dns => format!(
            "Common tasks for {t} (DNS category):\n\
             1. List records: List:{t} {{\"projection\": [\"name\"]}}\n\
             2. Search by hostname pattern: Search:{t} {{\"filters\": {{\"name~\": \"server\"}}}}\n\
             3. Create a record: Create:{t} {{\"payload\": {{\"name\": \"server1.example.com\"}}}}\n\
             4. Find everything in a zone: Search:{t} {{\"filters\": {{\"zone\": \"example.com\"}}}}"
        ),
        ObjectCategory::Dhcp => format!(
            "Common tasks for {t} (DHCP category):\n\
             1. List DHCP objects: List:{t}\n\
             2. Find by MAC address: Search:{t} {{\"filters\": {{\"mac\": \"00:11:22:33:44:55\"}}}}\n\
             3. Create a reservation: Create:{t} {{\"payload\": {{\"ipv4addr\": \"10.0.0.100\", \"mac\": \"00:11:22:33:44:55\"}}}}"
        ),
        ObjectCategory::Infrastructure => format!(
            "Common tasks for {t} (infrastructure category):\n\
             1. View configuration: List:{t}\n\
             2. Update settings: Update:{t} {{\"ref\": \"<_ref>\", \"payload\": {{\"setting\": \"value\"}}}}"
        ),
        ObjectCategory::Other => format!(
            "Common tasks for {t}:\n\
             1. List objects: List:{t}\n\
             2. Get one object: Get:{t} {{\"ref\": \"<_ref>\"}}\n\
             3. Create an object: Create:{t} {{\"payload\": {{\"required_field\": \"value\"}}}}"
        ),
    }
}

/// A cross-cutting document that does not depend on the discovered schema.
#[derive(Debug, Clone, Copy)]
pub struct FixedDocument {
    pub id: &'static str,
    pub category: DocumentCategory,
    pub body: &'static str,
}

pub const FIXED_DOCUMENTS: &[FixedDocument] = &[
    FixedDocument {
        id: "wapi_query_params",
        category: DocumentCategory::QueryReference,
        body: "Query parameters understood by the management API:\n\
               - _max_results: cap on returned objects (handlers expose this as limit, default 100, max 1000)\n\
               - _return_fields: replace the default field set (handlers expose this as projection)\n\
               - _return_fields+: add fields to the default set, used for extattrs\n\
               - _paging and _return_as_object: paged result sets\n\
               Example: List:network {\"limit\": 100, \"projection\": [\"network\", \"comment\"]}",
    },
    FixedDocument {
        id: "ea_query_patterns",
        category: DocumentCategory::QueryReference,
        body: "Extensible attribute (EA) query patterns.\n\
               Extensible attributes are per-object tags defined by operators, not part of the fixed schema. \
               In search filters they are keys prefixed with '*'.\n\
               1. Exact match: {\"*MARSHA\": \"HDQTR2\"}\n\
               2. Regex match: {\"*MARSHA~\": \"^HDQ\"}\n\
               3. Not equal: {\"*MARSHA!\": \"HDQTR2\"}\n\
               4. Several attributes: {\"*MARSHA\": \"HDQTR2\", \"*Site\": \"NYC\"} (all conditions must hold)\n\
               Whenever an attribute filter is present the response always includes extattrs, even if the projection omits it.\n\
               Handler selection: networks use Search:network, A records use Search:record:a, ranges use Search:range.\n\
               Example: \"networks where MARSHA is HDQTR2\" maps to Search:network {\"filters\": {\"*MARSHA\": \"HDQTR2\"}}",
    },
    FixedDocument {
        id: "tool_selection_guide",
        category: DocumentCategory::ToolSelection,
        body: "Choosing a handler.\n\
               Handler names are <Operation>:<resource type>, with operations List, Get, Create, Update, Delete, Search.\n\
               - \"list networks\" maps to List:network\n\
               - \"find network 10.0.0.0/24\" maps to Search:network with filters {\"network\": \"10.0.0.0/24\"}\n\
               - \"networks where <EA> is <value>\" maps to Search:network with filters {\"*<EA>\": \"<value>\"}\n\
               - \"list A records\" maps to List:record:a\n\
               - \"find host server1.example.com\" maps to Search:record:host\n\
               - \"list DHCP ranges\" maps to List:range; \"find fixed address\" maps to Search:fixedaddress\n\
               - Changing or removing one object needs its _ref: search first, then Update or Delete with ref.\n\
               Parameters: filters for conditions, projection for returned fields, limit for large result sets.",
    },
    FixedDocument {
        id: "multi_tool_examples",
        category: DocumentCategory::Composition,
        body: "Multi-step handler chains.\n\
               Example 1, find a network and update its comment:\n\
               Step 1: Search:network {\"filters\": {\"network\": \"10.0.0.0/24\"}, \"projection\": [\"network\"]} returns _ref.\n\
               Step 2: Update:network {\"ref\": \"<_ref from step 1>\", \"payload\": {\"comment\": \"New comment\"}}\n\
               Example 2, locate the network for an address then create an A record:\n\
               Step 1: Search:network {\"filters\": {\"network~\": \"10.0.0\"}}\n\
               Step 2: Create:record:a {\"payload\": {\"name\": \"server1.example.com\", \"ipv4addr\": \"10.0.0.50\"}}\n\
               Example 3, a network and the DNS records inside it:\n\
               Step 1: Search:network {\"filters\": {\"network\": \"10.0.0.0/24\"}}\n\
               Step 2: Search:record:a {\"filters\": {\"ipv4addr~\": \"10.0.0\"}, \"projection\": [\"name\", \"ipv4addr\"]}\n\
               Several attribute conditions fit in one Search call; they combine with AND.",
    },
    FixedDocument {
        id: "wapi_search_modifiers",
        category: DocumentCategory::QueryReference,
        body: "Search modifiers are appended to the filter key:\n\
               - exact: {\"name\": \"web01\"}\n\
               - regex: {\"name~\": \"^server\"}\n\
               - not equal: {\"name!\": \"web01\"}\n\
               - case-insensitive: {\"name:\": \"WEB01\"}\n\
               - less or greater: {\"utilization<\": \"80\"}, {\"utilization>\": \"80\"}\n\
               Modifiers apply the same way to attribute keys such as *Site~.",
    },
    FixedDocument {
        id: "wapi_object_refs",
        category: DocumentCategory::QueryReference,
        body: "Object references (_ref).\n\
               Every object carries a _ref of the form <resource type>/<encoded id>:<key fields>, \
               for example network/ZG5zLm5ldHdvcmskMTAuMC4wLjAvMjQvMA:10.0.0.0/24/default.\n\
               Get, Update, and Delete handlers take this value as ref. Obtain it from a List or Search result.",
    },
    FixedDocument {
        id: "network_best_practices",
        category: DocumentCategory::BestPractice,
        body: "Network management practices:\n\
               - Limit large queries and request only the fields you need.\n\
               - Check utilization before allocating new space.\n\
               - Record intent in the comment field.\n\
               - Verify the reference before deleting.\n\
               - Organize address space under network containers.\n\
               Utilization check: List:network {\"projection\": [\"network\", \"utilization\"]}",
    },
    FixedDocument {
        id: "dns_best_practices",
        category: DocumentCategory::BestPractice,
        body: "DNS management practices:\n\
               - Search for an existing record before creating one.\n\
               - Use views for split DNS.\n\
               - Prefer CNAME aliases over duplicate A records.\n\
               - Keep PTR records in sync with A records; a host record manages both.\n\
               Existence check: Search:record:a {\"filters\": {\"name\": \"server1.example.com\"}}",
    },
    FixedDocument {
        id: "dhcp_best_practices",
        category: DocumentCategory::BestPractice,
        body: "DHCP management practices:\n\
               - Do not overlap ranges with fixed addresses.\n\
               - Reserve addresses for servers and network devices.\n\
               - Monitor lease utilization and use failover for availability.\n\
               Range utilization: List:range {\"projection\": [\"start_addr\", \"end_addr\", \"utilization\"]}",
    },
    FixedDocument {
        id: "common_errors",
        category: DocumentCategory::Troubleshooting,
        body: "Common errors and remedies:\n\
               - Unknown object type: the resource type is misspelled or unsupported; refresh the catalog.\n\
               - Permission denied: the API user lacks rights for the object.\n\
               - Object not found: the reference is stale; search again for a current _ref.\n\
               - Concurrent update conflict: another change landed first; retry.\n\
               - Network overlaps an existing network: the space is allocated; search existing networks first.",
    },
];

/// Splits curated markdown on level-two headings.
///
/// Text before the first heading is ignored, as are headings with no body.
#[must_use]
pub fn parse_curated_examples(markdown: &str) -> Vec<CuratedExample> {
    let text = format!("\n{markdown}");
    let mut examples = Vec::new();
    for section in text.split("\n## ").skip(1) {
        let Some((title, body)) = section.split_once('\n') else {
            continue;
        };
        let title = title.trim();
        let body = body.trim();
        if title.is_empty() || body.is_empty() || slugify(title).is_empty() {
            continue;
        }
        examples.push(CuratedExample {
            title: title.to_string(),
            body: body.to_string(),
        });
    }
    examples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_name_hints() {
        assert_eq!(ObjectCategory::of("networkview"), ObjectCategory::Network);
        assert_eq!(ObjectCategory::of("record:a"), ObjectCategory::Dns);
        assert_eq!(ObjectCategory::of("fixedaddress"), ObjectCategory::Dhcp);
        assert_eq!(ObjectCategory::of("admingroup"), ObjectCategory::Infrastructure);
        assert_eq!(ObjectCategory::of("vlan"), ObjectCategory::Other);
    }

    #[test]
    fn fixed_document_ids_are_unique() {
        let mut ids: Vec<&str> = FIXED_DOCUMENTS.iter().map(|doc| doc.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), FIXED_DOCUMENTS.len());
        let composition = FIXED_DOCUMENTS
            .iter()
            .find(|doc| doc.category == DocumentCategory::Composition)
            .expect("composition document exists");
        assert!(composition.body.matches("Step 2").count() >= 2);
    }

    #[test]
    fn curated_markdown_splits_on_level_two_headings() {
        let markdown = "# EA query examples\nintro\n## Networks by site\nSearch:network {\"filters\": {\"*Site\": \"HQ\"}}\n### detail\nmore\n## Empty\n\n## Records by owner\nSearch:record:a\n";
        let examples = parse_curated_examples(markdown);
        let titles: Vec<&str> = examples.iter().map(|example| example.title.as_str()).collect();
        assert_eq!(titles, vec!["Networks by site", "Records by owner"]);
        assert!(examples[0].body.contains("### detail"));
    }

    #[test]
    fn curated_markdown_may_start_with_a_section() {
        let examples = parse_curated_examples("## First\nbody one\n## Second\nbody two");
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].title, "First");
    }
}
