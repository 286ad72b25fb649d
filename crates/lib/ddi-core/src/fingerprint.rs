//! Order-independent content hash over a schema snapshot.

use std::fmt::Write as _;

use ddi_store::models::{ContentFingerprint, FieldDescriptor, ResourceTypeDescriptor, SchemaSnapshot};
use sha2::{Digest, Sha256};

/// Deterministic text form of one descriptor with fields sorted by name.
#[must_use]
pub fn canonicalize_descriptor(descriptor: &ResourceTypeDescriptor) -> String {
    let mut fields: Vec<&FieldDescriptor> = descriptor.fields.iter().collect();
    fields.sort_by(|left, right| {
        left.name
            .cmp(&right.name)
            .then_with(|| left.type_tag.cmp(&right.type_tag))
    });
    let mut out = format!("type:{}\n", descriptor.name);
    for field in fields {
        let _ = writeln!(
            out,
            "field:{}|{}|{}|{}|{}",
            field.name, field.type_tag, field.required, field.searchable, field.read_only
        );
    }
    out
}

/// Concatenation of every canonical descriptor in lexicographic type order.
#[must_use]
pub fn canonicalize(snapshot: &SchemaSnapshot) -> String {
    let mut descriptors: Vec<&ResourceTypeDescriptor> = snapshot.descriptors().collect();
    descriptors.sort_by(|left, right| left.name.cmp(&right.name));
    descriptors
        .into_iter()
        .map(canonicalize_descriptor)
        .collect()
}

/// SHA-256 of the canonical form, lowercase hex.
#[must_use]
pub fn fingerprint(snapshot: &SchemaSnapshot) -> ContentFingerprint {
    let digest = Sha256::digest(canonicalize(snapshot).as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    ContentFingerprint(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, fields: &[(&str, bool)]) -> ResourceTypeDescriptor {
        ResourceTypeDescriptor::new(
            name,
            fields
                .iter()
                .map(|(field, searchable)| {
                    let field = FieldDescriptor::new(*field, "string");
                    if *searchable { field.searchable() } else { field }
                })
                .collect(),
        )
    }

    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for index in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(index);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn fingerprint_ignores_discovery_and_field_order() {
        let types = vec![
            descriptor("network", &[("network", true), ("comment", true)]),
            descriptor("record:a", &[("name", true), ("ipv4addr", true)]),
            descriptor("zone_auth", &[("fqdn", true), ("view", false)]),
        ];
        let expected = fingerprint(&SchemaSnapshot::from_descriptors(types.clone()));
        for order in permutations(&types) {
            let shuffled: Vec<_> = order
                .into_iter()
                .map(|mut item| {
                    item.fields.reverse();
                    item
                })
                .collect();
            assert_eq!(fingerprint(&SchemaSnapshot::from_descriptors(shuffled)), expected);
        }
    }

    #[test]
    fn fingerprint_changes_with_field_flags() {
        let base = SchemaSnapshot::from_descriptors([descriptor("network", &[("comment", false)])]);
        let changed = SchemaSnapshot::from_descriptors([descriptor("network", &[("comment", true)])]);
        assert_ne!(fingerprint(&base), fingerprint(&changed));
    }

    #[test]
    fn fingerprint_is_lowercase_hex_sha256() {
        let value = fingerprint(&SchemaSnapshot::new());
        assert_eq!(value.as_str().len(), 64);
        assert!(value.as_str().chars().all(|ch| ch.is_ascii_digit() || ch.is_ascii_lowercase()));
        assert_eq!(
            value.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
