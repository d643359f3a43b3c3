use tessera_state::StateKey;

/// Render a [`StateKey`] into a Redis key string with the given prefix.
///
/// The format is `prefix:namespace:tenant:kind:id`.
pub fn render_key(prefix: &str, key: &StateKey) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        prefix, key.namespace, key.tenant, key.kind, key.id
    )
}

#[cfg(test)]
mod tests {
    use tessera_state::KeyKind;

    use super::*;

    #[test]
    fn renders_standard_key() {
        let key = StateKey::new("_system", "_realms", KeyKind::Realm, "r-1");
        let rendered = render_key("tessera", &key);
        assert_eq!(rendered, "tessera:_system:_realms:realm:r-1");
    }

    #[test]
    fn renders_all_kinds() {
        let kinds = [
            (KeyKind::Realm, "realm"),
            (KeyKind::Stat, "stat"),
            (KeyKind::Lock, "lock"),
            (KeyKind::RateLimit, "rate_limit"),
        ];
        for (kind, expected_segment) in kinds {
            let key = StateKey::new("ns", "t", kind, "id");
            let rendered = render_key("p", &key);
            assert_eq!(rendered, format!("p:ns:t:{expected_segment}:id"));
        }
    }
}
