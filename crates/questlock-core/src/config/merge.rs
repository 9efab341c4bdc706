//! Configuration merging logic
//!
//! Layers are merged as raw TOML tables before deserializing, so a file only
//! overrides the keys it actually sets. Nested tables merge recursively; any
//! other value is replaced wholesale.

pub(super) fn merge_tables(mut base: toml::Table, overlay: toml::Table) -> toml::Table {
    for (key, value) in overlay {
        let merged = match (base.remove(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                toml::Value::Table(merge_tables(existing, incoming))
            }
            (_, incoming) => incoming,
        };
        base.insert(key, merged);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> toml::Table {
        src.parse().unwrap()
    }

    #[test]
    fn test_overlay_keeps_unset_siblings() {
        let base = table("[lock]\npool_size = 4\nurl = \"sqlite:a.db\"\n");
        let overlay = table("[lock]\npool_size = 2\n");
        let merged = merge_tables(base, overlay);
        let lock = merged["lock"].as_table().unwrap();
        assert_eq!(lock["pool_size"].as_integer(), Some(2));
        assert_eq!(lock["url"].as_str(), Some("sqlite:a.db"));
    }

    #[test]
    fn test_scalar_replaces_table() {
        let merged = merge_tables(table("[lock]\npool_size = 4\n"), table("lock = 1\n"));
        assert_eq!(merged["lock"].as_integer(), Some(1));
    }
}
