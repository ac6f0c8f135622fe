/// Known brand domains and the HR inboxes that receive their notifications.
const BUILTIN_DOMAINS: &[(&str, &str)] = &[
    ("kgktechnologies.com", "Hr@kgktechnologies.com"),
    ("dglobal.com", "hr@dglobaltech.com"),
    ("localhost", "kgktechnologies.stl@gmail.com"),
];

/// Read-only lookup from origin domains to notification addresses.
///
/// Built once at startup and shared behind an `Arc`; nothing mutates it
/// afterwards, so lookups are a pure function of the configuration.
#[derive(Debug, Clone, Default)]
pub struct RecipientDirectory {
    primary: Vec<(String, String)>,
    secondary: Vec<(String, String)>,
    default_receiver: Option<String>,
    service_account: Option<String>,
}

impl RecipientDirectory {
    /// Creates a directory from environment-seeded entries, kept in insertion order.
    ///
    /// Keys are lowercased; entries with an empty domain or address are skipped
    /// and a repeated domain keeps its first address.
    pub fn new<I, K, V>(primary: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut entries: Vec<(String, String)> = Vec::new();
        for (domain, address) in primary {
            let domain = domain.as_ref().trim().to_ascii_lowercase();
            let address = address.as_ref().trim();
            if domain.is_empty() || address.is_empty() {
                continue;
            }
            if entries.iter().any(|(existing, _)| *existing == domain) {
                continue;
            }
            entries.push((domain, address.to_string()));
        }

        Self {
            primary: entries,
            ..Self::default()
        }
    }

    /// Adds the built-in table of known brand domains as the secondary map.
    pub fn with_builtin_domains(mut self) -> Self {
        self.secondary = BUILTIN_DOMAINS
            .iter()
            .map(|(domain, address)| (domain.to_string(), address.to_string()))
            .collect();
        self
    }

    /// Sets the addresses used when resolution finds nothing.
    pub fn with_fallbacks(
        mut self,
        default_receiver: Option<String>,
        service_account: Option<String>,
    ) -> Self {
        self.default_receiver = default_receiver.filter(|value| !value.trim().is_empty());
        self.service_account = service_account.filter(|value| !value.trim().is_empty());
        self
    }

    /// Maps a normalized domain to an address.
    ///
    /// Exact primary match, then exact secondary match, then the first primary
    /// key the domain ends with.
    pub fn resolve(&self, domain: &str) -> Option<&str> {
        if domain.is_empty() {
            return None;
        }

        lookup(&self.primary, domain)
            .or_else(|| lookup(&self.secondary, domain))
            .or_else(|| {
                self.primary
                    .iter()
                    .find(|(key, _)| domain.ends_with(key.as_str()))
                    .map(|(_, address)| address.as_str())
            })
    }

    /// Resolves the domain, falling back to the default receiver and then the
    /// service account.
    pub fn recipient_for(&self, domain: &str) -> Option<&str> {
        self.resolve(domain)
            .or(self.default_receiver.as_deref())
            .or(self.service_account.as_deref())
    }

    pub fn primary_len(&self) -> usize {
        self.primary.len()
    }
}

fn lookup<'a>(entries: &'a [(String, String)], domain: &str) -> Option<&'a str> {
    entries
        .iter()
        .find(|(key, _)| key == domain)
        .map(|(_, address)| address.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> RecipientDirectory {
        RecipientDirectory::new([
            ("gktechnologies.com", "gk-hr@example.net"),
            ("DGlobalTech.com", "dg-hr@example.net"),
            ("kgktechnologies.com", "careers@kgk.example"),
        ])
        .with_builtin_domains()
    }

    #[test]
    fn exact_primary_match_wins_over_builtin() {
        let directory = directory();
        assert_eq!(
            directory.resolve("kgktechnologies.com"),
            Some("careers@kgk.example")
        );
        assert_eq!(directory.resolve("dglobaltech.com"), Some("dg-hr@example.net"));
    }

    #[test]
    fn builtin_domains_resolve_without_primary_entry() {
        let directory = RecipientDirectory::default().with_builtin_domains();
        assert_eq!(
            directory.resolve("kgktechnologies.com"),
            Some("Hr@kgktechnologies.com")
        );
        assert_eq!(directory.resolve("dglobal.com"), Some("hr@dglobaltech.com"));
    }

    #[test]
    fn subdomain_resolves_like_its_parent() {
        let directory = RecipientDirectory::new([("kgktechnologies.com", "careers@kgk.example")]);
        assert_eq!(
            directory.resolve("sub.kgktechnologies.com"),
            directory.resolve("kgktechnologies.com")
        );
    }

    #[test]
    fn suffix_match_follows_insertion_order() {
        let directory = directory();
        // both "gktechnologies.com" and "kgktechnologies.com" are suffixes; the
        // earlier entry wins
        assert_eq!(
            directory.resolve("jobs.kgktechnologies.com"),
            Some("gk-hr@example.net")
        );
    }

    #[test]
    fn unknown_domain_resolves_to_none_and_falls_back() {
        let directory = directory();
        assert_eq!(directory.resolve("unknown-domain.test"), None);
        assert_eq!(directory.recipient_for("unknown-domain.test"), None);

        let directory = directory.with_fallbacks(
            Some("inbox@example.net".to_string()),
            Some("service@example.net".to_string()),
        );
        assert_eq!(
            directory.recipient_for("unknown-domain.test"),
            Some("inbox@example.net")
        );

        let directory = RecipientDirectory::default()
            .with_fallbacks(Some(" ".to_string()), Some("service@example.net".to_string()));
        assert_eq!(directory.recipient_for(""), Some("service@example.net"));
    }

    #[test]
    fn empty_domain_never_matches() {
        let directory = directory();
        assert_eq!(directory.resolve(""), None);
    }

    #[test]
    fn resolution_is_idempotent() {
        let directory = directory();
        let first = directory.resolve("careers.dglobaltech.com");
        let second = directory.resolve("careers.dglobaltech.com");
        assert_eq!(first, second);
        assert_eq!(first, Some("dg-hr@example.net"));
    }

    #[test]
    fn skips_blank_and_duplicate_entries() {
        let directory = RecipientDirectory::new([
            ("a.test", ""),
            ("", "x@example.net"),
            ("b.test", "first@example.net"),
            ("B.test", "second@example.net"),
        ]);
        assert_eq!(directory.primary_len(), 1);
        assert_eq!(directory.resolve("b.test"), Some("first@example.net"));
        assert_eq!(directory.resolve("a.test"), None);
    }
}
