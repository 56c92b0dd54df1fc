use std::collections::HashMap;
use std::sync::LazyLock;

/// Registry servers for zones whose server does not follow `whois.nic.<zone>`
/// or where the canonical host differs.
static WHOIS_SERVERS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        // Generic TLDs
        ("com", "whois.verisign-grs.com"),
        ("net", "whois.verisign-grs.com"),
        ("org", "whois.pir.org"),
        ("info", "whois.afilias.net"),
        ("biz", "whois.biz"),
        ("mobi", "whois.afilias.net"),
        ("name", "whois.nic.name"),
        ("edu", "whois.educause.edu"),
        ("gov", "whois.dotgov.gov"),
        ("int", "whois.iana.org"),
        ("aero", "whois.aero"),
        ("museum", "whois.museum"),
        ("pro", "whois.registrypro.pro"),
        // New gTLDs
        ("app", "whois.nic.google"),
        ("dev", "whois.nic.google"),
        ("page", "whois.nic.google"),
        ("io", "whois.nic.io"),
        ("co", "whois.nic.co"),
        ("me", "whois.nic.me"),
        ("tv", "whois.nic.tv"),
        ("cc", "ccwhois.verisign-grs.com"),
        ("xyz", "whois.nic.xyz"),
        ("top", "whois.nic.top"),
        ("club", "whois.nic.club"),
        ("vip", "whois.nic.vip"),
        ("shop", "whois.nic.shop"),
        ("site", "whois.nic.site"),
        ("online", "whois.nic.online"),
        ("tech", "whois.nic.tech"),
        // Country codes
        ("cn", "whois.cnnic.cn"),
        ("jp", "whois.jprs.jp"),
        ("hk", "whois.hkirc.hk"),
        ("tw", "whois.twnic.net.tw"),
        ("kr", "whois.kr"),
        ("sg", "whois.sgnic.sg"),
        ("in", "whois.registry.in"),
        ("au", "whois.auda.org.au"),
        ("nz", "whois.srs.net.nz"),
        ("uk", "whois.nic.uk"),
        ("de", "whois.denic.de"),
        ("fr", "whois.nic.fr"),
        ("nl", "whois.domain-registry.nl"),
        ("eu", "whois.eu"),
        ("be", "whois.dns.be"),
        ("ch", "whois.nic.ch"),
        ("it", "whois.nic.it"),
        ("es", "whois.nic.es"),
        ("se", "whois.iis.se"),
        ("ru", "whois.tcinet.ru"),
        ("us", "whois.nic.us"),
        ("ca", "whois.cira.ca"),
        ("br", "whois.registro.br"),
        ("ai", "whois.nic.ai"),
    ])
});

/// Returns the zone of `domain`: everything after the last dot.
pub fn get_zone(domain: &str) -> Option<&str> {
    domain.rsplit_once('.').map(|(_, zone)| zone)
}

/// Looks up the curated server for `zone`.
pub fn get_whois_server(zone: &str) -> Option<&'static str> {
    WHOIS_SERVERS.get(zone.to_ascii_lowercase().as_str()).copied()
}

/// Synthesizes `whois.nic.<zone>`, the naming convention most registries
/// follow. `None` when the zone is not a valid DNS label.
pub fn default_whois_server(zone: &str) -> Option<String> {
    let valid = !zone.is_empty()
        && zone.len() <= 63
        && zone.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !zone.starts_with('-')
        && !zone.ends_with('-');
    valid.then(|| format!("whois.nic.{}", zone.to_ascii_lowercase()))
}

/// Per-server query line, without the trailing CRLF.
///
/// JPRS answers in ISO-2022-JP unless the query ends in `/e`, which selects
/// its English output (`[Expires on]`). Escape-encoded Japanese would decode
/// as plain ASCII and never show the `有効期限` label, so `.jp` is always asked
/// for English.
pub fn whois_query(server: &str, domain: &str) -> String {
    if server.eq_ignore_ascii_case("whois.jprs.jp") {
        format!("{domain}/e")
    } else {
        domain.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_zone() {
        assert_eq!(get_zone("example.com"), Some("com"));
        assert_eq!(get_zone("example.co.jp"), Some("jp"));
        assert_eq!(get_zone("example."), Some(""));
        assert_eq!(get_zone("localhost"), None);
    }

    #[test]
    fn test_curated_servers() {
        assert_eq!(get_whois_server("com"), Some("whois.verisign-grs.com"));
        assert_eq!(get_whois_server("JP"), Some("whois.jprs.jp"));
        assert_eq!(get_whois_server("example"), None);
    }

    #[test]
    fn test_default_server() {
        assert_eq!(default_whois_server("xyz"), Some("whois.nic.xyz".to_string()));
        assert_eq!(default_whois_server("Berlin"), Some("whois.nic.berlin".to_string()));
        assert_eq!(default_whois_server(""), None);
        assert_eq!(default_whois_server("bad_zone"), None);
        assert_eq!(default_whois_server("-x"), None);
    }

    #[test]
    fn test_whois_query() {
        assert_eq!(whois_query("whois.jprs.jp", "example.jp"), "example.jp/e");
        assert_eq!(whois_query("WHOIS.JPRS.JP", "example.co.jp"), "example.co.jp/e");
        assert_eq!(whois_query("whois.verisign-grs.com", "example.com"), "example.com");
    }
}
