//! Rewriting distccd's statistics page.

/// Opening marker of a statistics page.
pub const OPEN_TAG: &str = "<distccstats>";
/// Closing marker of a statistics page.
pub const CLOSE_TAG: &str = "</distccstats>";
/// Name of the injected statistic.
pub const FREE_MEM_KEY: &str = "dcc_free_mem";

/// Returns true if `body` looks like a complete statistics page.
#[must_use]
pub fn is_stats_page(body: &str) -> bool {
    !body.is_empty() && body.contains(OPEN_TAG) && body.contains(CLOSE_TAG)
}

/// Returns true if distccd already reports free memory itself.
#[must_use]
pub fn has_free_mem(body: &str) -> bool {
    body.contains(FREE_MEM_KEY)
}

/// Inserts `dcc_free_mem <mib> MB` before the page's last line.
#[must_use]
pub fn inject_free_mem(body: &str, mib: u64) -> String {
    let mut lines: Vec<&str> = body.lines().collect();
    let line = format!("{FREE_MEM_KEY} {mib} MB");
    let at = lines.len().saturating_sub(1);
    lines.insert(at, &line);

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PAGE: &str = "<distccstats>\n\
                        dcc_tcp_accept 12\n\
                        dcc_compile_ok 10\n\
                        dcc_max_kids 14\n\
                        </distccstats>\n";

    #[test]
    fn test_is_stats_page() {
        assert!(is_stats_page(PAGE));
        assert!(!is_stats_page(""));
        assert!(!is_stats_page("<distccstats>\ndcc_tcp_accept 1\n"));
        assert!(!is_stats_page("<html>404</html>"));
    }

    #[test]
    fn test_inject_before_closing_tag() {
        let out = inject_free_mem(PAGE, 2048);
        assert_eq!(
            out,
            "<distccstats>\n\
             dcc_tcp_accept 12\n\
             dcc_compile_ok 10\n\
             dcc_max_kids 14\n\
             dcc_free_mem 2048 MB\n\
             </distccstats>\n"
        );
        assert!(has_free_mem(&out));
        assert!(!has_free_mem(PAGE));
    }

    #[test]
    fn test_inject_handles_crlf() {
        let out = inject_free_mem("<distccstats>\r\ndcc_max_kids 2\r\n</distccstats>\r\n", 1);
        assert_eq!(out, "<distccstats>\ndcc_max_kids 2\ndcc_free_mem 1 MB\n</distccstats>\n");
    }

    proptest! {
        #[test]
        fn injection_keeps_every_original_line(
            stats in proptest::collection::vec("dcc_[a-z_]{1,12} [0-9]{1,6}", 0..20),
            mib in 0u64..1_000_000,
        ) {
            let page = format!("{OPEN_TAG}\n{}\n{CLOSE_TAG}\n", stats.join("\n"));
            let out = inject_free_mem(&page, mib);
            let lines: Vec<&str> = out.lines().collect();

            prop_assert!(is_stats_page(&out));
            prop_assert_eq!(*lines.last().unwrap(), CLOSE_TAG);
            let expected = format!("{FREE_MEM_KEY} {mib} MB");
            prop_assert_eq!(lines[lines.len() - 2], expected.as_str());
            prop_assert_eq!(lines.len(), page.lines().count() + 1);
        }
    }
}
