//! Minimal scraping of the two HTML pages the element resolution flow
//! passes through. Only the attributes we need are extracted, with patterns
//! compiled once.

use std::sync::OnceLock;

use regex::Regex;

fn iframe_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)<iframe\b[^>]*?\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("valid iframe pattern")
    })
}

fn files_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?is)<li\b[^>]*\bclass\s*=\s*["'][^"']*\bilw-filesblock-li\b[^"']*["'][^>]*>.*?<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a>"#,
        )
        .expect("valid files block pattern")
    })
}

/// `src` of the first `<iframe>` on the page.
pub fn iframe_src(html: &str) -> Option<String> {
    let caps = iframe_pattern().captures(html)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| decode_entities(m.as_str()))
        .filter(|src| !src.is_empty())
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"))
}

fn entity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid entity pattern")
    })
}

/// One file link of a files block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLink {
    pub href: String,
    /// Visible link text, usually the file's name.
    pub text: String,
}

/// Links of a "files block" element (`.ilw-filesblock-li a`), in page
/// order. Empty when the page is a plain single-file element.
pub fn files_block_links(html: &str) -> Vec<BlockLink> {
    files_block_pattern()
        .captures_iter(html)
        .filter_map(|caps| {
            let href = decode_entities(caps.get(1).or_else(|| caps.get(2))?.as_str());
            if href.is_empty() {
                return None;
            }
            let inner = caps.get(3).map_or("", |m| m.as_str());
            let text = decode_entities(&tag_pattern().replace_all(inner, ""));
            Some(BlockLink {
                href,
                text: text.split_whitespace().collect::<Vec<_>>().join(" "),
            })
        })
        .collect()
}

/// Decode character references: the named ones that show up in attribute
/// values and link text, plus decimal and hex numeric references. Unknown
/// or invalid references are left as written.
fn decode_entities(raw: &str) -> String {
    entity_pattern()
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or(name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iframe_src() {
        let html = r#"<html><body>
            <div class="wrapper"><iframe id="ctl00_ContentPlaceHolder_ExtensionIframe"
                 class="extension" src="https://resource.itslearning.com/Proxy/Index.aspx?a=1&amp;b=2"
                 allowfullscreen></iframe></div></body></html>"#;
        assert_eq!(
            iframe_src(html).as_deref(),
            Some("https://resource.itslearning.com/Proxy/Index.aspx?a=1&b=2")
        );
    }

    #[test]
    fn test_iframe_src_single_quotes() {
        let html = "<IFRAME src='/view?id=3'></IFRAME>";
        assert_eq!(iframe_src(html).as_deref(), Some("/view?id=3"));
    }

    #[test]
    fn test_iframe_missing() {
        assert_eq!(iframe_src("<html><body>No frames</body></html>"), None);
        assert_eq!(iframe_src(r#"<iframe src=""></iframe>"#), None);
    }

    #[test]
    fn test_files_block_links() {
        let html = r#"
            <ul class="ilw-filesblock">
              <li class="ilw-filesblock-li">
                <span class="icon"></span>
                <a class="ilw-filesblock-link" href="/File/download?FileId=1&amp;v=2">Week 1.pdf</a>
              </li>
              <li class="ilw-filesblock-li odd"><a href="/File/download?FileId=2">Week 2.pdf</a></li>
            </ul>"#;
        assert_eq!(
            files_block_links(html),
            vec![
                BlockLink {
                    href: "/File/download?FileId=1&v=2".to_string(),
                    text: "Week 1.pdf".to_string(),
                },
                BlockLink {
                    href: "/File/download?FileId=2".to_string(),
                    text: "Week 2.pdf".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_numeric_entities_in_href() {
        let html = r#"<li class="ilw-filesblock-li"><a href="&#47;File&#x2F;download?FileId=7&#38;v=1"><b>Notes</b>&#x20;&amp; slides</a></li>"#;
        let links = files_block_links(html);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].href, "/File/download?FileId=7&v=1");
        assert_eq!(links[0].text, "Notes & slides");
    }

    #[test]
    fn test_unknown_entities_are_kept() {
        assert_eq!(decode_entities("a&bogus;b&#xZZ;"), "a&bogus;b&#xZZ;");
        assert_eq!(decode_entities("&#1114112;"), "&#1114112;");
        assert_eq!(decode_entities("&lt;a&gt; &quot;x&quot; &#39;y&#39;"), "<a> \"x\" 'y'");
    }

    #[test]
    fn test_files_block_links_absent_on_single_file_page() {
        let html = r#"<div class="file"><a href="/download">Get file</a></div>"#;
        assert!(files_block_links(html).is_empty());
    }
}
