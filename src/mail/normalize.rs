use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::mail::error::ParseError;
use crate::mail::{NormalizedEmail, RawMessage, SourceProvider};

pub const NO_SUBJECT: &str = "(no subject)";
pub const SNIPPET_CHARS: usize = 140;
const FALLBACK_ID_LEN: usize = 11;
// Wide enough that html2text never wraps inside the snippet.
const HTML_RENDER_WIDTH: usize = 10_000;

#[derive(Clone, Copy, Debug)]
pub struct NormalizeOptions {
    pub provider: SourceProvider,
    /// Render a snippet from the HTML part when there is no text/plain one.
    pub html_snippets: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { provider: SourceProvider::Imap, html_snippets: false }
    }
}

/// Random opaque id for messages the transport gave no UID for. Only
/// unique within one response, which is all the dashboard needs.
pub fn fallback_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(FALLBACK_ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

pub fn normalize(raw: RawMessage, opts: &NormalizeOptions) -> Result<NormalizedEmail, ParseError> {
    let source = raw.source.ok_or(ParseError::MissingSource)?;
    let parsed = mailparse::parse_mail(&source)?;
    let headers = &parsed.headers;

    let subject = headers
        .get_first_value("Subject")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let from = headers
        .get_first_header("From")
        .and_then(|h| mailparse::addrparse_header(h).ok())
        .map(|list| list.iter().map(addr_to_string).collect::<Vec<_>>().join(", "))
        .unwrap_or_default();

    let to = headers
        .get_first_header("To")
        .and_then(|h| mailparse::addrparse_header(h).ok())
        .map(|list| list.iter().flat_map(addresses).collect())
        .unwrap_or_default();

    let date = headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));

    let in_reply_to = headers
        .get_first_value("In-Reply-To")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let references = headers
        .get_first_value("References")
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let text = extract_text_plain(&parsed).or_else(|| {
        if opts.html_snippets {
            extract_html_as_text(&parsed)
        } else {
            None
        }
    });
    let snippet = text.map(|t| t.chars().take(SNIPPET_CHARS).collect());

    Ok(NormalizedEmail {
        id: raw.uid.map(|u| u.to_string()).unwrap_or_else(fallback_id),
        subject,
        from,
        to,
        date,
        snippet,
        in_reply_to,
        references,
        source_provider: opts.provider,
    })
}

fn addr_to_string(addr: &MailAddr) -> String {
    match addr {
        MailAddr::Single(s) => match s.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, s.addr),
            _ => s.addr.clone(),
        },
        MailAddr::Group(g) => {
            let members: Vec<String> = g.addrs.iter().map(|s| s.addr.clone()).collect();
            format!("{}: {};", g.group_name, members.join(", "))
        }
    }
}

fn addresses(addr: &MailAddr) -> Vec<String> {
    match addr {
        MailAddr::Single(s) => vec![s.addr.clone()],
        MailAddr::Group(g) => g.addrs.iter().map(|s| s.addr.clone()).collect(),
    }
}

fn is_attachment(m: &ParsedMail) -> bool {
    matches!(m.get_content_disposition().disposition, DispositionType::Attachment)
}

/// Concatenated text/plain parts, or `None` when the message has none.
fn extract_text_plain(m: &ParsedMail) -> Option<String> {
    if !m.subparts.is_empty() {
        let mut out: Option<String> = None;
        for sp in &m.subparts {
            let Some(t) = extract_text_plain(sp) else { continue };
            let acc = out.get_or_insert_with(String::new);
            if !t.trim().is_empty() {
                if !acc.is_empty() {
                    acc.push_str("\n\n");
                }
                acc.push_str(&t);
            }
        }
        return out;
    }

    if m.ctype.mimetype.eq_ignore_ascii_case("text/plain") && !is_attachment(m) {
        return m.get_body().ok();
    }
    None
}

fn extract_html_as_text(m: &ParsedMail) -> Option<String> {
    if !m.subparts.is_empty() {
        return m.subparts.iter().find_map(extract_html_as_text);
    }
    if m.ctype.mimetype.eq_ignore_ascii_case("text/html") && !is_attachment(m) {
        let html = m.get_body().ok()?;
        return html2text::from_read(html.as_bytes(), HTML_RENDER_WIDTH)
            .ok()
            .map(|t| t.trim().to_string());
    }
    None
}
