//! In-page scripts evaluated against a parsed document.
//!
//! These are the DOM-side halves of [`PageScript`]: a conservative safety
//! scan that fails closed on login, paywall and CAPTCHA signals, and the two
//! content collectors (paragraph text and h1-h3 headings).

use crate::surface::{PageScript, SurfaceSettings};
use scraper::{ElementRef, Html, Selector};

/// Id/class tokens that mark a page as gated.
pub const DANGEROUS_KEYWORDS: [&str; 4] = ["paywall", "subscribe", "login", "auth"];

/// Evaluate `script` against `html` and return the engine-style result: a
/// JSON string literal, exactly as a browser engine hands back a string.
pub fn evaluate_script(html: &str, script: PageScript, settings: &SurfaceSettings) -> String {
    let document = Html::parse_document(html);
    let value = match script {
        PageScript::CheckHeuristics => check_heuristics(&document),
        PageScript::ExtractParagraphs => extract_paragraphs(&document, settings.max_text_chars),
        PageScript::ExtractHeadings => {
            let headings = extract_headings(
                &document,
                settings.max_headings,
                settings.max_heading_chars,
            );
            serde_json::to_string(&headings).unwrap_or_else(|_| "[]".to_owned())
        }
    };
    serde_json::to_string(&value).unwrap_or_else(|_| "\"\"".to_owned())
}

/// Scan the document for signals that extraction must not proceed.
///
/// Returns an empty string when the page looks safe, otherwise a short
/// human-readable reason.
pub fn check_heuristics(document: &Html) -> String {
    if has_match(document, "input[type=\"password\"]") {
        return "Found password input field".to_owned();
    }

    if has_match(
        document,
        "iframe[src*=\"recaptcha\"], iframe[src*=\"hcaptcha\"], div[class*=\"g-recaptcha\"], div[class*=\"h-captcha\"]",
    ) {
        return "Found active CAPTCHA widget".to_owned();
    }

    if visible_text(document).to_lowercase().contains("captcha") {
        return "Found CAPTCHA keyword in page text".to_owned();
    }

    let Ok(structural) = Selector::parse("body, header, nav, [id], [class]") else {
        return String::new();
    };
    for element in document.select(&structural) {
        if let Some(keyword) = dangerous_keyword(element) {
            return format!("Matched dangerous structural class/id: {keyword}");
        }
    }

    String::new()
}

/// Collect paragraph text up to `max_chars` characters.
///
/// Each `<p>` is whitespace-collapsed; paragraphs that embed scripts or
/// styles are skipped. Paragraphs are separated by a blank line.
pub fn extract_paragraphs(document: &Html, max_chars: usize) -> String {
    let (Ok(paragraphs), Ok(embedded)) = (Selector::parse("p"), Selector::parse("script, style"))
    else {
        return String::new();
    };

    let mut text = String::new();
    let mut char_count = 0usize;
    for p in document.select(&paragraphs) {
        if p.select(&embedded).next().is_some() {
            continue;
        }
        let inner = collapse_whitespace(&p.text().collect::<String>());
        if !inner.is_empty() {
            char_count += inner.chars().count() + 2;
            text.push_str(&inner);
            text.push_str("\n\n");
        }
        if char_count > max_chars {
            break;
        }
    }

    truncate_chars(&text, max_chars).trim().to_owned()
}

/// Collect up to `max_headings` h1-h3 headings in document order, each
/// clamped to `max_chars` characters.
pub fn extract_headings(document: &Html, max_headings: usize, max_chars: usize) -> Vec<String> {
    let Ok(selector) = Selector::parse("h1, h2, h3") else {
        return Vec::new();
    };

    let mut headings = Vec::new();
    for heading in document.select(&selector) {
        if headings.len() >= max_headings {
            break;
        }
        let inner = collapse_whitespace(&heading.text().collect::<String>());
        if !inner.is_empty() {
            headings.push(truncate_chars(&inner, max_chars).to_owned());
        }
    }
    headings
}

/// True when `keyword` appears in `token` as a whole word, where words are
/// separated by `-` or `_` (`login-form` matches `login`, `authority` does
/// not match `auth`).
pub fn token_matches(token: &str, keyword: &str) -> bool {
    token
        .split(['-', '_'])
        .any(|segment| segment.eq_ignore_ascii_case(keyword))
}

fn dangerous_keyword(element: ElementRef<'_>) -> Option<&'static str> {
    let value = element.value();
    let id = value.attr("id").unwrap_or_default();
    DANGEROUS_KEYWORDS.into_iter().find(|keyword| {
        token_matches(id, keyword) || value.classes().any(|class| token_matches(class, keyword))
    })
}

fn has_match(document: &Html, selector: &str) -> bool {
    Selector::parse(selector)
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false)
}

/// Text a reader would see: everything outside head, script, style,
/// noscript and template elements.
fn visible_text(document: &Html) -> String {
    let mut text = String::new();
    for node in document.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor.value().as_element().is_some_and(|el| {
                matches!(
                    el.name(),
                    "head" | "script" | "style" | "noscript" | "template"
                )
            })
        });
        if !hidden {
            text.push_str(chunk);
            text.push(' ');
        }
    }
    text
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters, on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
